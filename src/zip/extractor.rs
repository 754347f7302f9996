use flate2::Crc;
use flate2::read::DeflateDecoder;
use std::io::Read;
use std::sync::Arc;

use crate::io::ReadAt;
use anyhow::{Context, Result, bail};

use super::parser::ZipParser;
use super::structures::{CompressionMethod, ZipFileEntry};

/// Upper bound on the DEFLATE expansion used to size the output buffer up front.
const MAX_INFLATE_RATIO: u64 = 1032;

/// Reads entry data out of a ZIP archive.
pub struct ZipExtractor<R: ReadAt> {
    parser: ZipParser<R>,
}

impl<R: ReadAt> ZipExtractor<R> {
    pub fn new(reader: Arc<R>) -> Self {
        Self {
            parser: ZipParser::new(reader),
        }
    }

    /// List all files in the archive
    pub async fn list_files(&self) -> Result<Vec<ZipFileEntry>> {
        self.parser.list_files().await
    }

    /// Offset of the entry's data within the archive
    pub async fn data_offset(&self, entry: &ZipFileEntry) -> Result<u64> {
        self.parser.get_data_offset(entry).await
    }

    /// Extract the whole entry to memory, inflating if needed and checking
    /// the CRC-32 recorded in the Central Directory.
    pub async fn extract_to_memory(&self, entry: &ZipFileEntry, data_offset: u64) -> Result<Vec<u8>> {
        self.check_span(entry, data_offset, entry.compressed_size)?;
        let mut raw = vec![0u8; entry.compressed_size as usize];
        self.parser
            .reader()
            .read_exact_at(data_offset, &mut raw)
            .await
            .with_context(|| format!("Failed to read {}", entry.file_name))?;

        let data = match entry.compression_method {
            CompressionMethod::Stored => raw,
            CompressionMethod::Deflate => {
                // One byte past the declared size is enough to detect a lie
                let limit = entry.uncompressed_size.saturating_add(1);
                let capacity = entry
                    .uncompressed_size
                    .min(raw.len() as u64 * MAX_INFLATE_RATIO) as usize;
                tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
                    let mut out = Vec::with_capacity(capacity);
                    DeflateDecoder::new(raw.as_slice())
                        .take(limit)
                        .read_to_end(&mut out)?;
                    Ok(out)
                })
                .await?
                .with_context(|| format!("Failed to inflate {}", entry.file_name))?
            }
            CompressionMethod::Unknown(method) => {
                bail!(
                    "Unsupported compression method {} for {}",
                    method,
                    entry.file_name
                )
            }
        };

        if data.len() as u64 != entry.uncompressed_size {
            bail!(
                "Size mismatch for {}: expected {} bytes, got {}",
                entry.file_name,
                entry.uncompressed_size,
                data.len()
            );
        }

        let mut crc = Crc::new();
        crc.update(&data);
        if crc.sum() != entry.crc32 {
            bail!("CRC mismatch for {}", entry.file_name);
        }

        Ok(data)
    }

    /// Read `len` bytes at `offset` within a STORED entry without
    /// touching the rest of it.
    pub async fn read_stored_range(
        &self,
        entry: &ZipFileEntry,
        data_offset: u64,
        offset: u64,
        len: u64,
    ) -> Result<Vec<u8>> {
        if !entry.is_stored() {
            bail!("{} is compressed and cannot be read by range", entry.file_name);
        }
        if offset.checked_add(len).is_none_or(|end| end > entry.uncompressed_size) {
            bail!(
                "Range {}+{} is outside of {} ({} bytes)",
                offset,
                len,
                entry.file_name,
                entry.uncompressed_size
            );
        }

        self.check_span(entry, data_offset, entry.uncompressed_size)?;

        let mut buf = vec![0u8; len as usize];
        self.parser
            .reader()
            .read_exact_at(data_offset + offset, &mut buf)
            .await?;
        Ok(buf)
    }

    /// Fail unless `len` bytes of entry data at `data_offset` lie inside the
    /// archive. Sizes come from the Central Directory and are checked before
    /// anything is allocated for them.
    fn check_span(&self, entry: &ZipFileEntry, data_offset: u64, len: u64) -> Result<()> {
        let archive_size = self.parser.reader().size();
        if data_offset
            .checked_add(len)
            .is_none_or(|end| end > archive_size)
        {
            bail!(
                "Data of {} ({} bytes at offset {}) extends past end of archive ({} bytes)",
                entry.file_name,
                len,
                data_offset,
                archive_size
            );
        }
        Ok(())
    }
}
