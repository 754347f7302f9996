//! Archive readers.
//!
//! [`ArchiveReader`] is the boundary between the responder and archive
//! storage. [`ZipArchive`] implements it over any [`ReadAt`] source and
//! [`ArchiveLibrary`] routes targets to the archive named by their host.

use async_trait::async_trait;
use bytes::Bytes;
use mime::Mime;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::ArchiveError;
use crate::io::{LocalFileReader, MmapReader, ReadAt};
use crate::metadata::{AccessStrategy, ContentMetadata};
use crate::ranges::ByteRange;
use crate::target::Target;
use crate::zip::{CompressionMethod, ZipExtractor, ZipFileEntry};

/// Maps targets to archived bytes.
///
/// `Ok(None)` means the target does not exist in the archive. All methods
/// may be called concurrently from background tasks.
#[async_trait]
pub trait ArchiveReader: Send + Sync {
    async fn resolve_metadata(
        &self,
        target: &Target,
    ) -> Result<Option<ContentMetadata>, ArchiveError>;

    /// Whole-object fetch through the archive's native accessor.
    async fn fetch_whole(&self, target: &Target) -> Result<Option<Bytes>, ArchiveError>;

    /// Bounded random-access read of `range` within the object.
    async fn read_range(
        &self,
        target: &Target,
        range: ByteRange,
    ) -> Result<Option<Bytes>, ArchiveError>;
}

const MIME_TYPES: &[(&str, &str)] = &[
    ("html", "text/html"),
    ("htm", "text/html"),
    ("css", "text/css"),
    ("js", "application/javascript"),
    ("mjs", "application/javascript"),
    ("json", "application/json"),
    ("txt", "text/plain"),
    ("xml", "text/xml"),
    ("svg", "image/svg+xml"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("ico", "image/x-icon"),
    ("mp3", "audio/mpeg"),
    ("ogg", "audio/ogg"),
    ("oga", "audio/ogg"),
    ("opus", "audio/opus"),
    ("wav", "audio/wav"),
    ("mp4", "video/mp4"),
    ("m4v", "video/mp4"),
    ("webm", "video/webm"),
    ("ogv", "video/ogg"),
    ("pdf", "application/pdf"),
    ("woff", "font/woff"),
    ("woff2", "font/woff2"),
    ("ttf", "font/ttf"),
];

/// MIME type of an archived path, from its extension.
pub fn mime_for_path(path: &str) -> Mime {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .and_then(|ext| {
            MIME_TYPES
                .iter()
                .find(|(known, _)| *known == ext)
                .and_then(|(_, essence)| essence.parse().ok())
        })
        .unwrap_or(mime::APPLICATION_OCTET_STREAM)
}

/// A ZIP file served as an archive.
pub struct ZipArchive<R: ReadAt> {
    extractor: ZipExtractor<R>,
    entries: BTreeMap<String, ZipFileEntry>,
    data_offsets: RwLock<HashMap<String, u64>>,
}

impl<R: ReadAt + 'static> ZipArchive<R> {
    /// Read the Central Directory and index the entries by path.
    pub async fn open(reader: Arc<R>) -> Result<Self, ArchiveError> {
        let extractor = ZipExtractor::new(reader);
        let entries: BTreeMap<_, _> = extractor
            .list_files()
            .await?
            .into_iter()
            .filter(|entry| !entry.is_directory)
            .map(|entry| (entry.file_name.clone(), entry))
            .collect();

        debug!(entries = entries.len(), "ZIP central directory indexed");

        Ok(Self {
            extractor,
            entries,
            data_offsets: RwLock::new(HashMap::new()),
        })
    }

    /// Entries in path order.
    pub fn entries(&self) -> impl Iterator<Item = &ZipFileEntry> {
        self.entries.values()
    }

    pub fn entry(&self, path: &str) -> Option<&ZipFileEntry> {
        self.entries.get(path)
    }

    /// Metadata of an entry, as served.
    pub fn metadata_for(entry: &ZipFileEntry) -> ContentMetadata {
        let mime_type = mime_for_path(&entry.file_name);
        let access_strategy = AccessStrategy::classify(&mime_type, entry.is_stored());
        ContentMetadata {
            byte_length: entry.uncompressed_size,
            mime_type,
            access_strategy,
        }
    }

    async fn data_offset(&self, entry: &ZipFileEntry) -> Result<u64, ArchiveError> {
        let cached = self.data_offsets.read().get(&entry.file_name).copied();
        if let Some(offset) = cached {
            return Ok(offset);
        }
        let offset = self.extractor.data_offset(entry).await?;
        self.data_offsets
            .write()
            .insert(entry.file_name.clone(), offset);
        Ok(offset)
    }
}

impl ZipArchive<MmapReader> {
    /// Open a local archive through a memory mapping.
    pub async fn open_path(path: &Path) -> Result<Self, ArchiveError> {
        let reader = MmapReader::new(path)?;
        info!(path = %path.display(), size = reader.size(), "Archive opened");
        Self::open(Arc::new(reader)).await
    }
}

impl ZipArchive<LocalFileReader> {
    /// Open a local archive with positional reads instead of a mapping.
    pub async fn open_file(path: &Path) -> Result<Self, ArchiveError> {
        let reader = LocalFileReader::new(path)?;
        info!(path = %path.display(), size = reader.size(), "Archive opened");
        Self::open(Arc::new(reader)).await
    }
}

#[async_trait]
impl<R: ReadAt + 'static> ArchiveReader for ZipArchive<R> {
    async fn resolve_metadata(
        &self,
        target: &Target,
    ) -> Result<Option<ContentMetadata>, ArchiveError> {
        Ok(self.entry(target.path()).map(Self::metadata_for))
    }

    async fn fetch_whole(&self, target: &Target) -> Result<Option<Bytes>, ArchiveError> {
        let Some(entry) = self.entry(target.path()) else {
            return Ok(None);
        };
        if let CompressionMethod::Unknown(method) = entry.compression_method {
            return Err(ArchiveError::UnsupportedCompression {
                path: entry.file_name.clone(),
                method,
            });
        }

        let offset = self.data_offset(entry).await?;
        let data = self.extractor.extract_to_memory(entry, offset).await?;
        Ok(Some(Bytes::from(data)))
    }

    async fn read_range(
        &self,
        target: &Target,
        range: ByteRange,
    ) -> Result<Option<Bytes>, ArchiveError> {
        let Some(entry) = self.entry(target.path()) else {
            return Ok(None);
        };
        if !entry.is_stored() {
            return Err(ArchiveError::UnsupportedCompression {
                path: entry.file_name.clone(),
                method: entry.compression_method.as_u16(),
            });
        }
        if range.as_range().end > entry.uncompressed_size {
            return Err(ArchiveError::RangeOutOfBounds {
                path: entry.file_name.clone(),
                range,
                size: entry.uncompressed_size,
            });
        }
        if range.is_empty() {
            return Ok(Some(Bytes::new()));
        }

        let offset = self.data_offset(entry).await?;
        let data = self
            .extractor
            .read_stored_range(entry, offset, range.start(), range.len())
            .await?;
        Ok(Some(Bytes::from(data)))
    }
}

/// Set of open archives keyed by archive id.
#[derive(Default)]
pub struct ArchiveLibrary {
    archives: RwLock<HashMap<String, Arc<dyn ArchiveReader>>>,
}

impl ArchiveLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `archive` under `id`, replacing any previous archive.
    pub fn insert(&self, id: impl Into<String>, archive: Arc<dyn ArchiveReader>) {
        let id = id.into();
        debug!(archive = id.as_str(), "Archive registered");
        self.archives.write().insert(id, archive);
    }

    pub fn remove(&self, id: &str) -> Option<Arc<dyn ArchiveReader>> {
        self.archives.write().remove(id)
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.archives.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    fn get(&self, target: &Target) -> Option<Arc<dyn ArchiveReader>> {
        let archive = self.archives.read().get(target.archive_id()).cloned();
        if archive.is_none() {
            debug!(archive = target.archive_id(), "Unknown archive");
        }
        archive
    }
}

#[async_trait]
impl ArchiveReader for ArchiveLibrary {
    async fn resolve_metadata(
        &self,
        target: &Target,
    ) -> Result<Option<ContentMetadata>, ArchiveError> {
        match self.get(target) {
            Some(archive) => archive.resolve_metadata(target).await,
            None => Ok(None),
        }
    }

    async fn fetch_whole(&self, target: &Target) -> Result<Option<Bytes>, ArchiveError> {
        match self.get(target) {
            Some(archive) => archive.fetch_whole(target).await,
            None => Ok(None),
        }
    }

    async fn read_range(
        &self,
        target: &Target,
        range: ByteRange,
    ) -> Result<Option<Bytes>, ArchiveError> {
        match self.get(target) {
            Some(archive) => archive.read_range(target, range).await,
            None => Ok(None),
        }
    }
}
