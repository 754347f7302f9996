use super::ReadAt;
use anyhow::{Context, Result};
use async_trait::async_trait;
use memmap2::Mmap;
use std::path::Path;

/// Memory-mapped archive reader.
///
/// Reads copy straight out of the mapping, so only the requested range is
/// touched regardless of archive size.
pub struct MmapReader {
    mmap: Mmap,
}

impl MmapReader {
    pub fn new(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        // SAFETY: archives are opened read-only and are not modified while served.
        let mmap = unsafe { Mmap::map(&file) }
            .with_context(|| format!("Failed to map {}", path.display()))?;
        Ok(Self { mmap })
    }
}

#[async_trait]
impl ReadAt for MmapReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let len = self.mmap.len() as u64;
        if offset >= len {
            return Ok(0);
        }
        let start = offset as usize;
        let n = buf.len().min((len - offset) as usize);
        buf[..n].copy_from_slice(&self.mmap[start..start + n]);
        Ok(n)
    }

    fn size(&self) -> u64 {
        self.mmap.len() as u64
    }
}
