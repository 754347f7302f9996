//! Shared fixtures for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use byteorder::{LittleEndian, WriteBytesExt};
use bytes::Bytes;
use flate2::Compression;
use flate2::Crc;
use flate2::write::DeflateEncoder;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;
use tokio::sync::Semaphore;

use archstream::{
    AccessStrategy, ArchiveError, ArchiveLibrary, ArchiveReader, ByteRange, ContentMetadata,
    MmapReader, RequestHandle, SharedTaskRegistry, Target, TaskRegistry, ZipArchive,
};

const STORED: u16 = 0;
const DEFLATE: u16 = 8;

struct PendingEntry {
    name: String,
    method: u16,
    crc32: u32,
    compressed_size: u32,
    uncompressed_size: u32,
    lfh_offset: u32,
    /// Sizes advertised through a ZIP64 extra field instead of the real ones
    declared: Option<(u64, u64)>,
}

/// Writes a minimal single-disk ZIP archive in memory.
#[derive(Default)]
pub struct ZipBuilder {
    out: Vec<u8>,
    entries: Vec<PendingEntry>,
}

impl ZipBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an uncompressed entry.
    pub fn stored(mut self, name: &str, data: &[u8]) -> Self {
        self.push(name, STORED, data, data.to_vec());
        self
    }

    /// Add a DEFLATE-compressed entry.
    pub fn deflated(mut self, name: &str, data: &[u8]) -> Self {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        let compressed = encoder.finish().unwrap();
        self.push(name, DEFLATE, data, compressed);
        self
    }

    /// Make the Central Directory claim other sizes for the last entry,
    /// through a ZIP64 extra field. The local header and data are unchanged.
    pub fn declare_sizes(mut self, uncompressed: u64, compressed: u64) -> Self {
        if let Some(entry) = self.entries.last_mut() {
            entry.declared = Some((uncompressed, compressed));
        }
        self
    }

    /// Like [`declare_sizes`](Self::declare_sizes), keeping the real
    /// compressed size.
    pub fn declare_uncompressed_size(self, uncompressed: u64) -> Self {
        let compressed = self.entries.last().map_or(0, |e| e.compressed_size as u64);
        self.declare_sizes(uncompressed, compressed)
    }

    fn push(&mut self, name: &str, method: u16, data: &[u8], payload: Vec<u8>) {
        let mut crc = Crc::new();
        crc.update(data);

        let entry = PendingEntry {
            name: name.to_string(),
            method,
            crc32: crc.sum(),
            compressed_size: payload.len() as u32,
            uncompressed_size: data.len() as u32,
            lfh_offset: self.out.len() as u32,
            declared: None,
        };

        let out = &mut self.out;
        out.extend_from_slice(b"PK\x03\x04");
        out.write_u16::<LittleEndian>(20).unwrap(); // version needed
        out.write_u16::<LittleEndian>(0).unwrap(); // flags
        out.write_u16::<LittleEndian>(method).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap(); // mod time
        out.write_u16::<LittleEndian>(0x21).unwrap(); // mod date
        out.write_u32::<LittleEndian>(entry.crc32).unwrap();
        out.write_u32::<LittleEndian>(entry.compressed_size).unwrap();
        out.write_u32::<LittleEndian>(entry.uncompressed_size).unwrap();
        out.write_u16::<LittleEndian>(name.len() as u16).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap(); // extra length
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(&payload);

        self.entries.push(entry);
    }

    pub fn finish(mut self) -> Vec<u8> {
        let cd_offset = self.out.len() as u32;
        for entry in &self.entries {
            let out = &mut self.out;
            out.extend_from_slice(b"PK\x01\x02");
            out.write_u16::<LittleEndian>(20).unwrap(); // version made by
            out.write_u16::<LittleEndian>(20).unwrap(); // version needed
            out.write_u16::<LittleEndian>(0).unwrap(); // flags
            out.write_u16::<LittleEndian>(entry.method).unwrap();
            out.write_u16::<LittleEndian>(0).unwrap(); // mod time
            out.write_u16::<LittleEndian>(0x21).unwrap(); // mod date
            out.write_u32::<LittleEndian>(entry.crc32).unwrap();
            let (compressed, uncompressed, extra_len) = match entry.declared {
                Some(_) => (u32::MAX, u32::MAX, 20),
                None => (entry.compressed_size, entry.uncompressed_size, 0),
            };
            out.write_u32::<LittleEndian>(compressed).unwrap();
            out.write_u32::<LittleEndian>(uncompressed).unwrap();
            out.write_u16::<LittleEndian>(entry.name.len() as u16).unwrap();
            out.write_u16::<LittleEndian>(extra_len).unwrap();
            out.write_u16::<LittleEndian>(0).unwrap(); // comment length
            out.write_u16::<LittleEndian>(0).unwrap(); // disk number
            out.write_u16::<LittleEndian>(0).unwrap(); // internal attrs
            out.write_u32::<LittleEndian>(0).unwrap(); // external attrs
            out.write_u32::<LittleEndian>(entry.lfh_offset).unwrap();
            out.extend_from_slice(entry.name.as_bytes());
            if let Some((uncompressed, compressed)) = entry.declared {
                out.write_u16::<LittleEndian>(0x0001).unwrap(); // ZIP64 extra id
                out.write_u16::<LittleEndian>(16).unwrap();
                out.write_u64::<LittleEndian>(uncompressed).unwrap();
                out.write_u64::<LittleEndian>(compressed).unwrap();
            }
        }
        let cd_size = self.out.len() as u32 - cd_offset;

        let out = &mut self.out;
        out.extend_from_slice(b"PK\x05\x06");
        out.write_u16::<LittleEndian>(0).unwrap(); // disk number
        out.write_u16::<LittleEndian>(0).unwrap(); // disk with CD
        out.write_u16::<LittleEndian>(self.entries.len() as u16).unwrap();
        out.write_u16::<LittleEndian>(self.entries.len() as u16).unwrap();
        out.write_u32::<LittleEndian>(cd_size).unwrap();
        out.write_u32::<LittleEndian>(cd_offset).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap(); // comment length

        self.out
    }

    /// Write the archive into `dir` and return its path.
    pub fn write_to(self, dir: &TempDir, file_name: &str) -> PathBuf {
        let path = dir.path().join(file_name);
        std::fs::write(&path, self.finish()).unwrap();
        path
    }
}

/// Deterministic, non-repeating test content.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Open `builder` as a memory-mapped archive under `id` in a new library.
pub async fn library_with(
    dir: &TempDir,
    id: &str,
    builder: ZipBuilder,
) -> (Arc<ArchiveLibrary>, Arc<ZipArchive<MmapReader>>) {
    let path = builder.write_to(dir, &format!("{id}.zip"));
    let archive = Arc::new(ZipArchive::open_path(&path).await.unwrap());
    let library = Arc::new(ArchiveLibrary::new());
    library.insert(id, archive.clone() as Arc<dyn ArchiveReader>);
    (library, archive)
}

type ReadHook = Box<dyn Fn(ByteRange) -> Result<(), ArchiveError> + Send + Sync>;

/// In-memory archive with hooks for timing and failure injection.
#[derive(Default)]
pub struct FakeArchive {
    objects: HashMap<String, (ContentMetadata, Bytes)>,
    gate: Option<Arc<Semaphore>>,
    on_read: Option<ReadHook>,
    lookups: AtomicUsize,
}

impl FakeArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `data` at `path` with the given strategy.
    pub fn with_object(
        mut self,
        path: &str,
        mime_type: &str,
        strategy: AccessStrategy,
        data: Vec<u8>,
    ) -> Self {
        let metadata = ContentMetadata {
            byte_length: data.len() as u64,
            mime_type: mime_type.parse().unwrap(),
            access_strategy: strategy,
        };
        self.objects
            .insert(path.to_string(), (metadata, Bytes::from(data)));
        self
    }

    /// Hold every metadata lookup until `gate` is closed.
    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Run `hook` before every range read; an error fails the read.
    pub fn with_read_hook(
        mut self,
        hook: impl Fn(ByteRange) -> Result<(), ArchiveError> + Send + Sync + 'static,
    ) -> Self {
        self.on_read = Some(Box::new(hook));
        self
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArchiveReader for FakeArchive {
    async fn resolve_metadata(
        &self,
        target: &Target,
    ) -> Result<Option<ContentMetadata>, ArchiveError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let _ = gate.acquire().await;
        }
        Ok(self.objects.get(target.path()).map(|(m, _)| m.clone()))
    }

    async fn fetch_whole(&self, target: &Target) -> Result<Option<Bytes>, ArchiveError> {
        Ok(self.objects.get(target.path()).map(|(_, d)| d.clone()))
    }

    async fn read_range(
        &self,
        target: &Target,
        range: ByteRange,
    ) -> Result<Option<Bytes>, ArchiveError> {
        if let Some(hook) = &self.on_read {
            hook(range)?;
        }
        Ok(self.objects.get(target.path()).map(|(_, data)| {
            let span = range.as_range();
            data.slice(span.start as usize..span.end as usize)
        }))
    }
}

/// One call made against a [`RecordingRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryCall {
    MarkStarted(RequestHandle),
    IsActive(RequestHandle),
    Stop(RequestHandle),
    StopAll,
}

/// Shared registry that also records every call made against it.
#[derive(Default)]
pub struct RecordingRegistry {
    inner: SharedTaskRegistry,
    calls: Mutex<Vec<RegistryCall>>,
}

impl RecordingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<RegistryCall> {
        self.calls.lock().clone()
    }
}

impl TaskRegistry for RecordingRegistry {
    fn mark_started(&self, handle: RequestHandle) -> bool {
        self.calls.lock().push(RegistryCall::MarkStarted(handle));
        self.inner.mark_started(handle)
    }

    fn is_active(&self, handle: RequestHandle) -> bool {
        self.calls.lock().push(RegistryCall::IsActive(handle));
        self.inner.is_active(handle)
    }

    fn stop(&self, handle: RequestHandle) {
        self.calls.lock().push(RegistryCall::Stop(handle));
        self.inner.stop(handle);
    }

    fn stop_all(&self) {
        self.calls.lock().push(RegistryCall::StopAll);
        self.inner.stop_all();
    }

    fn active_count(&self) -> usize {
        self.inner.active_count()
    }
}
