//! Byte sources for a single request.
//!
//! A provider is selected once per request from the content's
//! [`AccessStrategy`] and then asked for each planned range in turn.

use async_trait::async_trait;
use bytes::Bytes;
use mime::Mime;
use std::io;
use std::sync::Arc;
use tracing::debug;

use crate::archive::ArchiveReader;
use crate::error::ResponderError;
use crate::metadata::{AccessStrategy, ContentMetadata};
use crate::ranges::ByteRange;
use crate::target::Target;

/// One bounded slice of content.
#[derive(Debug, Clone)]
pub struct DataChunk {
    pub bytes: Bytes,
    pub mime_type: Mime,
    pub range: ByteRange,
    pub total_size: u64,
}

impl DataChunk {
    pub fn range_start(&self) -> u64 {
        self.range.start()
    }

    /// Inclusive end, `None` for zero-length content.
    pub fn range_end(&self) -> Option<u64> {
        self.range.last()
    }
}

/// Reads ranges of one object. Called sequentially with ascending ranges;
/// never shared between requests.
#[async_trait]
pub trait DataProvider: Send {
    async fn read(&mut self, range: ByteRange) -> Result<DataChunk, ResponderError>;

    fn strategy(&self) -> AccessStrategy;
}

/// Build the provider matching `metadata.access_strategy`.
pub fn select_provider(
    archive: Arc<dyn ArchiveReader>,
    target: Target,
    metadata: ContentMetadata,
) -> Box<dyn DataProvider> {
    match metadata.access_strategy {
        AccessStrategy::Extracted => Box::new(ExtractedProvider::new(archive, target, metadata)),
        AccessStrategy::DirectMapped => {
            Box::new(DirectMappedProvider::new(archive, target, metadata))
        }
    }
}

fn missing(target: &Target) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("{} is no longer available", target.path()),
    )
}

/// Serves ranges out of one whole-object fetch.
///
/// The object is fetched on the first read and sliced afterwards without
/// copying.
pub struct ExtractedProvider {
    archive: Arc<dyn ArchiveReader>,
    target: Target,
    metadata: ContentMetadata,
    content: Option<Bytes>,
}

impl ExtractedProvider {
    pub fn new(archive: Arc<dyn ArchiveReader>, target: Target, metadata: ContentMetadata) -> Self {
        Self {
            archive,
            target,
            metadata,
            content: None,
        }
    }

    async fn content(&mut self, range: ByteRange) -> Result<Bytes, ResponderError> {
        if let Some(content) = &self.content {
            return Ok(content.clone());
        }

        let content = match self.archive.fetch_whole(&self.target).await {
            Ok(Some(content)) => content,
            Ok(None) => {
                return Err(ResponderError::provider_read(
                    self.target.to_string(),
                    range,
                    missing(&self.target),
                ));
            }
            Err(e) => {
                return Err(ResponderError::provider_read(self.target.to_string(), range, e));
            }
        };

        debug!(url = %self.target, bytes = content.len(), "Content extracted");
        self.content = Some(content.clone());
        Ok(content)
    }
}

#[async_trait]
impl DataProvider for ExtractedProvider {
    async fn read(&mut self, range: ByteRange) -> Result<DataChunk, ResponderError> {
        let content = self.content(range).await?;

        let span = range.as_range();
        if span.end > content.len() as u64 {
            let err = io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("extracted content is only {} bytes", content.len()),
            );
            return Err(ResponderError::provider_read(self.target.to_string(), range, err));
        }

        Ok(DataChunk {
            bytes: content.slice(span.start as usize..span.end as usize),
            mime_type: self.metadata.mime_type.clone(),
            range,
            total_size: self.metadata.byte_length,
        })
    }

    fn strategy(&self) -> AccessStrategy {
        AccessStrategy::Extracted
    }
}

/// Performs exactly one bounded archive read per range.
pub struct DirectMappedProvider {
    archive: Arc<dyn ArchiveReader>,
    target: Target,
    metadata: ContentMetadata,
}

impl DirectMappedProvider {
    pub fn new(archive: Arc<dyn ArchiveReader>, target: Target, metadata: ContentMetadata) -> Self {
        Self {
            archive,
            target,
            metadata,
        }
    }
}

#[async_trait]
impl DataProvider for DirectMappedProvider {
    async fn read(&mut self, range: ByteRange) -> Result<DataChunk, ResponderError> {
        let bytes = if range.is_empty() {
            Bytes::new()
        } else {
            match self.archive.read_range(&self.target, range).await {
                Ok(Some(bytes)) => bytes,
                Ok(None) => {
                    return Err(ResponderError::provider_read(
                        self.target.to_string(),
                        range,
                        missing(&self.target),
                    ));
                }
                Err(e) => {
                    return Err(ResponderError::provider_read(self.target.to_string(), range, e));
                }
            }
        };

        if bytes.len() as u64 != range.len() {
            let err = io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("short read: {} of {} bytes", bytes.len(), range.len()),
            );
            return Err(ResponderError::provider_read(self.target.to_string(), range, err));
        }

        Ok(DataChunk {
            bytes,
            mime_type: self.metadata.mime_type.clone(),
            range,
            total_size: self.metadata.byte_length,
        })
    }

    fn strategy(&self) -> AccessStrategy {
        AccessStrategy::DirectMapped
    }
}
