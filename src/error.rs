//! Error types shared across the responder pipeline.

use thiserror::Error;

use crate::ranges::ByteRange;

/// Boxed source error carried by provider failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures surfaced to the transport by the responder.
///
/// "Not found" is deliberately absent: a missing target is answered with a
/// 404 response, not with an error signal.
#[derive(Debug, Error)]
pub enum ResponderError {
    #[error("unsupported target {target}: {reason}")]
    UnsupportedTarget { target: String, reason: String },

    #[error("blocked resource: {target}")]
    BlockedResource { target: String },

    #[error("failed to read {range} of {target}: {source}")]
    ProviderRead {
        target: String,
        range: ByteRange,
        #[source]
        source: BoxError,
    },
}

impl ResponderError {
    /// The target the failure is attached to, for diagnostics.
    pub fn target(&self) -> &str {
        match self {
            ResponderError::UnsupportedTarget { target, .. }
            | ResponderError::BlockedResource { target }
            | ResponderError::ProviderRead { target, .. } => target,
        }
    }

    pub(crate) fn provider_read(
        target: impl Into<String>,
        range: ByteRange,
        source: impl Into<BoxError>,
    ) -> Self {
        ResponderError::ProviderRead {
            target: target.into(),
            range,
            source: source.into(),
        }
    }
}

/// Failures raised by archive readers.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("unsupported compression method {method} for {path}")]
    UnsupportedCompression { path: String, method: u16 },

    #[error("range {range} is outside of {path} ({size} bytes)")]
    RangeOutOfBounds {
        path: String,
        range: ByteRange,
        size: u64,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive format error: {0}")]
    Format(#[source] BoxError),
}

impl From<anyhow::Error> for ArchiveError {
    fn from(err: anyhow::Error) -> Self {
        ArchiveError::Format(err.into())
    }
}
