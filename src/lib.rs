//! # archstream
//!
//! Streams content stored in ZIP archives to a client over a custom URL
//! scheme (`kiwix://<archive-id>/<path>`), with HTTP-like responses: a status
//! head, a chunked body and a finish or fail signal.
//!
//! Large media is read range by range straight from the archive bytes, so
//! memory use is bounded by the chunk size. Other content is extracted once
//! and sliced. Requests are cancelled cooperatively through a shared
//! [`TaskRegistry`]: nothing is sent to a sink whose handle was stopped.
//!
//! Archives can be local files (memory mapped or read positionally) or
//! remote files fetched with HTTP Range requests.
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use archstream::{
//!     ArchiveLibrary, RecordingSink, RequestHandle, Responder, ResponderConfig,
//!     SharedTaskRegistry, ZipArchive,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let library = Arc::new(ArchiveLibrary::new());
//!     let archive = ZipArchive::open_path(Path::new("wiki.zip")).await?;
//!     library.insert("wiki", Arc::new(archive));
//!
//!     let responder = Arc::new(Responder::new(
//!         Arc::new(SharedTaskRegistry::new()),
//!         library,
//!         ResponderConfig::default(),
//!     ));
//!
//!     let sink = Arc::new(RecordingSink::new());
//!     if let Some(task) = responder.on_start(RequestHandle::next(), "kiwix://wiki/index.html", sink.clone()) {
//!         println!("{:?}", task.await?);
//!     }
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod cli;
pub mod config;
pub mod error;
pub mod humanize;
pub mod io;
pub mod metadata;
pub mod provider;
pub mod ranges;
pub mod registry;
pub mod responder;
pub mod stream;
pub mod target;
pub mod transport;
pub mod zip;

pub use archive::{ArchiveLibrary, ArchiveReader, ZipArchive};
pub use cli::Cli;
pub use config::ResponderConfig;
pub use error::{ArchiveError, ResponderError};
pub use io::{HttpRangeReader, LocalFileReader, MmapReader, ReadAt, RemoteOptions};
pub use metadata::{AccessStrategy, ContentMetadata, MetadataResolver};
pub use provider::{DataChunk, DataProvider};
pub use ranges::{ByteRange, plan};
pub use registry::{RequestHandle, SharedTaskRegistry, TaskRegistry};
pub use responder::{FailureKind, Outcome, Responder};
pub use stream::ChunkedDataStream;
pub use target::Target;
pub use transport::{ChannelSink, RecordingSink, ResponseHead, StatusCode, TransportEvent, TransportSink};
pub use zip::{ZipExtractor, ZipFileEntry};
