//! ZIP archive parsing and extraction.
//!
//! - [`structures`]: on-disk records (EOCD, ZIP64 records, entry metadata)
//! - [`parser`]: reads the Central Directory and local headers
//! - [`extractor`]: whole-entry extraction and ranged reads of STORED entries
//!
//! Supported: standard and ZIP64 archives, STORED and DEFLATE entries.
//! Not supported: encryption, multi-disk archives, other compression methods.

mod extractor;
mod parser;
mod structures;

pub use extractor::ZipExtractor;
pub use parser::ZipParser;
pub use structures::*;
