//! Byte range planning.
//!
//! Content is delivered as an ordered list of contiguous, non-overlapping
//! ranges. Small content is read in one go; anything larger than the chunk
//! size is split so that no single read materializes more than `chunk_size`
//! bytes.

use std::fmt;
use std::ops::Range;

/// Default upper bound for a single chunk: 2 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 2 * 1024 * 1024;

/// A span of byte offsets within a piece of content.
///
/// Non-empty ranges are closed intervals `[start, last]`. The only empty
/// range the planner produces is the one describing zero-length content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    start: u64,
    len: u64,
}

impl ByteRange {
    /// Closed interval `[start, end]`, end inclusive.
    ///
    /// # Panics
    ///
    /// Panics if `end < start`.
    pub fn inclusive(start: u64, end: u64) -> Self {
        assert!(end >= start, "range end {end} precedes start {start}");
        Self {
            start,
            len: end - start + 1,
        }
    }

    /// The empty range at offset zero.
    pub const fn empty() -> Self {
        Self { start: 0, len: 0 }
    }

    pub const fn start(&self) -> u64 {
        self.start
    }

    /// Inclusive end offset, `None` for the empty range.
    pub const fn last(&self) -> Option<u64> {
        if self.len == 0 {
            None
        } else {
            Some(self.start + self.len - 1)
        }
    }

    pub const fn len(&self) -> u64 {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Half-open equivalent, convenient for slicing.
    pub const fn as_range(&self) -> Range<u64> {
        self.start..self.start + self.len
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.last() {
            Some(last) => write!(f, "[{},{}]", self.start, last),
            None => write!(f, "[{},empty]", self.start),
        }
    }
}

/// Plan the ranges used to stream `length` bytes.
///
/// Returns a single `[0, length-1]` range when the content fits in one
/// chunk, a single empty range for zero-length content, and otherwise
/// `ceil(length / chunk_size)` ranges in ascending order. The order of the
/// returned ranges is the emission order.
pub fn plan(length: u64, chunk_size: u64) -> Vec<ByteRange> {
    let chunk_size = chunk_size.max(1);

    if length == 0 {
        return vec![ByteRange::empty()];
    }

    // Read in one go
    if length <= chunk_size {
        return vec![ByteRange::inclusive(0, length - 1)];
    }

    let count = length.div_ceil(chunk_size);
    let mut ranges = Vec::with_capacity(count as usize);
    let mut start = 0u64;
    while start < length {
        let end = (start + chunk_size).min(length) - 1;
        ranges.push(ByteRange::inclusive(start, end));
        start = end + 1;
    }

    ranges
}
