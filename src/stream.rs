//! Lazy, forward-only chunk sequence over a provider.

use futures::Stream;
use futures::stream;
use std::vec;
use tracing::debug;

use crate::error::ResponderError;
use crate::provider::{DataChunk, DataProvider};
use crate::ranges::ByteRange;

/// Pulls one planned range at a time from a provider.
///
/// Nothing is read ahead: the provider is called only from
/// [`next_chunk`](Self::next_chunk). After the last range or the first error
/// the stream is exhausted and cannot be restarted.
pub struct ChunkedDataStream {
    provider: Box<dyn DataProvider>,
    ranges: vec::IntoIter<ByteRange>,
    done: bool,
}

impl ChunkedDataStream {
    pub fn new(provider: Box<dyn DataProvider>, ranges: Vec<ByteRange>) -> Self {
        Self {
            provider,
            ranges: ranges.into_iter(),
            done: false,
        }
    }

    /// Read the next range. `None` once the sequence has ended.
    pub async fn next_chunk(&mut self) -> Option<Result<DataChunk, ResponderError>> {
        if self.done {
            return None;
        }
        let Some(range) = self.ranges.next() else {
            self.done = true;
            return None;
        };

        let result = self.provider.read(range).await;
        if let Err(e) = &result {
            debug!(%range, error = %e, "Chunk stream terminated by provider failure");
            self.done = true;
        }
        Some(result)
    }

    /// Ranges not yet pulled.
    pub fn remaining(&self) -> usize {
        if self.done { 0 } else { self.ranges.len() }
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<DataChunk, ResponderError>> + Send {
        stream::unfold(self, |mut chunks| async move {
            let next = chunks.next_chunk().await?;
            Some((next, chunks))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::AccessStrategy;
    use crate::ranges::plan;
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::StreamExt;
    use std::io;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider serving zero bytes, failing at a chosen call.
    struct CountingProvider {
        reads: Arc<AtomicUsize>,
        fail_at: Option<usize>,
    }

    #[async_trait]
    impl DataProvider for CountingProvider {
        async fn read(&mut self, range: ByteRange) -> Result<DataChunk, ResponderError> {
            let n = self.reads.fetch_add(1, Ordering::SeqCst);
            if self.fail_at == Some(n) {
                return Err(ResponderError::provider_read(
                    "kiwix://wiki/I/clip.mp4",
                    range,
                    io::Error::other("handle invalidated"),
                ));
            }
            Ok(DataChunk {
                bytes: Bytes::from(vec![0u8; range.len() as usize]),
                mime_type: mime::APPLICATION_OCTET_STREAM,
                range,
                total_size: 0,
            })
        }

        fn strategy(&self) -> AccessStrategy {
            AccessStrategy::DirectMapped
        }
    }

    fn stream_over(len: u64, chunk: u64, fail_at: Option<usize>) -> (ChunkedDataStream, Arc<AtomicUsize>) {
        let reads = Arc::new(AtomicUsize::new(0));
        let provider = CountingProvider {
            reads: reads.clone(),
            fail_at,
        };
        (ChunkedDataStream::new(Box::new(provider), plan(len, chunk)), reads)
    }

    #[tokio::test]
    async fn test_yields_ranges_in_order() {
        let (mut chunks, reads) = stream_over(10, 4, None);
        assert_eq!(chunks.remaining(), 3);

        let mut seen = Vec::new();
        while let Some(chunk) = chunks.next_chunk().await {
            seen.push(chunk.unwrap().range);
        }

        assert_eq!(
            seen,
            vec![
                ByteRange::inclusive(0, 3),
                ByteRange::inclusive(4, 7),
                ByteRange::inclusive(8, 9),
            ]
        );
        assert_eq!(reads.load(Ordering::SeqCst), 3);
        assert!(chunks.next_chunk().await.is_none());
    }

    #[tokio::test]
    async fn test_no_read_ahead() {
        let (mut chunks, reads) = stream_over(10, 4, None);
        assert_eq!(reads.load(Ordering::SeqCst), 0);

        chunks.next_chunk().await.unwrap().unwrap();
        assert_eq!(reads.load(Ordering::SeqCst), 1);
        assert_eq!(chunks.remaining(), 2);
    }

    #[tokio::test]
    async fn test_error_terminates() {
        let (mut chunks, reads) = stream_over(10, 4, Some(1));

        assert!(chunks.next_chunk().await.unwrap().is_ok());
        assert!(chunks.next_chunk().await.unwrap().is_err());
        assert!(chunks.next_chunk().await.is_none());
        assert!(chunks.next_chunk().await.is_none());
        assert_eq!(chunks.remaining(), 0);
        assert_eq!(reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_zero_length_yields_one_empty_chunk() {
        let (mut chunks, _) = stream_over(0, 4, None);

        let chunk = chunks.next_chunk().await.unwrap().unwrap();
        assert!(chunk.bytes.is_empty());
        assert!(chunk.range.is_empty());
        assert!(chunks.next_chunk().await.is_none());
    }

    #[tokio::test]
    async fn test_into_stream() {
        let (chunks, _) = stream_over(10, 4, Some(2));
        let results: Vec<_> = chunks.into_stream().collect().await;

        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_ok());
        assert!(results[2].is_err());
    }
}
