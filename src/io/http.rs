//! Archives served over HTTP.
//!
//! Every read is a `Range` request. The archive size is learned from the
//! `Content-Range` of a one-byte probe, so servers that mishandle `HEAD`
//! still work as long as they honour ranged `GET`s.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{CONTENT_RANGE, RANGE};
use reqwest::{Client, StatusCode};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use super::ReadAt;
use crate::config::RemoteConfig;
use anyhow::{Context, Result, anyhow, bail};

/// Timeouts and retry policy of an [`HttpRangeReader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteOptions {
    pub timeout: Duration,
    /// Attempts per range request, including the first one.
    pub max_retries: u32,
    /// Delay before the second attempt; grows linearly after that.
    pub retry_backoff: Duration,
}

impl Default for RemoteOptions {
    fn default() -> Self {
        Self::from(&RemoteConfig::default())
    }
}

impl From<&RemoteConfig> for RemoteOptions {
    fn from(config: &RemoteConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
            max_retries: config.max_retries.max(1),
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }
}

/// `Content-Range: bytes <start>-<end>/<total>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ContentRange {
    start: u64,
    end: u64,
    total: u64,
}

impl ContentRange {
    fn parse(value: &str) -> Option<Self> {
        let (span, total) = value.trim().strip_prefix("bytes ")?.split_once('/')?;
        let (start, end) = span.split_once('-')?;
        let range = Self {
            start: start.trim().parse().ok()?,
            end: end.trim().parse().ok()?,
            total: total.trim().parse().ok()?,
        };
        (range.start <= range.end && range.end < range.total).then_some(range)
    }
}

/// Random access to a remote archive through HTTP Range requests.
pub struct HttpRangeReader {
    client: Client,
    url: String,
    size: u64,
    options: RemoteOptions,
    transferred_bytes: AtomicU64,
    requests: AtomicU64,
}

impl HttpRangeReader {
    /// Open `url`, learning its size from a one-byte range request.
    ///
    /// A server that answers the probe with a full `200` body cannot serve
    /// random access and is rejected.
    pub async fn open(url: impl Into<String>, options: RemoteOptions) -> Result<Self> {
        let client = Client::builder().timeout(options.timeout).build()?;
        let mut reader = Self {
            client,
            url: url.into(),
            size: 0,
            options,
            transferred_bytes: AtomicU64::new(0),
            requests: AtomicU64::new(0),
        };

        let (range, _) = reader
            .fetch(0, 0)
            .await
            .with_context(|| format!("Failed to open {}", reader.url))?;
        reader.size = range.total;

        debug!(url = %reader.url, size = reader.size, "Remote archive opened");
        Ok(reader)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Body bytes received so far, probe included.
    pub fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes.load(Ordering::Relaxed)
    }

    /// HTTP requests sent so far, retries included.
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// One ranged GET for `start..=end`, retried on connection failures
    /// and 5xx answers.
    async fn fetch(&self, start: u64, end: u64) -> Result<(ContentRange, Bytes)> {
        let range = format!("bytes={start}-{end}");
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.requests.fetch_add(1, Ordering::Relaxed);

            let sent = self
                .client
                .get(&self.url)
                .header(RANGE, &range)
                .send()
                .await;

            let error = match sent {
                Ok(resp) if resp.status() == StatusCode::PARTIAL_CONTENT => {
                    let content_range = resp
                        .headers()
                        .get(CONTENT_RANGE)
                        .and_then(|v| v.to_str().ok())
                        .and_then(ContentRange::parse)
                        .ok_or_else(|| anyhow!("Invalid Content-Range in answer to {range}"))?;
                    if content_range.start != start {
                        bail!(
                            "Asked for {range}, server sent bytes from {}",
                            content_range.start
                        );
                    }
                    let body = resp.bytes().await?;
                    self.transferred_bytes
                        .fetch_add(body.len() as u64, Ordering::Relaxed);
                    return Ok((content_range, body));
                }
                Ok(resp) if resp.status() == StatusCode::OK => {
                    bail!("Remote server does not support Range requests")
                }
                Ok(resp) if resp.status().is_server_error() => {
                    anyhow!("Server answered {range} with {}", resp.status())
                }
                Ok(resp) => bail!("HTTP request for {range} failed with status: {}", resp.status()),
                Err(e) if e.is_timeout() || e.is_connect() => anyhow::Error::new(e),
                Err(e) => return Err(e.into()),
            };

            if attempt >= self.options.max_retries {
                return Err(error.context(format!("Giving up on {range} after {attempt} attempts")));
            }
            warn!(
                url = %self.url,
                range = range.as_str(),
                attempt,
                max_retries = self.options.max_retries,
                error = %error,
                "Range request failed, retrying"
            );
            tokio::time::sleep(self.options.retry_backoff * attempt).await;
        }
    }
}

#[async_trait]
impl ReadAt for HttpRangeReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() || offset >= self.size {
            return Ok(0);
        }

        let end = offset
            .saturating_add(buf.len() as u64 - 1)
            .min(self.size - 1);
        let (range, body) = self.fetch(offset, end).await?;
        if range.total != self.size {
            bail!(
                "Remote archive changed size from {} to {} bytes",
                self.size,
                range.total
            );
        }
        if body.is_empty() {
            bail!("Remote server returned an empty body for bytes={offset}-{end}");
        }

        // A shorter answer is fine, the caller asks again for the rest
        let n = body.len().min((end - offset + 1) as usize);
        buf[..n].copy_from_slice(&body[..n]);
        Ok(n)
    }

    fn size(&self) -> u64 {
        self.size
    }
}
