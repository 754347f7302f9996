//! Request orchestration.
//!
//! A request moves through
//! `Idle -> Started -> MetadataResolved -> Streaming -> {Finished | Failed | Stopped}`.
//! Cancellation is cooperative: the registry is consulted immediately before
//! every externally visible effect, and an inactive handle suppresses that
//! effect and everything after it.

use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::archive::ArchiveReader;
use crate::config::ResponderConfig;
use crate::error::ResponderError;
use crate::metadata::{MetadataResolver, ResolvedContent};
use crate::provider::select_provider;
use crate::ranges::plan;
use crate::registry::{RequestHandle, TaskRegistry};
use crate::stream::ChunkedDataStream;
use crate::target::Target;
use crate::transport::{ResponseHead, TransportSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseState {
    Idle,
    Started,
    MetadataResolved,
    Streaming,
    Finished,
    Failed,
    Stopped,
}

impl ResponseState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ResponseState::Finished | ResponseState::Failed | ResponseState::Stopped
        )
    }
}

impl fmt::Display for ResponseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Why a request ended with a failure signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    UnsupportedTarget,
    Blocked,
    ProviderRead,
}

/// How a request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Head, `chunks` data emissions and finish were delivered.
    Finished { chunks: usize, bytes: u64 },
    /// A 404 head and finish were delivered.
    NotFound,
    /// A failure signal was delivered.
    Failed(FailureKind),
    /// The handle went inactive; later effects were suppressed.
    Stopped,
}

/// Serves custom-scheme targets to transport sinks.
pub struct Responder {
    registry: Arc<dyn TaskRegistry>,
    archive: Arc<dyn ArchiveReader>,
    resolver: MetadataResolver,
    config: ResponderConfig,
}

impl Responder {
    pub fn new(
        registry: Arc<dyn TaskRegistry>,
        archive: Arc<dyn ArchiveReader>,
        config: ResponderConfig,
    ) -> Self {
        let resolver = MetadataResolver::new(
            Arc::clone(&archive),
            config.main_page_candidates.clone(),
        );
        Self {
            registry,
            archive,
            resolver,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<dyn TaskRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &ResponderConfig {
        &self.config
    }

    /// Begin handling `raw_target` on a new task.
    ///
    /// Returns `None` when `handle` is already started; the duplicate start
    /// is ignored.
    pub fn on_start(
        self: &Arc<Self>,
        handle: RequestHandle,
        raw_target: impl Into<String>,
        sink: Arc<dyn TransportSink>,
    ) -> Option<JoinHandle<Outcome>> {
        if !self.registry.mark_started(handle) {
            debug!(%handle, "Duplicate start ignored");
            return None;
        }

        let responder = Arc::clone(self);
        let raw_target = raw_target.into();
        Some(tokio::spawn(async move {
            responder.respond(handle, &raw_target, sink).await
        }))
    }

    /// Cooperative cancel of one request.
    pub fn on_stop(&self, handle: RequestHandle) {
        debug!(%handle, "Stop requested");
        self.registry.stop(handle);
    }

    /// Cancel every request, e.g. when the navigation context is torn down.
    pub fn on_hard_failure(&self) {
        warn!(active = self.registry.active_count(), "Hard failure, stopping all requests");
        self.registry.stop_all();
    }

    /// Run one request to completion.
    ///
    /// The handle must already be marked started; [`on_start`](Self::on_start)
    /// does that before spawning this. The handle is unregistered when this
    /// returns, whatever the outcome.
    pub async fn respond(
        &self,
        handle: RequestHandle,
        raw_target: &str,
        sink: Arc<dyn TransportSink>,
    ) -> Outcome {
        let mut exchange = Exchange::new(handle, self.registry.as_ref(), sink);
        exchange.transition(ResponseState::Started);

        let target = match Target::parse(raw_target, &self.config.scheme) {
            Ok(target) => target,
            Err(e) => {
                warn!(%handle, url = raw_target, error = %e, "Unsupported target");
                let error = ResponderError::UnsupportedTarget {
                    target: raw_target.to_string(),
                    reason: e.to_string(),
                };
                return exchange.fail(error, FailureKind::UnsupportedTarget);
            }
        };

        if self.config.blocked_scripts.is_blocked(&target) {
            info!(%handle, %target, "Blocked script");
            let error = ResponderError::BlockedResource {
                target: target.to_string(),
            };
            return exchange.fail(error, FailureKind::Blocked);
        }

        let Some(ResolvedContent { target, metadata }) = self.resolver.locate(&target).await
        else {
            debug!(%handle, %target, "Target not found");
            return exchange.not_found();
        };
        exchange.transition(ResponseState::MetadataResolved);

        let ranges = plan(metadata.byte_length, self.config.chunk_size());
        debug!(
            %handle,
            %target,
            length = metadata.byte_length,
            strategy = ?metadata.access_strategy,
            ranges = ranges.len(),
            "Metadata resolved"
        );

        let head = ResponseHead::ok(metadata.content_type(), metadata.byte_length);
        let provider = select_provider(Arc::clone(&self.archive), target.clone(), metadata);
        let mut chunks = ChunkedDataStream::new(provider, ranges);

        if !exchange.start_response(head) {
            return Outcome::Stopped;
        }

        let mut sent = 0usize;
        let mut bytes = 0u64;
        loop {
            if !exchange.check_active() {
                return Outcome::Stopped;
            }
            match chunks.next_chunk().await {
                Some(Ok(chunk)) => {
                    if chunk.bytes.is_empty() {
                        continue;
                    }
                    let len = chunk.bytes.len() as u64;
                    if !exchange.receive_data(chunk.bytes) {
                        return Outcome::Stopped;
                    }
                    sent += 1;
                    bytes += len;
                }
                Some(Err(e)) => {
                    warn!(%handle, url = e.target(), error = %e, "Provider read failed");
                    return exchange.fail(e, FailureKind::ProviderRead);
                }
                None => break,
            }
        }

        if !exchange.finish() {
            return Outcome::Stopped;
        }
        info!(%handle, %target, chunks = sent, bytes, "Response finished");
        Outcome::Finished {
            chunks: sent,
            bytes,
        }
    }
}

/// Effects of one request against its sink.
///
/// Every effect is preceded by a registry check. The head is emitted at
/// most once and at most one terminal signal follows it. Dropping the
/// exchange unregisters the handle.
struct Exchange<'a> {
    handle: RequestHandle,
    registry: &'a dyn TaskRegistry,
    sink: Arc<dyn TransportSink>,
    state: ResponseState,
    head_sent: bool,
}

impl<'a> Exchange<'a> {
    fn new(
        handle: RequestHandle,
        registry: &'a dyn TaskRegistry,
        sink: Arc<dyn TransportSink>,
    ) -> Self {
        Self {
            handle,
            registry,
            sink,
            state: ResponseState::Idle,
            head_sent: false,
        }
    }

    fn transition(&mut self, next: ResponseState) {
        debug!(handle = %self.handle, from = %self.state, to = %next, "State transition");
        self.state = next;
    }

    /// Whether effects may still be emitted. Moves to `Stopped` otherwise.
    fn check_active(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        if self.registry.is_active(self.handle) {
            return true;
        }
        debug!(handle = %self.handle, state = %self.state, "Handle inactive, suppressing output");
        self.transition(ResponseState::Stopped);
        false
    }

    fn start_response(&mut self, head: ResponseHead) -> bool {
        if self.head_sent || !self.check_active() {
            return false;
        }
        debug!(handle = %self.handle, status = %head.status, "Sending response head");
        self.sink.start_response(head);
        self.head_sent = true;
        self.transition(ResponseState::Streaming);
        true
    }

    fn receive_data(&mut self, data: bytes::Bytes) -> bool {
        if !self.head_sent || !self.check_active() {
            return false;
        }
        self.sink.receive_data(data);
        true
    }

    fn finish(&mut self) -> bool {
        if !self.check_active() {
            return false;
        }
        self.sink.finish();
        self.transition(ResponseState::Finished);
        true
    }

    fn fail(&mut self, error: ResponderError, kind: FailureKind) -> Outcome {
        if !self.check_active() {
            return Outcome::Stopped;
        }
        self.sink.fail(error);
        self.transition(ResponseState::Failed);
        Outcome::Failed(kind)
    }

    fn not_found(&mut self) -> Outcome {
        if !self.start_response(ResponseHead::not_found()) {
            return Outcome::Stopped;
        }
        if !self.finish() {
            return Outcome::Stopped;
        }
        Outcome::NotFound
    }
}

impl Drop for Exchange<'_> {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            debug!(handle = %self.handle, state = %self.state, "Request abandoned");
        }
        self.registry.stop(self.handle);
    }
}
