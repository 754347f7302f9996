//! Tracking of in-flight requests.
//!
//! The registry is the single source of truth for whether a request still
//! wants output. Every externally visible effect the responder performs is
//! preceded by an [`TaskRegistry::is_active`] check, so removing a handle is
//! enough to cancel a request cooperatively.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Opaque identity of one inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestHandle(u64);

impl RequestHandle {
    /// Wrap an identity supplied by the transport.
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// Allocate a process-unique handle.
    pub fn next() -> Self {
        Self(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Membership set of requests that are still eligible to receive data.
///
/// Implementations must be safe to call from many concurrent requests and
/// must never hold a lock across I/O.
pub trait TaskRegistry: Send + Sync {
    /// Register `handle`. Returns `true` only for the call that inserted it;
    /// repeated start signals for an active handle return `false`.
    fn mark_started(&self, handle: RequestHandle) -> bool;

    fn is_active(&self, handle: RequestHandle) -> bool;

    /// Remove `handle`. Stopping an absent handle is a no-op.
    fn stop(&self, handle: RequestHandle);

    /// Remove every handle. Reserved for hard failures of the surrounding
    /// navigation context.
    fn stop_all(&self);

    fn active_count(&self) -> usize;
}

/// Mutex-guarded [`TaskRegistry`].
#[derive(Debug, Default)]
pub struct SharedTaskRegistry {
    active: Mutex<HashSet<RequestHandle>>,
}

impl SharedTaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskRegistry for SharedTaskRegistry {
    fn mark_started(&self, handle: RequestHandle) -> bool {
        let inserted = self.active.lock().insert(handle);
        if !inserted {
            debug!(%handle, "Duplicate start ignored");
        }
        inserted
    }

    fn is_active(&self, handle: RequestHandle) -> bool {
        self.active.lock().contains(&handle)
    }

    fn stop(&self, handle: RequestHandle) {
        if self.active.lock().remove(&handle) {
            debug!(%handle, "Request stopped");
        }
    }

    fn stop_all(&self) {
        let cleared = {
            let mut active = self.active.lock();
            let count = active.len();
            active.clear();
            count
        };
        warn!(cleared, "All requests stopped");
    }

    fn active_count(&self) -> usize {
        self.active.lock().len()
    }
}
