//! Flow object internals
//!
//! A flow entry couples the mutable half (state, transport slot,
//! delivery queue) with a shared wait half (condition variables and
//! operation counters). The mutable half lives inside the flow table
//! and is protected by the manager's single lock; the wait half is
//! `Arc`-shared so wake-ups can be issued after that lock is dropped,
//! and so a late waker is harmless even once the entry is gone.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Condvar};

use portflow_core::queue::DeliveryQueue;
use portflow_core::state::FlowState;
use portflow_core::transport::FlowTransport;

/// Which counted operation a call path belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OpKind {
    Read,
    Write,
    Post,
}

impl OpKind {
    pub(crate) fn label(self) -> &'static str {
        match self {
            OpKind::Read => "read",
            OpKind::Write => "write",
            OpKind::Post => "post",
        }
    }
}

/// Wait points and in-flight operation counters of one flow
///
/// The counters are only ever examined while the table lock is held;
/// relaxed ordering is sufficient.
pub(crate) struct FlowWait {
    /// Wakes blocked readers (data arrived or flow deallocated)
    pub(crate) read_cv: Condvar,

    /// Wakes blocked writers (write re-enabled or flow deallocated)
    pub(crate) write_cv: Condvar,

    pub(crate) readers: AtomicU32,
    pub(crate) writers: AtomicU32,
    pub(crate) posters: AtomicU32,
}

impl FlowWait {
    pub(crate) fn new() -> Self {
        Self {
            read_cv: Condvar::new(),
            write_cv: Condvar::new(),
            readers: AtomicU32::new(0),
            writers: AtomicU32::new(0),
            posters: AtomicU32::new(0),
        }
    }

    /// The counter for the given operation kind
    #[inline]
    pub(crate) fn counter(&self, kind: OpKind) -> &AtomicU32 {
        match kind {
            OpKind::Read => &self.readers,
            OpKind::Write => &self.writers,
            OpKind::Post => &self.posters,
        }
    }

    /// Check that no operation is in flight
    #[inline]
    pub(crate) fn quiescent(&self) -> bool {
        self.readers.load(Ordering::Relaxed) == 0
            && self.writers.load(Ordering::Relaxed) == 0
            && self.posters.load(Ordering::Relaxed) == 0
    }
}

/// One flow endpoint as stored in the flow table
pub(crate) struct FlowEntry {
    pub(crate) state: FlowState,

    /// Backing transport, attached at bind time
    pub(crate) transport: Option<Arc<dyn FlowTransport>>,

    /// Inbound SDUs awaiting a reader
    pub(crate) queue: DeliveryQueue,

    /// Shared wait half
    pub(crate) wait: Arc<FlowWait>,
}

impl FlowEntry {
    /// Create a freshly reserved flow with no transport yet
    pub(crate) fn new_pending() -> Self {
        Self {
            state: FlowState::Pending,
            transport: None,
            queue: DeliveryQueue::new(),
            wait: Arc::new(FlowWait::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_pending() {
        let entry = FlowEntry::new_pending();
        assert_eq!(entry.state, FlowState::Pending);
        assert!(entry.transport.is_none());
        assert!(entry.queue.is_empty());
        assert!(entry.wait.quiescent());
    }

    #[test]
    fn test_quiescent_tracks_counters() {
        let wait = FlowWait::new();
        assert!(wait.quiescent());

        wait.counter(OpKind::Write).fetch_add(1, Ordering::Relaxed);
        assert!(!wait.quiescent());

        wait.counter(OpKind::Write).fetch_sub(1, Ordering::Relaxed);
        assert!(wait.quiescent());
    }

    #[test]
    fn test_op_kind_labels() {
        assert_eq!(OpKind::Read.label(), "read");
        assert_eq!(OpKind::Write.label(), "write");
        assert_eq!(OpKind::Post.label(), "post");
    }
}
