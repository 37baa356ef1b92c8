//! Flow lifecycle manager
//!
//! The facade over the port-id allocator, the flow table and the
//! deferred teardown worker. One mutex guards table membership and
//! per-flow state; it is never held across a transport `send` or a
//! condvar wait (waits release it atomically). The three per-flow
//! counters (`readers`/`writers`/`posters`) let concurrent calls hold
//! transient access to a flow whose destruction is pending: whichever
//! exit path observes all three at zero with the flow DEALLOCATED
//! performs the one-time destruction, under the same mutex, so
//! destruction happens exactly once and never while another call still
//! references the delivery queue.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crossbeam_queue::SegQueue;
use log::{debug, error, warn};

use portflow_core::cancel::CancellationToken;
use portflow_core::error::{FlowError, FlowResult};
use portflow_core::id::PortId;
use portflow_core::pidm::PortIdAllocator;
use portflow_core::sdu::Sdu;
use portflow_core::state::FlowState;
use portflow_core::transport::FlowTransport;

use crate::config::FlowManagerConfig;
use crate::flow::{FlowEntry, FlowWait, OpKind};
use crate::table::FlowTable;
use crate::teardown::{Parking, TeardownWorker};

/// Counters exposed by [`FlowManager::stats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerStats {
    /// Flows created over the manager's lifetime
    pub flows_created: u64,

    /// Flows destroyed over the manager's lifetime
    ///
    /// Under the destruction protocol this never exceeds
    /// `flows_created`, and each port's flow contributes exactly once.
    pub flows_destroyed: u64,

    /// Port ids currently reserved
    pub ports_reserved: u32,

    /// Flows currently in the table
    pub active_flows: usize,
}

/// What a reader should do after inspecting the flow
enum ReadCheck {
    Pop,
    Wait,
    Gone,
    Deallocated,
}

pub(crate) struct ManagerInner {
    pub(crate) config: FlowManagerConfig,
    pidm: PortIdAllocator,
    table: Mutex<FlowTable>,

    /// Ports whose destruction was deferred past `deallocate_flow`
    pub(crate) delq: SegQueue<PortId>,
    pub(crate) del_parking: Parking,
    pub(crate) shutdown: AtomicBool,

    flows_created: AtomicU64,
    flows_destroyed: AtomicU64,
}

impl ManagerInner {
    fn lock_table(&self) -> MutexGuard<'_, FlowTable> {
        self.table.lock().unwrap()
    }

    /// One-time destruction: detach the entry, drain the queue,
    /// release the port id. Caller holds the table lock.
    fn destroy_locked(&self, table: &mut FlowTable, port: PortId) {
        let Some(mut entry) = table.remove(port) else {
            // Someone else already destroyed it; nothing to do.
            debug!("flow on port {} was already destroyed", port);
            return;
        };

        let dropped = entry.queue.drain();
        if dropped > 0 {
            warn!("dropping {} undelivered SDUs on port {}", dropped, port);
        }

        if let Err(e) = self.pidm.release(port) {
            // Non-fatal: the teardown itself still completes.
            warn!("could not release port {}: {}", port, e);
        }

        self.flows_destroyed.fetch_add(1, Ordering::Relaxed);
        debug!("flow on port {} destroyed", port);
    }

    /// Decrement the counter for a finished operation and perform the
    /// one-time destruction if this was the last reference to a
    /// deallocated flow. Consumes the table guard.
    ///
    /// Returns true if the flow was destroyed here.
    fn finish_op(
        &self,
        mut table: MutexGuard<'_, FlowTable>,
        port: PortId,
        wait: &FlowWait,
        kind: OpKind,
    ) -> bool {
        debug!("finishing ({}) on port {}", kind.label(), port);
        wait.counter(kind).fetch_sub(1, Ordering::Relaxed);

        if wait.quiescent() {
            if let Some(entry) = table.get(port) {
                if entry.state == FlowState::Deallocated {
                    self.destroy_locked(&mut table, port);
                    return true;
                }
            }
        }
        false
    }

    /// `finish_op` for error exits: every early return still balances
    /// its counter and re-checks for destruction before propagating.
    fn finish_err<T>(
        &self,
        table: MutexGuard<'_, FlowTable>,
        port: PortId,
        wait: &FlowWait,
        kind: OpKind,
        err: FlowError,
    ) -> FlowResult<T> {
        self.finish_op(table, port, wait, kind);
        Err(err)
    }

    /// Deferred half of `deallocate_flow`, run on the teardown worker:
    /// destroy the flow if it is quiescent by now, otherwise wake every
    /// blocked call so the last one to exit destroys it inline.
    pub(crate) fn process_teardown(&self, port: PortId) {
        let mut table = self.lock_table();

        let Some(entry) = table.get(port) else {
            debug!("flow on port {} was already destroyed", port);
            return;
        };

        if entry.state != FlowState::Deallocated {
            error!("port {} queued for teardown but not deallocated", port);
            return;
        }

        let wait = Arc::clone(&entry.wait);
        if wait.quiescent() {
            self.destroy_locked(&mut table, port);
            return;
        }

        drop(table);
        debug!("port {} still busy, waking all waiters", port);
        wait.read_cv.notify_all();
        wait.write_cv.notify_all();
    }
}

/// The port flow lifecycle manager
///
/// Owns every flow endpoint. All operations take `&self` and are safe
/// to call from any thread; `deallocate_flow` never blocks the caller.
pub struct FlowManager {
    inner: Arc<ManagerInner>,
    worker: TeardownWorker,
}

impl FlowManager {
    /// Create a manager and start its teardown worker
    pub fn new(config: FlowManagerConfig) -> Self {
        let inner = Arc::new(ManagerInner {
            pidm: PortIdAllocator::new(config.max_ports),
            config,
            table: Mutex::new(FlowTable::new()),
            delq: SegQueue::new(),
            del_parking: Parking::new(),
            shutdown: AtomicBool::new(false),
            flows_created: AtomicU64::new(0),
            flows_destroyed: AtomicU64::new(0),
        });
        let worker = TeardownWorker::spawn(Arc::clone(&inner));
        Self { inner, worker }
    }

    /// Reserve a port id for a future flow
    pub fn reserve_port(&self) -> FlowResult<PortId> {
        if self.inner.shutdown.load(Ordering::Acquire) {
            return Err(FlowError::Shutdown);
        }
        let port = self.inner.pidm.reserve()?;
        debug!("reserved port {}", port);
        Ok(port)
    }

    /// Release a reserved port id
    ///
    /// If a flow still occupies the port, the release is deferred to
    /// that flow's destruction and reported as success, so the id
    /// cannot be re-reserved while the old flow is still live.
    pub fn release_port(&self, port: PortId) -> FlowResult<()> {
        if !port.is_ok() {
            return Err(FlowError::NotReserved);
        }

        let table = self.inner.lock_table();
        if table.contains(port) {
            debug!("port {} still has a flow, release deferred", port);
            return Ok(());
        }
        self.inner.pidm.release(port)
    }

    /// Create a flow in PENDING state on a reserved port
    pub fn create_flow(&self, port: PortId) -> FlowResult<()> {
        if self.inner.shutdown.load(Ordering::Acquire) {
            return Err(FlowError::Shutdown);
        }
        if !port.is_ok() || !self.inner.pidm.is_reserved(port) {
            return Err(FlowError::NotReserved);
        }

        let mut table = self.inner.lock_table();
        table.insert(port, FlowEntry::new_pending())?;
        self.inner.flows_created.fetch_add(1, Ordering::Relaxed);
        debug!("flow pre-bound to port {}", port);
        Ok(())
    }

    /// Attach a backing transport, moving the flow to ALLOCATED
    ///
    /// Re-binding an already bound flow replaces its transport.
    pub fn bind_flow(&self, port: PortId, transport: Arc<dyn FlowTransport>) -> FlowResult<()> {
        let mut table = self.inner.lock_table();
        let entry = table.get_mut(port).ok_or(FlowError::NoSuchFlow)?;
        if entry.state == FlowState::Deallocated {
            return Err(FlowError::AlreadyDeallocated);
        }

        entry.transport = Some(transport);
        entry.state = FlowState::Allocated;
        debug!("flow bound to port {}", port);
        Ok(())
    }

    /// Blocking write: hand one SDU to the backing transport
    ///
    /// Blocks while the flow is PENDING or DISABLED; unblocked by
    /// `bind_flow`, `enable_write` or `deallocate_flow`.
    pub fn write(&self, port: PortId, sdu: Sdu) -> FlowResult<()> {
        self.write_with_token(port, sdu, &CancellationToken::dummy())
    }

    /// Blocking write with a cancellation token
    pub fn write_with_token(
        &self,
        port: PortId,
        sdu: Sdu,
        token: &CancellationToken,
    ) -> FlowResult<()> {
        let inner = &*self.inner;
        debug!("trying to write SDU to port {}", port);

        let mut table = inner.lock_table();
        let wait = {
            let entry = table.get(port).ok_or(FlowError::NoSuchFlow)?;
            if entry.state == FlowState::Deallocated {
                return Err(FlowError::AlreadyDeallocated);
            }
            Arc::clone(&entry.wait)
        };
        wait.writers.fetch_add(1, Ordering::Relaxed);

        loop {
            let proceed = match table.get(port) {
                // Destroyed while we waited; the counters went with it.
                None => return Err(FlowError::NoSuchFlow),
                Some(entry) => entry.state.unblocks_writer(),
            };
            if proceed {
                break;
            }

            let (guard, _timed_out) = wait
                .write_cv
                .wait_timeout(table, inner.config.wait_tick)
                .unwrap();
            table = guard;

            if token.is_cancelled() {
                debug!("write wait on port {} interrupted", port);
                return inner.finish_err(table, port, &wait, OpKind::Write, FlowError::Interrupted);
            }
        }

        let transport = {
            let Some(entry) = table.get(port) else {
                return Err(FlowError::NoSuchFlow);
            };
            if entry.state == FlowState::Deallocated {
                // Woken by teardown: abort without delivering.
                debug!("flow on port {} deallocated, aborting write", port);
                return inner.finish_err(
                    table,
                    port,
                    &wait,
                    OpKind::Write,
                    FlowError::AlreadyDeallocated,
                );
            }
            match &entry.transport {
                Some(t) => Arc::clone(t),
                None => {
                    return inner.finish_err(
                        table,
                        port,
                        &wait,
                        OpKind::Write,
                        FlowError::NotBound,
                    )
                }
            }
        };

        // The actual transfer runs without the table lock, so writers
        // on other flows are never serialized against this one.
        drop(table);
        let sent = transport.send(port, sdu);

        let table = inner.lock_table();
        inner.finish_op(table, port, &wait, OpKind::Write);

        sent.map_err(|e| {
            error!("transport send failed on port {}: {}", port, e);
            FlowError::Transport(e)
        })
    }

    /// Blocking read: pop the oldest delivered SDU
    ///
    /// Blocks while the queue is empty (or the flow is still PENDING);
    /// unblocked by `post` or `deallocate_flow`. After deallocation,
    /// remaining queued SDUs may still be drained; once the queue is
    /// empty the read fails with `AlreadyDeallocated`.
    pub fn read(&self, port: PortId) -> FlowResult<Sdu> {
        self.read_with_token(port, &CancellationToken::dummy())
    }

    /// Blocking read with a cancellation token
    pub fn read_with_token(&self, port: PortId, token: &CancellationToken) -> FlowResult<Sdu> {
        let inner = &*self.inner;
        debug!("trying to read SDU from port {}", port);

        let mut table = inner.lock_table();
        let wait = {
            let entry = table.get(port).ok_or(FlowError::NoSuchFlow)?;
            if entry.state == FlowState::Deallocated && entry.queue.is_empty() {
                return Err(FlowError::AlreadyDeallocated);
            }
            Arc::clone(&entry.wait)
        };
        wait.readers.fetch_add(1, Ordering::Relaxed);

        loop {
            let check = match table.get(port) {
                None => ReadCheck::Gone,
                Some(entry) => {
                    if entry.state == FlowState::Deallocated {
                        if entry.queue.is_empty() {
                            ReadCheck::Deallocated
                        } else {
                            ReadCheck::Pop
                        }
                    } else if entry.state.readable() && !entry.queue.is_empty() {
                        ReadCheck::Pop
                    } else {
                        ReadCheck::Wait
                    }
                }
            };

            match check {
                ReadCheck::Pop => break,
                ReadCheck::Gone => return Err(FlowError::NoSuchFlow),
                ReadCheck::Deallocated => {
                    debug!("flow on port {} deallocated and drained", port);
                    return inner.finish_err(
                        table,
                        port,
                        &wait,
                        OpKind::Read,
                        FlowError::AlreadyDeallocated,
                    );
                }
                ReadCheck::Wait => {
                    let (guard, _timed_out) = wait
                        .read_cv
                        .wait_timeout(table, inner.config.wait_tick)
                        .unwrap();
                    table = guard;

                    if token.is_cancelled() {
                        debug!("read wait on port {} interrupted", port);
                        return inner.finish_err(
                            table,
                            port,
                            &wait,
                            OpKind::Read,
                            FlowError::Interrupted,
                        );
                    }
                }
            }
        }

        // The lock has been held since the last check; the pop cannot miss.
        match table.get_mut(port).and_then(|entry| entry.queue.pop()) {
            Some(sdu) => {
                inner.finish_op(table, port, &wait, OpKind::Read);
                Ok(sdu)
            }
            None => inner.finish_err(table, port, &wait, OpKind::Read, FlowError::NoSuchFlow),
        }
    }

    /// Deliver one inbound SDU into the flow's queue; never blocks
    ///
    /// Called by the backing transport. Wakes one blocked reader.
    pub fn post(&self, port: PortId, sdu: Sdu) -> FlowResult<()> {
        let inner = &*self.inner;
        debug!("posting SDU to port {}", port);

        let mut table = inner.lock_table();
        let wait = {
            let entry = table.get(port).ok_or(FlowError::NoSuchFlow)?;
            if entry.state == FlowState::Deallocated {
                return Err(FlowError::AlreadyDeallocated);
            }
            Arc::clone(&entry.wait)
        };
        wait.posters.fetch_add(1, Ordering::Relaxed);

        if let Some(entry) = table.get_mut(port) {
            entry.queue.push(sdu);
        }

        let destroyed = inner.finish_op(table, port, &wait, OpKind::Post);
        if !destroyed {
            wait.read_cv.notify_one();
        }
        Ok(())
    }

    /// Transport backpressure: pause writers on this flow
    ///
    /// No-op if the flow is already DISABLED or DEALLOCATED.
    pub fn disable_write(&self, port: PortId) -> FlowResult<()> {
        let mut table = self.inner.lock_table();
        let entry = table.get_mut(port).ok_or(FlowError::NoSuchFlow)?;

        match entry.state {
            FlowState::Deallocated => {
                debug!("flow on port {} already deallocated", port);
            }
            FlowState::Disabled => {
                debug!("write already disabled on port {}", port);
            }
            _ => {
                entry.state = FlowState::Disabled;
                debug!("disabled write on port {}", port);
            }
        }
        Ok(())
    }

    /// Transport backpressure lifted: resume writers on this flow
    ///
    /// Wakes all blocked writers. No-op if the flow is not DISABLED.
    pub fn enable_write(&self, port: PortId) -> FlowResult<()> {
        let mut table = self.inner.lock_table();
        let entry = table.get_mut(port).ok_or(FlowError::NoSuchFlow)?;

        match entry.state {
            FlowState::Deallocated => {
                debug!("flow on port {} already deallocated", port);
                Ok(())
            }
            FlowState::Disabled => {
                entry.state = FlowState::Allocated;
                let wait = Arc::clone(&entry.wait);
                drop(table);
                debug!("enabled write on port {}", port);
                wait.write_cv.notify_all();
                Ok(())
            }
            _ => {
                debug!("write already enabled on port {}", port);
                Ok(())
            }
        }
    }

    /// Request teardown of a flow; never blocks the caller
    ///
    /// Moves the flow to DEALLOCATED. If no read/write/post is in
    /// flight the flow is destroyed synchronously here; otherwise all
    /// waiters are woken, the port is handed to the teardown worker,
    /// and whichever exit observes the flow quiescent destroys it.
    /// Idempotent: repeating the call (even after destruction) is a
    /// no-op success.
    pub fn deallocate_flow(&self, port: PortId) -> FlowResult<()> {
        let inner = &*self.inner;

        let mut table = inner.lock_table();
        let Some(entry) = table.get_mut(port) else {
            debug!("deallocate: flow on port {} already gone", port);
            return Ok(());
        };

        if entry.state == FlowState::Deallocated {
            debug!("flow on port {} already deallocated", port);
            return Ok(());
        }

        entry.state = FlowState::Deallocated;
        let wait = Arc::clone(&entry.wait);

        if wait.quiescent() {
            debug!("destroying flow on port {} now", port);
            inner.destroy_locked(&mut table, port);
            return Ok(());
        }

        // Operations in flight: defer destruction to whoever exits
        // last, and make sure everyone blocked gets to exit.
        inner.delq.push(port);
        drop(table);

        inner.del_parking.wake();
        wait.read_cv.notify_all();
        wait.write_cv.notify_all();
        Ok(())
    }

    /// Current state of the flow on `port`, if one exists
    pub fn flow_state(&self, port: PortId) -> Option<FlowState> {
        self.inner.lock_table().get(port).map(|entry| entry.state)
    }

    /// Number of flows currently in the table
    pub fn active_flows(&self) -> usize {
        self.inner.lock_table().len()
    }

    /// Lifetime counters
    pub fn stats(&self) -> ManagerStats {
        ManagerStats {
            flows_created: self.inner.flows_created.load(Ordering::Relaxed),
            flows_destroyed: self.inner.flows_destroyed.load(Ordering::Relaxed),
            ports_reserved: self.inner.pidm.reserved_count(),
            active_flows: self.active_flows(),
        }
    }

    /// Stop the teardown worker and reject further creations
    ///
    /// Flows still in the table are reported; their deferred
    /// destruction can still be driven to completion by in-flight
    /// operations exiting.
    pub fn shutdown(&mut self) {
        if self.inner.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.del_parking.wake();
        self.worker.stop();

        let table = self.inner.lock_table();
        if table.len() > 0 {
            warn!(
                "shutting down with {} live flows: {:?}",
                table.len(),
                table.ports()
            );
        }
    }
}

impl Drop for FlowManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portflow_core::transport::TransportError;
    use std::thread;
    use std::time::{Duration, Instant};

    /// Transport that records every sent SDU
    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(PortId, Vec<u8>)>>,
    }

    impl RecordingTransport {
        fn sent(&self) -> Vec<(PortId, Vec<u8>)> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl FlowTransport for RecordingTransport {
        fn send(&self, port: PortId, sdu: Sdu) -> Result<(), TransportError> {
            self.sent.lock().unwrap().push((port, sdu.into_bytes()));
            Ok(())
        }
    }

    /// Transport that sleeps inside send, to keep a writer in flight
    struct SlowTransport {
        delay: Duration,
    }

    impl FlowTransport for SlowTransport {
        fn send(&self, _port: PortId, _sdu: Sdu) -> Result<(), TransportError> {
            thread::sleep(self.delay);
            Ok(())
        }
    }

    struct FailingTransport;

    impl FlowTransport for FailingTransport {
        fn send(&self, _port: PortId, _sdu: Sdu) -> Result<(), TransportError> {
            Err(TransportError::new("link down"))
        }
    }

    fn manager(max_ports: usize) -> FlowManager {
        FlowManager::new(FlowManagerConfig::new().max_ports(max_ports))
    }

    fn bound_flow(mgr: &FlowManager) -> (PortId, Arc<RecordingTransport>) {
        let port = mgr.reserve_port().unwrap();
        mgr.create_flow(port).unwrap();
        let transport = Arc::new(RecordingTransport::default());
        mgr.bind_flow(port, transport.clone()).unwrap();
        (port, transport)
    }

    #[test]
    fn test_lifecycle_states() {
        let mgr = manager(16);
        let port = mgr.reserve_port().unwrap();

        mgr.create_flow(port).unwrap();
        assert_eq!(mgr.flow_state(port), Some(FlowState::Pending));

        mgr.bind_flow(port, Arc::new(RecordingTransport::default()))
            .unwrap();
        assert_eq!(mgr.flow_state(port), Some(FlowState::Allocated));

        mgr.disable_write(port).unwrap();
        assert_eq!(mgr.flow_state(port), Some(FlowState::Disabled));
        mgr.disable_write(port).unwrap(); // idempotent

        mgr.enable_write(port).unwrap();
        assert_eq!(mgr.flow_state(port), Some(FlowState::Allocated));
        mgr.enable_write(port).unwrap(); // idempotent

        mgr.deallocate_flow(port).unwrap();
        assert_eq!(mgr.flow_state(port), None);
    }

    #[test]
    fn test_one_flow_per_port() {
        let mgr = manager(16);
        let port = mgr.reserve_port().unwrap();

        mgr.create_flow(port).unwrap();
        assert!(matches!(
            mgr.create_flow(port),
            Err(FlowError::AlreadyExists)
        ));
        assert_eq!(mgr.active_flows(), 1);
    }

    #[test]
    fn test_unknown_port_fails_fast() {
        let mgr = manager(16);
        let bogus = PortId::new(99);

        assert!(matches!(mgr.write(bogus, Sdu::from("x")), Err(FlowError::NoSuchFlow)));
        assert!(matches!(mgr.read(bogus), Err(FlowError::NoSuchFlow)));
        assert!(matches!(mgr.post(bogus, Sdu::from("x")), Err(FlowError::NoSuchFlow)));
        assert!(matches!(mgr.disable_write(bogus), Err(FlowError::NoSuchFlow)));
        assert!(matches!(mgr.enable_write(bogus), Err(FlowError::NoSuchFlow)));
    }

    #[test]
    fn test_write_reaches_transport() {
        let mgr = manager(16);
        let (port, transport) = bound_flow(&mgr);

        mgr.write(port, Sdu::from("hello")).unwrap();
        assert_eq!(transport.sent(), vec![(port, b"hello".to_vec())]);
    }

    #[test]
    fn test_write_transport_error_propagates() {
        let mgr = manager(16);
        let port = mgr.reserve_port().unwrap();
        mgr.create_flow(port).unwrap();
        mgr.bind_flow(port, Arc::new(FailingTransport)).unwrap();

        assert!(matches!(
            mgr.write(port, Sdu::from("x")),
            Err(FlowError::Transport(_))
        ));

        // Flow state is unchanged and the counters are balanced: a
        // deallocate destroys synchronously.
        assert_eq!(mgr.flow_state(port), Some(FlowState::Allocated));
        mgr.deallocate_flow(port).unwrap();
        assert_eq!(mgr.stats().flows_destroyed, 1);
    }

    #[test]
    fn test_disabled_write_blocks_until_enabled() {
        let mgr = Arc::new(manager(16));
        let (port, transport) = bound_flow(&mgr);

        mgr.disable_write(port).unwrap();

        let mgr2 = Arc::clone(&mgr);
        let writer = thread::spawn(move || mgr2.write(port, Sdu::from("A")));

        thread::sleep(Duration::from_millis(100));
        assert!(transport.sent().is_empty(), "write went through while disabled");

        mgr.enable_write(port).unwrap();
        writer.join().unwrap().unwrap();
        assert_eq!(transport.sent(), vec![(port, b"A".to_vec())]);
    }

    #[test]
    fn test_post_read_fifo() {
        let mgr = manager(16);
        let (port, _transport) = bound_flow(&mgr);

        mgr.post(port, Sdu::from("X")).unwrap();
        mgr.post(port, Sdu::from("Y")).unwrap();

        assert_eq!(mgr.read(port).unwrap().as_bytes(), b"X");
        assert_eq!(mgr.read(port).unwrap().as_bytes(), b"Y");

        // Third read blocks; a cancellation token unblocks it.
        let token = CancellationToken::new();
        token.cancel();
        assert!(matches!(
            mgr.read_with_token(port, &token),
            Err(FlowError::Interrupted)
        ));
    }

    #[test]
    fn test_post_before_reader_no_lost_wakeup() {
        let mgr = Arc::new(manager(16));
        let (port, _transport) = bound_flow(&mgr);

        mgr.post(port, Sdu::from("early")).unwrap();

        let mgr2 = Arc::clone(&mgr);
        let reader = thread::spawn(move || mgr2.read(port));
        assert_eq!(reader.join().unwrap().unwrap().as_bytes(), b"early");
    }

    #[test]
    fn test_reader_blocks_while_pending() {
        let mgr = manager(16);
        let port = mgr.reserve_port().unwrap();
        mgr.create_flow(port).unwrap();

        // Data posted before bind is queued but not readable yet.
        mgr.post(port, Sdu::from("queued")).unwrap();

        let token = CancellationToken::new();
        token.cancel();
        assert!(matches!(
            mgr.read_with_token(port, &token),
            Err(FlowError::Interrupted)
        ));

        // After bind the queued SDU comes out.
        mgr.bind_flow(port, Arc::new(RecordingTransport::default()))
            .unwrap();
        assert_eq!(mgr.read(port).unwrap().as_bytes(), b"queued");
    }

    #[test]
    fn test_writer_blocks_while_pending() {
        let mgr = manager(16);
        let port = mgr.reserve_port().unwrap();
        mgr.create_flow(port).unwrap();

        let token = CancellationToken::new();
        token.cancel();
        assert!(matches!(
            mgr.write_with_token(port, Sdu::from("x"), &token),
            Err(FlowError::Interrupted)
        ));
    }

    #[test]
    fn test_deallocate_synchronous_when_quiescent() {
        let mgr = manager(16);
        let (port, _transport) = bound_flow(&mgr);

        mgr.deallocate_flow(port).unwrap();
        let stats = mgr.stats();
        assert_eq!(stats.flows_destroyed, 1);
        assert_eq!(stats.active_flows, 0);
        assert_eq!(stats.ports_reserved, 0);

        // The id is back in the pool.
        let again = mgr.reserve_port().unwrap();
        assert_eq!(again, port);
    }

    #[test]
    fn test_deallocate_idempotent() {
        let mgr = manager(16);
        let (port, _transport) = bound_flow(&mgr);

        mgr.deallocate_flow(port).unwrap();
        mgr.deallocate_flow(port).unwrap();
        assert_eq!(mgr.stats().flows_destroyed, 1);
    }

    #[test]
    fn test_operations_after_deallocate_fail_fast() {
        let mgr = Arc::new(manager(16));
        let (port, _transport) = bound_flow(&mgr);

        // Keep the flow busy so deallocation is deferred and the entry
        // stays observable in DEALLOCATED state for a moment.
        let mgr2 = Arc::clone(&mgr);
        let reader = thread::spawn(move || mgr2.read(port));
        thread::sleep(Duration::from_millis(100));

        mgr.deallocate_flow(port).unwrap();
        assert!(matches!(reader.join().unwrap(), Err(FlowError::AlreadyDeallocated)));

        assert!(matches!(mgr.post(port, Sdu::from("x")), Err(FlowError::NoSuchFlow)));
        assert!(matches!(mgr.write(port, Sdu::from("x")), Err(FlowError::NoSuchFlow)));
        assert_eq!(mgr.stats().flows_destroyed, 1);
    }

    #[test]
    fn test_blocked_reader_unblocked_by_deallocate() {
        let mgr = Arc::new(manager(16));
        let (port, _transport) = bound_flow(&mgr);

        let mgr2 = Arc::clone(&mgr);
        let reader = thread::spawn(move || {
            let started = Instant::now();
            let result = mgr2.read(port);
            (result, started.elapsed())
        });

        thread::sleep(Duration::from_millis(100));
        mgr.deallocate_flow(port).unwrap();

        let (result, _elapsed) = reader.join().unwrap();
        assert!(matches!(result, Err(FlowError::AlreadyDeallocated)));
        assert_eq!(mgr.stats().flows_destroyed, 1);
        assert_eq!(mgr.active_flows(), 0);
    }

    #[test]
    fn test_deallocate_never_blocks_on_inflight_write() {
        let mgr = Arc::new(manager(16));
        let port = mgr.reserve_port().unwrap();
        mgr.create_flow(port).unwrap();
        mgr.bind_flow(
            port,
            Arc::new(SlowTransport {
                delay: Duration::from_millis(300),
            }),
        )
        .unwrap();

        let mgr2 = Arc::clone(&mgr);
        let writer = thread::spawn(move || mgr2.write(port, Sdu::from("slow")));

        // Give the writer time to enter the transport send.
        thread::sleep(Duration::from_millis(50));

        let started = Instant::now();
        mgr.deallocate_flow(port).unwrap();
        assert!(
            started.elapsed() < Duration::from_millis(100),
            "deallocate blocked on the in-flight write"
        );

        // The send that was already in progress completes normally;
        // its exit performs the destruction.
        writer.join().unwrap().unwrap();
        assert_eq!(mgr.stats().flows_destroyed, 1);
        assert_eq!(mgr.active_flows(), 0);
    }

    #[test]
    fn test_deallocated_flow_drains_queue_before_error() {
        let mgr = Arc::new(manager(16));
        let (port, _transport) = bound_flow(&mgr);

        mgr.post(port, Sdu::from("left")).unwrap();
        mgr.post(port, Sdu::from("over")).unwrap();

        // Keep a reader in flight so the entry survives deallocation.
        let mgr2 = Arc::clone(&mgr);
        let reader = thread::spawn(move || {
            let a = mgr2.read(port);
            let b = mgr2.read(port);
            let c = mgr2.read(port);
            (a, b, c)
        });

        thread::sleep(Duration::from_millis(100));
        mgr.deallocate_flow(port).unwrap();

        let (a, b, c) = reader.join().unwrap();
        // The queued SDUs drain in order before the terminal error.
        assert_eq!(a.unwrap().as_bytes(), b"left");
        assert_eq!(b.unwrap().as_bytes(), b"over");
        assert!(matches!(c, Err(FlowError::AlreadyDeallocated)));
        assert_eq!(mgr.stats().flows_destroyed, 1);
    }

    #[test]
    fn test_release_port_deferred_while_flow_lives() {
        let mgr = manager(4);
        let (port, _transport) = bound_flow(&mgr);

        // Release reports success but the id stays out of the pool.
        mgr.release_port(port).unwrap();
        for _ in 0..3 {
            let other = mgr.reserve_port().unwrap();
            assert_ne!(other, port);
        }
        assert!(matches!(mgr.reserve_port(), Err(FlowError::Exhausted)));

        // Destruction performs the real release.
        mgr.deallocate_flow(port).unwrap();
        assert_eq!(mgr.reserve_port().unwrap(), port);
    }

    #[test]
    fn test_port_pool_exhaustion_and_reuse() {
        let mgr = manager(2);
        let a = mgr.reserve_port().unwrap();
        let _b = mgr.reserve_port().unwrap();
        assert!(matches!(mgr.reserve_port(), Err(FlowError::Exhausted)));

        mgr.release_port(a).unwrap();
        assert_eq!(mgr.reserve_port().unwrap(), a);
    }

    #[test]
    fn test_destruction_exactly_once_under_stress() {
        let mgr = Arc::new(manager(16));
        let (port, _transport) = bound_flow(&mgr);

        let mut handles = vec![];

        // Readers block until deallocation.
        for _ in 0..4 {
            let mgr = Arc::clone(&mgr);
            handles.push(thread::spawn(move || {
                let _ = mgr.read(port);
            }));
        }

        // Posters and writers hammer the flow until it goes away.
        for _ in 0..2 {
            let poster = Arc::clone(&mgr);
            handles.push(thread::spawn(move || {
                while poster.post(port, Sdu::from("p")).is_ok() {
                    thread::yield_now();
                }
            }));
            let writer = Arc::clone(&mgr);
            handles.push(thread::spawn(move || {
                while writer.write(port, Sdu::from("w")).is_ok() {
                    thread::yield_now();
                }
            }));
        }

        thread::sleep(Duration::from_millis(50));
        mgr.deallocate_flow(port).unwrap();

        for h in handles {
            h.join().unwrap();
        }

        let stats = mgr.stats();
        assert_eq!(stats.flows_created, 1);
        assert_eq!(stats.flows_destroyed, 1);
        assert_eq!(stats.active_flows, 0);
        assert_eq!(stats.ports_reserved, 0);
    }

    #[test]
    fn test_many_flows_all_destroyed() {
        let mgr = Arc::new(manager(256));
        let mut handles = vec![];

        for _ in 0..4 {
            let mgr = Arc::clone(&mgr);
            handles.push(thread::spawn(move || {
                for _ in 0..25 {
                    let port = mgr.reserve_port().unwrap();
                    mgr.create_flow(port).unwrap();
                    let transport = Arc::new(RecordingTransport::default());
                    mgr.bind_flow(port, transport).unwrap();

                    mgr.post(port, Sdu::from("in")).unwrap();
                    mgr.write(port, Sdu::from("out")).unwrap();
                    assert_eq!(mgr.read(port).unwrap().as_bytes(), b"in");

                    mgr.deallocate_flow(port).unwrap();
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        let stats = mgr.stats();
        assert_eq!(stats.flows_created, 100);
        assert_eq!(stats.flows_destroyed, 100);
        assert_eq!(stats.active_flows, 0);
        assert_eq!(stats.ports_reserved, 0);
    }

    #[test]
    fn test_shutdown_rejects_new_flows() {
        let mut mgr = manager(16);
        let port = mgr.reserve_port().unwrap();
        mgr.create_flow(port).unwrap();
        mgr.deallocate_flow(port).unwrap();

        mgr.shutdown();
        assert!(matches!(mgr.reserve_port(), Err(FlowError::Shutdown)));
        assert!(matches!(
            mgr.create_flow(PortId::new(1)),
            Err(FlowError::Shutdown)
        ));
    }
}
