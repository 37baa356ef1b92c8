//! Deferred teardown worker
//!
//! `deallocate_flow` must never block its caller, so when a flow still
//! has operations in flight the port is handed to this worker. The
//! worker either finds the flow quiescent and destroys it, or wakes
//! every blocked call so the last one out destroys it inline. Parking
//! uses a timeout so a wake posted between drain and park is only ever
//! a latency blip, never a hang.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::debug;

use crate::manager::ManagerInner;

/// Wake-flag parking for the teardown worker
///
/// The flag absorbs wakes that arrive while the worker is not parked,
/// so `wake` before `park` is never lost.
pub(crate) struct Parking {
    mutex: Mutex<bool>,
    condvar: Condvar,
}

impl Parking {
    pub(crate) fn new() -> Self {
        Self {
            mutex: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    /// Block until woken or the timeout elapses, then clear the flag
    pub(crate) fn park(&self, timeout: Duration) {
        let mut woken = self.mutex.lock().unwrap();
        while !*woken {
            let (guard, result) = self.condvar.wait_timeout(woken, timeout).unwrap();
            woken = guard;
            if result.timed_out() {
                break;
            }
        }
        *woken = false;
    }

    pub(crate) fn wake(&self) {
        let mut woken = self.mutex.lock().unwrap();
        *woken = true;
        drop(woken);
        self.condvar.notify_one();
    }
}

/// Handle to the teardown thread
pub(crate) struct TeardownWorker {
    handle: Option<JoinHandle<()>>,
}

impl TeardownWorker {
    pub(crate) fn spawn(inner: Arc<ManagerInner>) -> Self {
        let handle = thread::Builder::new()
            .name("portflow-teardown".to_string())
            .spawn(move || worker_loop(inner))
            .expect("failed to spawn teardown worker thread");
        Self {
            handle: Some(handle),
        }
    }

    /// Join the worker; the shutdown flag must already be set
    pub(crate) fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                debug!("teardown worker panicked");
            }
        }
    }
}

fn worker_loop(inner: Arc<ManagerInner>) {
    debug!("teardown worker running");

    while !inner.shutdown.load(Ordering::Acquire) {
        let mut worked = false;
        while let Some(port) = inner.delq.pop() {
            worked = true;
            inner.process_teardown(port);
        }
        if !worked {
            inner.del_parking.park(inner.config.teardown_park_timeout);
        }
    }

    // Drain what is still queued so no teardown is silently dropped.
    while let Some(port) = inner.delq.pop() {
        inner.process_teardown(port);
    }
    debug!("teardown worker stopped");
}
