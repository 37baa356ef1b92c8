//! Flow churn stress run
//!
//! Several threads each drive many short-lived flows through the full
//! lifecycle concurrently, with a reader blocked on every flow when it
//! is torn down. At the end every flow must have been destroyed
//! exactly once and every port id returned to the pool.
//!
//! # Environment Variables
//!
//! - `RUST_LOG=debug` - Set log level (error, warn, info, debug, trace)

use std::sync::Arc;
use std::thread;
use std::time::Instant;

use portflow::{
    FlowError, FlowManager, FlowManagerConfig, FlowTransport, PortId, Sdu, TransportError,
};

const NUM_THREADS: usize = 8;
const FLOWS_PER_THREAD: usize = 200;

struct NullTransport;

impl FlowTransport for NullTransport {
    fn send(&self, _port: PortId, _sdu: Sdu) -> Result<(), TransportError> {
        Ok(())
    }
}

// RUST_LOG=warn cargo run -p portflow-stress
fn main() {
    env_logger::init();
    println!("=== portflow stress: {} threads x {} flows ===\n", NUM_THREADS, FLOWS_PER_THREAD);

    let manager = Arc::new(FlowManager::new(
        FlowManagerConfig::new().max_ports(NUM_THREADS * 4),
    ));
    let transport: Arc<dyn FlowTransport> = Arc::new(NullTransport);
    let started = Instant::now();

    let mut handles = vec![];
    for t in 0..NUM_THREADS {
        let manager = Arc::clone(&manager);
        let transport = Arc::clone(&transport);
        handles.push(thread::spawn(move || {
            for i in 0..FLOWS_PER_THREAD {
                let port = manager.reserve_port().unwrap();
                manager.create_flow(port).unwrap();
                manager.bind_flow(port, Arc::clone(&transport)).unwrap();

                manager.post(port, Sdu::from("in")).unwrap();
                manager.write(port, Sdu::from("out")).unwrap();
                assert_eq!(manager.read(port).unwrap().as_bytes(), b"in");

                // Leave a reader blocked on the empty queue so every
                // teardown exercises the deferred path.
                let m = Arc::clone(&manager);
                let blocked = thread::spawn(move || m.read(port));

                manager.deallocate_flow(port).unwrap();
                let result = blocked.join().unwrap();
                assert!(
                    matches!(result, Err(FlowError::AlreadyDeallocated) | Err(FlowError::NoSuchFlow)),
                    "thread {} flow {}: blocked reader saw {:?}",
                    t,
                    i,
                    result
                );
            }
        }));
    }

    for h in handles {
        h.join().unwrap();
    }

    let stats = manager.stats();
    let total = (NUM_THREADS * FLOWS_PER_THREAD) as u64;
    println!("elapsed: {:?}", started.elapsed());
    println!(
        "flows created={} destroyed={} active={} ports reserved={}",
        stats.flows_created, stats.flows_destroyed, stats.active_flows, stats.ports_reserved
    );

    assert_eq!(stats.flows_created, total);
    assert_eq!(stats.flows_destroyed, total);
    assert_eq!(stats.active_flows, 0);
    assert_eq!(stats.ports_reserved, 0);
    println!("\n=== all {} flows destroyed exactly once ===", total);
}
