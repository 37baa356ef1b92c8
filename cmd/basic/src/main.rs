//! Basic flow lifecycle walkthrough
//!
//! Reserves a port, creates a flow, binds a loopback transport that
//! posts every written SDU back to its own port, then pushes a few
//! messages through and tears the flow down.
//!
//! # Environment Variables
//!
//! - `RUST_LOG=debug` - Set log level (error, warn, info, debug, trace)

use std::sync::{Arc, OnceLock};

use log::info;
use portflow::{
    FlowManager, FlowManagerConfig, FlowTransport, PortId, Sdu, TransportError,
};

/// Hands every outbound SDU straight back as inbound on the same port
struct LoopbackTransport {
    manager: OnceLock<Arc<FlowManager>>,
}

impl FlowTransport for LoopbackTransport {
    fn send(&self, port: PortId, sdu: Sdu) -> Result<(), TransportError> {
        let Some(manager) = self.manager.get() else {
            return Err(TransportError::new("loopback not wired up"));
        };
        manager
            .post(port, sdu)
            .map_err(|e| TransportError::new(format!("loopback post failed: {}", e)))
    }
}

// RUST_LOG=debug cargo run -p portflow-basic
fn main() {
    env_logger::init();
    println!("=== portflow basic example ===\n");

    let manager = Arc::new(FlowManager::new(FlowManagerConfig::new().max_ports(64)));

    let transport = Arc::new(LoopbackTransport {
        manager: OnceLock::new(),
    });
    let _ = transport.manager.set(Arc::clone(&manager));

    let port = manager.reserve_port().unwrap();
    manager.create_flow(port).unwrap();
    manager.bind_flow(port, transport).unwrap();
    info!("flow up on port {}", port);

    for msg in ["hello", "flow", "world"] {
        manager.write(port, Sdu::from(msg)).unwrap();
        let echoed = manager.read(port).unwrap();
        println!(
            "port {}: wrote {:?}, read back {:?}",
            port,
            msg,
            String::from_utf8_lossy(echoed.as_bytes())
        );
    }

    manager.deallocate_flow(port).unwrap();

    let stats = manager.stats();
    println!(
        "\nflows created={} destroyed={} active={} ports reserved={}",
        stats.flows_created, stats.flows_destroyed, stats.active_flows, stats.ports_reserved
    );
    println!("\n=== done ===");
}
