//! # portflow
//!
//! Runtime half of the port flow lifecycle manager.
//!
//! This crate provides:
//! - The [`FlowManager`] facade (create/bind/read/write/post/deallocate)
//! - The flow table and per-flow wait state behind it
//! - The deferred teardown worker thread
//! - Runtime configuration
//!
//! Core vocabulary types (port ids, states, errors, SDUs, the transport
//! trait) live in `portflow-core` and are re-exported here.

pub mod config;
mod flow;
pub mod manager;
mod table;
mod teardown;

// Re-exports
pub use config::FlowManagerConfig;
pub use manager::{FlowManager, ManagerStats};
pub use portflow_core::cancel::CancellationToken;
pub use portflow_core::error::{FlowError, FlowResult};
pub use portflow_core::id::PortId;
pub use portflow_core::sdu::Sdu;
pub use portflow_core::state::FlowState;
pub use portflow_core::transport::{FlowTransport, TransportError};
