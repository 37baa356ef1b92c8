//! # portflow-core
//!
//! Core types for the portflow flow-lifecycle manager.
//!
//! This crate is runtime-agnostic: it knows nothing about threads,
//! tables or teardown workers. Those live in the `portflow` crate.
//!
//! ## Modules
//!
//! - `id` - Port identifier type
//! - `state` - Flow state machine enum
//! - `pidm` - Port-id allocator (reserve/release with reuse)
//! - `sdu` - Opaque data unit carried over a flow
//! - `queue` - Per-flow FIFO delivery queue
//! - `transport` - Backing transport trait (send capability)
//! - `cancel` - Cancellation token for blocked read/write calls
//! - `error` - Error types

pub mod cancel;
pub mod error;
pub mod id;
pub mod pidm;
pub mod queue;
pub mod sdu;
pub mod state;
pub mod transport;

// Re-exports for convenience
pub use cancel::CancellationToken;
pub use error::{FlowError, FlowResult};
pub use id::PortId;
pub use pidm::PortIdAllocator;
pub use queue::DeliveryQueue;
pub use sdu::Sdu;
pub use state::FlowState;
pub use transport::{FlowTransport, TransportError};

/// Shared constants
pub mod constants {
    /// Default size of the port-id pool
    pub const DEFAULT_MAX_PORTS: usize = 8192;

    /// No-port sentinel value
    pub const PORT_NONE: u32 = u32::MAX;
}
