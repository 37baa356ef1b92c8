//! Backing transport seam
//!
//! The manager does not move bytes itself: at bind time each flow is
//! handed a capability set implementing [`FlowTransport`], and every
//! blocking write funnels into its `send`. The transport side calls
//! back into the manager (`post`, `disable_write`, `enable_write`)
//! through the manager's own API.

use core::fmt;

use crate::id::PortId;
use crate::sdu::Sdu;

/// Error reported by a backing transport send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    reason: String,
}

impl TransportError {
    /// Create a transport error with the given reason
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// The failure reason
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason)
    }
}

impl std::error::Error for TransportError {}

/// Outbound capability of a backing transport
///
/// Implementations must be safe to call from multiple writer threads
/// concurrently; the manager never holds its table lock across `send`.
pub trait FlowTransport: Send + Sync {
    /// Transfer one SDU out of the given flow
    fn send(&self, port: PortId, sdu: Sdu) -> Result<(), TransportError>;
}
