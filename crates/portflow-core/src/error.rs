//! Error types for flow operations

use core::fmt;

use crate::transport::TransportError;

/// Result type for flow operations
pub type FlowResult<T> = Result<T, FlowError>;

/// Errors that can occur in flow operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowError {
    /// Unknown or already-destroyed port id
    NoSuchFlow,

    /// Operation attempted after the flow reached its terminal state
    AlreadyDeallocated,

    /// A flow already exists for this port id
    AlreadyExists,

    /// No port ids available
    Exhausted,

    /// Released a port id that was not reserved
    NotReserved,

    /// Flow has no backing transport attached
    NotBound,

    /// Blocking wait aborted by cancellation
    Interrupted,

    /// Backing transport send failed
    Transport(TransportError),

    /// Manager is shutting down
    Shutdown,
}

impl fmt::Display for FlowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowError::NoSuchFlow => write!(f, "no flow bound to this port id"),
            FlowError::AlreadyDeallocated => write!(f, "flow already deallocated"),
            FlowError::AlreadyExists => write!(f, "flow already exists for this port id"),
            FlowError::Exhausted => write!(f, "no port ids available"),
            FlowError::NotReserved => write!(f, "port id not reserved"),
            FlowError::NotBound => write!(f, "flow has no backing transport"),
            FlowError::Interrupted => write!(f, "blocking operation interrupted"),
            FlowError::Transport(e) => write!(f, "transport error: {}", e),
            FlowError::Shutdown => write!(f, "flow manager shutting down"),
        }
    }
}

impl std::error::Error for FlowError {}

impl From<TransportError> for FlowError {
    fn from(e: TransportError) -> Self {
        FlowError::Transport(e)
    }
}
