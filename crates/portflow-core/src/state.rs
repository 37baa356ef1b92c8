//! Flow state machine
//!
//! One flow endpoint walks through these states:
//!
//! ```text
//! Unbound --create--> Pending --bind--> Allocated <--enable-- Disabled
//!                        |                 |   \--disable-----^
//!                        +----deallocate---+------------> Deallocated
//! ```
//!
//! Deallocated is terminal: any further operation fails fast.

use core::fmt;

/// State of one flow endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FlowState {
    /// Port id reserved, no flow object yet
    Unbound = 0,

    /// Flow created, waiting for a backing transport
    Pending = 1,

    /// Bound to a transport, fully operational
    Allocated = 2,

    /// Transport signalled backpressure, writers blocked
    Disabled = 3,

    /// Teardown requested, terminal
    Deallocated = 4,
}

impl FlowState {
    /// Check if this state is terminal
    #[inline]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, FlowState::Deallocated)
    }

    /// Check if a blocked writer should stop waiting in this state
    ///
    /// Writers wait while the flow is Pending (no transport yet) or
    /// Disabled (backpressure). Deallocated also unblocks them: the
    /// woken writer observes the terminal state and aborts instead of
    /// delivering.
    #[inline]
    pub const fn unblocks_writer(&self) -> bool {
        !matches!(self, FlowState::Pending | FlowState::Disabled)
    }

    /// Check if a reader may pop from the delivery queue in this state
    ///
    /// Readers on a Pending flow wait even if data has been posted.
    #[inline]
    pub const fn readable(&self) -> bool {
        !matches!(self, FlowState::Unbound | FlowState::Pending)
    }
}

impl From<u8> for FlowState {
    fn from(v: u8) -> Self {
        match v {
            0 => FlowState::Unbound,
            1 => FlowState::Pending,
            2 => FlowState::Allocated,
            3 => FlowState::Disabled,
            4 => FlowState::Deallocated,
            _ => FlowState::Unbound, // Default for invalid values
        }
    }
}

impl From<FlowState> for u8 {
    fn from(state: FlowState) -> u8 {
        state as u8
    }
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowState::Unbound => write!(f, "UNBOUND"),
            FlowState::Pending => write!(f, "PENDING"),
            FlowState::Allocated => write!(f, "ALLOCATED"),
            FlowState::Disabled => write!(f, "DISABLED"),
            FlowState::Deallocated => write!(f, "DEALLOCATED"),
        }
    }
}
