//! Port identifier type

use core::fmt;

/// Identifier of one flow endpoint
///
/// A 32-bit handle drawn from the port-id allocator. The maximum value
/// (u32::MAX) is reserved as a sentinel for "no port".
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct PortId(u32);

impl PortId {
    /// Sentinel value indicating no port
    pub const NONE: PortId = PortId(u32::MAX);

    /// Create a new PortId from a raw value
    #[inline]
    pub const fn new(id: u32) -> Self {
        PortId(id)
    }

    /// Get the raw u32 value
    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Get as usize for indexing
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Check if this is the NONE sentinel
    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == u32::MAX
    }

    /// Check if this is a usable port id
    #[inline]
    pub const fn is_ok(self) -> bool {
        self.0 != u32::MAX
    }
}

impl From<u32> for PortId {
    #[inline]
    fn from(id: u32) -> Self {
        PortId(id)
    }
}

impl From<PortId> for u32 {
    #[inline]
    fn from(id: PortId) -> Self {
        id.0
    }
}

impl fmt::Debug for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "PortId(NONE)")
        } else {
            write!(f, "PortId({})", self.0)
        }
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "none")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl Default for PortId {
    fn default() -> Self {
        PortId::NONE
    }
}
