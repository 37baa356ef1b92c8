//! Opaque data unit carried over a flow
//!
//! portflow defines no wire format: an SDU is an owned byte buffer
//! transferred by value between the application side and the transport
//! side of a flow.

use core::fmt;

/// One service data unit
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Sdu(Vec<u8>);

impl Sdu {
    /// Create an SDU taking ownership of the given bytes
    #[inline]
    pub fn new(bytes: Vec<u8>) -> Self {
        Sdu(bytes)
    }

    /// Length in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check for a zero-length SDU
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the payload
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume the SDU, returning the payload
    #[inline]
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for Sdu {
    fn from(bytes: Vec<u8>) -> Self {
        Sdu(bytes)
    }
}

impl From<&[u8]> for Sdu {
    fn from(bytes: &[u8]) -> Self {
        Sdu(bytes.to_vec())
    }
}

impl From<&str> for Sdu {
    fn from(s: &str) -> Self {
        Sdu(s.as_bytes().to_vec())
    }
}

impl fmt::Debug for Sdu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sdu({} bytes)", self.0.len())
    }
}
