//! Port-id allocator
//!
//! Issues and releases small integer port ids from a bounded pool.
//! Uses a LIFO free stack for reuse of recently freed ids, a fresh
//! counter for never-used ids, and a reserved bitmap so a double
//! release (or a release of an id that was never handed out) is
//! detected instead of corrupting the pool.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use crate::error::{FlowError, FlowResult};
use crate::id::PortId;

const BITS_PER_WORD: usize = 64;

struct PoolInner {
    /// LIFO stack of released ids (for reuse)
    free_stack: Vec<u32>,

    /// Next never-used id
    next_fresh: u32,

    /// One bit per id: set while reserved
    reserved: Vec<u64>,
}

impl PoolInner {
    #[inline]
    fn is_reserved(&self, id: u32) -> bool {
        let word = id as usize / BITS_PER_WORD;
        let bit = id as usize % BITS_PER_WORD;
        (self.reserved[word] & (1u64 << bit)) != 0
    }

    #[inline]
    fn set_reserved(&mut self, id: u32, value: bool) {
        let word = id as usize / BITS_PER_WORD;
        let bit = id as usize % BITS_PER_WORD;
        if value {
            self.reserved[word] |= 1u64 << bit;
        } else {
            self.reserved[word] &= !(1u64 << bit);
        }
    }
}

/// Thread-safe allocator of port ids
///
/// A reserved id is never handed out again until it has been released.
pub struct PortIdAllocator {
    inner: Mutex<PoolInner>,

    /// Pool size; valid ids are `0..max_ports`
    max_ports: u32,

    /// Number of currently reserved ids
    reserved_count: AtomicU32,
}

impl PortIdAllocator {
    /// Create an allocator with `max_ports` ids available
    pub fn new(max_ports: usize) -> Self {
        let words = (max_ports + BITS_PER_WORD - 1) / BITS_PER_WORD;
        Self {
            inner: Mutex::new(PoolInner {
                free_stack: Vec::with_capacity(max_ports.min(1024)),
                next_fresh: 0,
                reserved: vec![0u64; words],
            }),
            max_ports: max_ports as u32,
            reserved_count: AtomicU32::new(0),
        }
    }

    /// Reserve a port id
    ///
    /// Prefers recently released ids (LIFO), falling back to fresh
    /// ones. Returns `Exhausted` when the pool is empty.
    pub fn reserve(&self) -> FlowResult<PortId> {
        let mut inner = self.inner.lock().unwrap();

        let id = match inner.free_stack.pop() {
            Some(id) => id,
            None => {
                if inner.next_fresh >= self.max_ports {
                    log::warn!("port-id pool exhausted ({} ids)", self.max_ports);
                    return Err(FlowError::Exhausted);
                }
                let id = inner.next_fresh;
                inner.next_fresh += 1;
                id
            }
        };

        inner.set_reserved(id, true);
        self.reserved_count.fetch_add(1, Ordering::Relaxed);
        Ok(PortId::new(id))
    }

    /// Release a port id back to the pool
    ///
    /// Returns `NotReserved` if the id is out of range or not
    /// currently reserved.
    pub fn release(&self, id: PortId) -> FlowResult<()> {
        if !id.is_ok() || id.as_u32() >= self.max_ports {
            return Err(FlowError::NotReserved);
        }

        let mut inner = self.inner.lock().unwrap();
        if !inner.is_reserved(id.as_u32()) {
            return Err(FlowError::NotReserved);
        }

        inner.set_reserved(id.as_u32(), false);
        inner.free_stack.push(id.as_u32());
        self.reserved_count.fetch_sub(1, Ordering::Relaxed);
        Ok(())
    }

    /// Check whether an id is currently reserved
    pub fn is_reserved(&self, id: PortId) -> bool {
        if !id.is_ok() || id.as_u32() >= self.max_ports {
            return false;
        }
        self.inner.lock().unwrap().is_reserved(id.as_u32())
    }

    /// Number of currently reserved ids
    #[inline]
    pub fn reserved_count(&self) -> u32 {
        self.reserved_count.load(Ordering::Relaxed)
    }

    /// Pool size
    #[inline]
    pub fn max_ports(&self) -> u32 {
        self.max_ports
    }
}
