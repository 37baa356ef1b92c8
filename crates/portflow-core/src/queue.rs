//! Per-flow FIFO delivery queue
//!
//! Holds posted SDUs until a reader pops them. Push and pop never
//! block. The queue is owned by one flow entry and synchronized
//! externally by the flow table's lock; it carries no lock of its own.

use std::collections::VecDeque;

use crate::sdu::Sdu;

/// FIFO of inbound SDUs awaiting a reader
///
/// Unbounded: bounded only by available memory, not by a fixed cap.
#[derive(Debug, Default)]
pub struct DeliveryQueue {
    items: VecDeque<Sdu>,
}

impl DeliveryQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }

    /// Append an SDU at the tail
    #[inline]
    pub fn push(&mut self, sdu: Sdu) {
        self.items.push_back(sdu);
    }

    /// Pop the oldest SDU, if any
    #[inline]
    pub fn pop(&mut self) -> Option<Sdu> {
        self.items.pop_front()
    }

    /// Number of queued SDUs
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if nothing is queued
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drop all queued SDUs, returning how many were discarded
    ///
    /// Used at flow destruction; the count feeds the teardown log.
    pub fn drain(&mut self) -> usize {
        let n = self.items.len();
        self.items.clear();
        n
    }
}
