//! Flow table
//!
//! Maps port ids to flow entries and is their exclusive owner. The
//! table carries no lock of its own: the manager wraps it in a single
//! mutex that is held for lookups and mutations only, never across a
//! condvar wait or a transport call.

use std::collections::HashMap;

use portflow_core::error::{FlowError, FlowResult};
use portflow_core::id::PortId;

use crate::flow::FlowEntry;

#[derive(Default)]
pub(crate) struct FlowTable {
    flows: HashMap<PortId, FlowEntry>,
}

impl FlowTable {
    pub(crate) fn new() -> Self {
        Self {
            flows: HashMap::new(),
        }
    }

    /// Insert a new entry; fails if the port already has one
    pub(crate) fn insert(&mut self, port: PortId, entry: FlowEntry) -> FlowResult<()> {
        if self.flows.contains_key(&port) {
            return Err(FlowError::AlreadyExists);
        }
        self.flows.insert(port, entry);
        Ok(())
    }

    #[inline]
    pub(crate) fn get(&self, port: PortId) -> Option<&FlowEntry> {
        self.flows.get(&port)
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, port: PortId) -> Option<&mut FlowEntry> {
        self.flows.get_mut(&port)
    }

    /// Detach an entry, returning ownership for destruction
    pub(crate) fn remove(&mut self, port: PortId) -> Option<FlowEntry> {
        self.flows.remove(&port)
    }

    #[inline]
    pub(crate) fn contains(&self, port: PortId) -> bool {
        self.flows.contains_key(&port)
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.flows.len()
    }

    /// Ports of all live flows (for shutdown diagnostics)
    pub(crate) fn ports(&self) -> Vec<PortId> {
        self.flows.keys().copied().collect()
    }
}
