//! Port registry - lookup by id and by name
//!
//! Both indices sit behind one reader-writer lock. The write side is taken
//! only to insert or unlink ports and never across a wait. Lookups return a
//! port only while it is `Active`; indexed ports that are not yet published
//! or already deleted are invisible.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::RwLock;

use super::port::{Port, PortName};
use crate::types::PortId;

#[derive(Debug)]
struct Indices {
    by_id: BTreeMap<PortId, Arc<Port>>,
    by_name: BTreeMap<PortName, Vec<Arc<Port>>>,
    next_id: i32,
}

impl Indices {
    fn unlink(&mut self, port: &Arc<Port>) -> bool {
        let removed = self
            .by_id
            .get(&port.id())
            .is_some_and(|existing| Arc::ptr_eq(existing, port));
        if removed {
            self.by_id.remove(&port.id());
        }

        if let Some(named) = self.by_name.get_mut(port.name_key()) {
            named.retain(|p| !Arc::ptr_eq(p, port));
            if named.is_empty() {
                self.by_name.remove(port.name_key());
            }
        }
        removed
    }
}

/// By-id and by-name port indices
#[derive(Debug)]
pub struct Registry {
    indices: RwLock<Indices>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            indices: RwLock::new(Indices {
                by_id: BTreeMap::new(),
                by_name: BTreeMap::new(),
                next_id: 1,
            }),
        }
    }

    /// Pick a free id, build the port with it and index it under both keys
    ///
    /// Ids come from a counter that wraps back to 1 and skips ids still in
    /// the table. The caller guarantees the table is not full.
    pub fn insert_new(&self, build: impl FnOnce(PortId) -> Arc<Port>) -> Arc<Port> {
        let mut indices = self.indices.write();

        let id = loop {
            let candidate = PortId(indices.next_id);
            indices.next_id = indices.next_id.checked_add(1).unwrap_or(1);
            if !indices.by_id.contains_key(&candidate) {
                break candidate;
            }
        };

        let port = build(id);
        indices.by_id.insert(id, port.clone());
        indices
            .by_name
            .entry(port.name_key().clone())
            .or_default()
            .push(port.clone());
        port
    }

    /// Resolve an id to an active port
    pub fn lookup(&self, id: PortId) -> Option<Arc<Port>> {
        let indices = self.indices.read();
        indices
            .by_id
            .get(&id)
            .filter(|port| port.is_active())
            .cloned()
    }

    /// Lowest-id active port carrying `name`
    pub fn find_by_name(&self, name: &PortName) -> Option<Arc<Port>> {
        let indices = self.indices.read();
        indices
            .by_name
            .get(name)?
            .iter()
            .filter(|port| port.is_active())
            .min_by_key(|port| port.id())
            .cloned()
    }

    /// Drop both index entries of `port`; false if it was not indexed
    pub fn remove(&self, port: &Arc<Port>) -> bool {
        self.indices.write().unlink(port)
    }

    /// Unlink several ports under one write acquisition
    pub fn remove_all(&self, ports: &[Arc<Port>]) -> usize {
        let mut indices = self.indices.write();
        ports.iter().filter(|port| indices.unlink(port)).count()
    }

    /// Ports indexed, published or not
    pub fn len(&self) -> usize {
        self.indices.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    fn set_next_id(&self, next: i32) {
        self.indices.write().next_id = next;
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
