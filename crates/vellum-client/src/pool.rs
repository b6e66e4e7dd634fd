use vellum_common::Host;

use crate::connection::{ConnectionId, PooledConnection};

/// Ordered collection of pooled connections.
///
/// Order is insertion order; the router's tie-break (most recently
/// inserted match wins) relies on stable iteration. Entries are addressed
/// by connection identity, never by host: a host may contribute several
/// entries over its lifetime across reconnections.
#[derive(Default)]
pub(crate) struct Pool {
    entries: Vec<PooledConnection>,
}

impl Pool {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn append(&mut self, entry: PooledConnection) {
        self.entries.push(entry);
    }

    /// Removes and returns the entry with the given identity, if present.
    pub(crate) fn remove(&mut self, id: ConnectionId) -> Option<PooledConnection> {
        let index = self.entries.iter().position(|e| e.id == id)?;
        Some(self.entries.remove(index))
    }

    pub(crate) fn find(&self, id: ConnectionId) -> Option<&PooledConnection> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub(crate) fn find_mut(&mut self, id: ConnectionId) -> Option<&mut PooledConnection> {
        self.entries.iter_mut().find(|e| e.id == id)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &PooledConnection> {
        self.entries.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut PooledConnection> {
        self.entries.iter_mut()
    }

    pub(crate) fn contains_host(&self, host: &Host) -> bool {
        self.entries.iter().any(|e| &e.host == host)
    }

    pub(crate) fn drain(&mut self) -> Vec<PooledConnection> {
        std::mem::take(&mut self.entries)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
