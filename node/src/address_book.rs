use chordal_lib::{NodeId, NodeInfo};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Best-effort identifier to address cache. Entries are only ever added or
/// overwritten, never removed; addresses are assumed stable for a node's lifetime.
#[derive(Debug, Clone, Default)]
pub struct AddressBook {
    entries: Arc<RwLock<HashMap<NodeId, String>>>,
}

impl AddressBook {
    pub fn new(owner: &NodeInfo) -> Self {
        let book = Self::default();
        book.remember(owner);
        book
    }

    pub fn insert(&self, id: NodeId, address: impl Into<String>) {
        self.write().insert(id, address.into());
    }

    pub fn remember(&self, node: &NodeInfo) {
        self.insert(node.id, node.address.clone());
    }

    pub fn get(&self, id: NodeId) -> Option<String> {
        self.read().get(&id).cloned()
    }

    pub fn resolve(&self, id: NodeId) -> Option<NodeInfo> {
        self.get(id).map(|address| NodeInfo { id, address })
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<NodeId, String>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<NodeId, String>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}
