//! Map-backed store for tests and ephemeral databases

use super::{Batch, KeyValueStore, KeyValueWriter, PendingWrites};
use crate::Result;
use parking_lot::RwLock;
use std::collections::HashMap;

/// A key-value store that lives entirely in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Remove a key, returning its previous value
    pub fn delete(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.entries.write().remove(key)
    }

    /// Snapshot of all stored keys
    pub fn keys(&self) -> Vec<Vec<u8>> {
        self.entries.read().keys().cloned().collect()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn new_batch(&self) -> Box<dyn Batch + '_> {
        Box::new(MemoryBatch {
            store: self,
            pending: PendingWrites::default(),
        })
    }
}

struct MemoryBatch<'a> {
    store: &'a MemoryStore,
    pending: PendingWrites,
}

impl Batch for MemoryBatch<'_> {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.pending.put(key, value);
        Ok(())
    }

    fn value_size(&self) -> usize {
        self.pending.size
    }

    fn write(&mut self) -> Result<()> {
        let mut entries = self.store.entries.write();
        for (key, value) in &self.pending.writes {
            entries.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.pending.reset();
    }

    fn replay(&self, writer: &mut dyn KeyValueWriter) -> Result<()> {
        self.pending.replay(writer)
    }
}
