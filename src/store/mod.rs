//! Persistent key-value storage behind the memory database
//!
//! The memory database only relies on point reads and batched writes. A
//! batch collects puts, is written atomically with [`Batch::write`], and can
//! afterwards [`Batch::replay`] the puts it carried so the caller can act on
//! exactly the keys that are now durable.

mod file_store;
mod memory;
mod record;

pub use file_store::FileStore;
pub use memory::MemoryStore;

use crate::Result;

/// Size in bytes of queued values after which a batch should be written
pub const IDEAL_BATCH_SIZE: usize = 100 * 1024;

/// Receiver of the puts re-delivered by [`Batch::replay`]
pub trait KeyValueWriter {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()>;
}

/// A write-only group of puts committed to a store in one step
pub trait Batch {
    /// Queue a put
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Total size of the values queued since the last reset
    fn value_size(&self) -> usize;

    /// Write the queued puts to the store. A successful write is durable.
    fn write(&mut self) -> Result<()>;

    /// Drop all queued puts
    fn reset(&mut self);

    /// Re-deliver every queued put to `writer`, in insertion order
    fn replay(&self, writer: &mut dyn KeyValueWriter) -> Result<()>;
}

/// Durable key to bytes storage
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `None` if the key was never written
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Check whether a key exists
    fn has(&self, key: &[u8]) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Start a new empty batch against this store
    fn new_batch(&self) -> Box<dyn Batch + '_>;
}

/// Puts queued by a batch implementation, shared by both stores
#[derive(Debug, Default)]
pub(crate) struct PendingWrites {
    pub(crate) writes: Vec<(Vec<u8>, Vec<u8>)>,
    pub(crate) size: usize,
}

impl PendingWrites {
    pub(crate) fn put(&mut self, key: &[u8], value: &[u8]) {
        self.writes.push((key.to_vec(), value.to_vec()));
        self.size += value.len();
    }

    pub(crate) fn reset(&mut self) {
        self.writes.clear();
        self.size = 0;
    }

    pub(crate) fn replay(&self, writer: &mut dyn KeyValueWriter) -> Result<()> {
        for (key, value) in &self.writes {
            writer.put(key, value)?;
        }
        Ok(())
    }
}
