//! Moving dirty nodes to the persistent store
//!
//! Both flush paths write before they evict: a node leaves the dirty table
//! only after the batch holding it was written successfully. A failure at
//! any point leaves memory untouched, at worst with some nodes both in
//! memory and on disk.

use super::dirty::DirtyState;
use super::{secure_key, Database};
use crate::cache::CleanCache;
use crate::model::{Hash, StorageSize};
use crate::store::{Batch, KeyValueWriter};
use crate::{Error, Result};
use std::collections::HashSet;
use std::time::Instant;
use tracing::{debug, error, info};

impl Database {
    /// Flush the oldest dirty nodes until the resident size is at most
    /// `limit`.
    ///
    /// Preimages are flushed too once they outgrow their own threshold.
    pub fn cap(&self, limit: StorageSize) -> Result<()> {
        let _writer = self.writer.lock();
        let start = Instant::now();
        let mut batch = self.disk.new_batch();

        let (nodes, storage, flush_preimages, stop) = {
            let state = self.state.read();
            let mut size = state.resident_size();
            if size <= limit {
                return Ok(());
            }

            let flush_preimages =
                state.preimages_size > StorageSize::from(self.config.preimage_flush_threshold);
            if flush_preimages {
                self.write_preimages(&state, batch.as_mut())?;
            }

            let mut oldest = state.oldest;
            while size > limit && !oldest.is_zero() {
                let node = state.nodes.get(&oldest).ok_or_else(|| {
                    Error::Corruption(format!("flush list references missing node {}", oldest))
                })?;
                batch.put(oldest.as_bytes(), &node.blob()?)?;
                if batch.value_size() >= self.config.ideal_batch_size {
                    batch.write().inspect_err(|err| {
                        error!(error = %err, "database.cap.write_failed");
                    })?;
                    batch.reset();
                }
                size -= DirtyState::flush_cost(node);
                oldest = node.flush_next;
            }
            batch.write().inspect_err(|err| {
                error!(error = %err, "database.cap.write_failed");
            })?;

            (state.len(), state.dirties_size, flush_preimages, oldest)
        };

        let mut state = self.state.write();
        if flush_preimages {
            state.clear_preimages();
        }
        state.evict_until(stop);

        let flushed = (nodes - state.len()) as u64;
        let freed = storage - state.dirties_size;
        let elapsed = start.elapsed();
        state.stats.flush_nodes += flushed;
        state.stats.flush_size += freed;
        state.stats.flush_time += elapsed;

        debug!(
            nodes = flushed,
            size = %freed,
            time = ?elapsed,
            flushnodes = state.stats.flush_nodes,
            flushsize = %state.stats.flush_size,
            flushtime = ?state.stats.flush_time,
            livenodes = state.len(),
            livesize = %state.dirties_size,
            "database.cap"
        );
        Ok(())
    }

    /// Write the subtree under `root` to disk, children before parents,
    /// dropping every written node from memory. All buffered preimages are
    /// written first.
    ///
    /// This does not release the pin on `root`; call
    /// [`Database::dereference`] for that. `report` logs the summary at info
    /// level instead of debug.
    pub fn commit(&self, root: Hash, report: bool) -> Result<()> {
        if root.is_zero() {
            error!("database.commit.meta_root");
            return Err(Error::MetaRoot("the meta-root cannot be committed".into()));
        }
        let _writer = self.writer.lock();
        let start = Instant::now();
        let mut batch = self.disk.new_batch();

        let (nodes, storage) = {
            let state = self.state.read();
            self.write_preimages(&state, batch.as_mut())?;
            (state.len(), state.dirties_size)
        };
        // Preimages are out of the batch before node writes get replayed
        batch.write()?;
        batch.reset();

        self.commit_subtree(root, batch.as_mut())
            .inspect_err(|err| {
                error!(root = %root, error = %err, "database.commit.failed");
            })?;
        batch.write().inspect_err(|err| {
            error!(root = %root, error = %err, "database.commit.write_failed");
        })?;

        let mut state = self.state.write();
        batch.replay(&mut Cleaner::new(&mut state, self.cleans.as_ref()))?;
        batch.reset();
        state.clear_preimages();

        let stats = state.stats.clone();
        let persisted = (nodes - state.len()) as u64 + stats.flush_nodes;
        let persisted_size = (storage - state.dirties_size) + stats.flush_size;
        let elapsed = start.elapsed() + stats.flush_time;
        macro_rules! report_commit {
            ($level:ident) => {
                $level!(
                    root = %root,
                    nodes = persisted,
                    size = %persisted_size,
                    time = ?elapsed,
                    gcnodes = stats.gc_nodes,
                    gcsize = %stats.gc_size,
                    gctime = ?stats.gc_time,
                    livenodes = state.len(),
                    livesize = %state.dirties_size,
                    "database.commit"
                )
            };
        }
        if report {
            report_commit!(info);
        } else {
            report_commit!(debug);
        }

        state.stats.reset_since_commit();
        Ok(())
    }

    /// Write every dirty node below `root` in post-order.
    ///
    /// The walk keeps its own stack, so chains of any length are fine. A
    /// node is written once all of its dirty children were put in the
    /// batch, and full batches are written and evicted along the way.
    fn commit_subtree(&self, root: Hash, batch: &mut dyn Batch) -> Result<()> {
        let mut visited = HashSet::new();
        let mut stack = vec![(root, false)];

        while let Some((hash, children_pushed)) = stack.pop() {
            if !children_pushed {
                if !visited.insert(hash) {
                    continue;
                }
                // Already durable if it is not dirty
                let children = match self.state.read().nodes.get(&hash) {
                    Some(node) => node.all_children(),
                    None => continue,
                };
                stack.push((hash, true));
                stack.extend(
                    children
                        .into_iter()
                        .rev()
                        .filter(|child| !visited.contains(child))
                        .map(|child| (child, false)),
                );
                continue;
            }

            let blob = match self.state.read().nodes.get(&hash) {
                Some(node) => node.blob()?,
                None => continue,
            };
            batch.put(hash.as_bytes(), &blob)?;

            if batch.value_size() >= self.config.ideal_batch_size {
                batch.write()?;
                let mut state = self.state.write();
                batch.replay(&mut Cleaner::new(&mut state, self.cleans.as_ref()))?;
                batch.reset();
            }
        }
        Ok(())
    }

    fn write_preimages(&self, state: &DirtyState, batch: &mut dyn Batch) -> Result<()> {
        for (hash, preimage) in &state.preimages {
            batch.put(&secure_key(hash), preimage)?;
            if batch.value_size() >= self.config.ideal_batch_size {
                batch.write()?;
                batch.reset();
            }
        }
        Ok(())
    }
}

/// Replays a written batch, dropping every node it carried from the dirty
/// table and seeding the clean cache with it
struct Cleaner<'a> {
    state: &'a mut DirtyState,
    cleans: Option<&'a CleanCache>,
}

impl<'a> Cleaner<'a> {
    fn new(state: &'a mut DirtyState, cleans: Option<&'a CleanCache>) -> Self {
        Cleaner { state, cleans }
    }
}

impl KeyValueWriter for Cleaner<'_> {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let Some(hash) = Hash::from_slice(key) else {
            return Ok(());
        };
        if self.state.uncache(&hash).is_none() {
            return Ok(());
        }
        if let Some(cleans) = self.cleans {
            cleans.set(hash, value.to_vec());
        }
        Ok(())
    }
}
