use crate::model::StorageSize;
use serde::Serialize;
use std::time::Duration;

/// Garbage collection and flush counters
///
/// The `gc_*` and `flush_*` counters accumulate since the last successful
/// [`crate::Database::commit`], which reports and then resets them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    /// Nodes removed from memory by dereferencing
    pub gc_nodes: u64,
    pub gc_size: StorageSize,
    pub gc_time: Duration,

    /// Nodes written out and dropped from memory by `cap`
    pub flush_nodes: u64,
    pub flush_size: StorageSize,
    pub flush_time: Duration,

    /// Dereferences that found a parent count already at zero. Never reset.
    pub clamped_dereferences: u64,
    /// Dereferences of dirty nodes that had no pin. Never reset.
    pub unpinned_dereferences: u64,
}

impl Stats {
    pub(crate) fn reset_since_commit(&mut self) {
        *self = Stats {
            clamped_dereferences: self.clamped_dereferences,
            unpinned_dereferences: self.unpinned_dereferences,
            ..Stats::default()
        };
    }
}
