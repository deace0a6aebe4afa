//! Read-through cache of clean (already persisted) encoded nodes

use crate::model::Hash;
use lru::LruCache;
use parking_lot::Mutex;

/// One LRU shard with its own byte budget
struct Shard {
    entries: LruCache<Hash, Vec<u8>>,
    size: usize,
    capacity: usize,
}

impl Shard {
    fn set(&mut self, hash: Hash, blob: Vec<u8>) {
        let cost = entry_cost(&blob);
        if cost > self.capacity {
            return;
        }
        if let Some(old) = self.entries.put(hash, blob) {
            self.size -= entry_cost(&old);
        }
        self.size += cost;
        while self.size > self.capacity {
            match self.entries.pop_lru() {
                Some((_, evicted)) => self.size -= entry_cost(&evicted),
                None => break,
            }
        }
    }
}

fn entry_cost(blob: &[u8]) -> usize {
    crate::model::HASH_LENGTH + blob.len()
}

/// A byte-bounded, sharded LRU cache keyed by node hash
///
/// Safe to use from many threads at once; each shard is locked
/// independently.
pub struct CleanCache {
    shards: Vec<Mutex<Shard>>,
}

impl CleanCache {
    /// Create a cache holding at most `capacity` bytes across `shards` shards
    pub fn new(capacity: usize, shards: usize) -> Self {
        let shard_count = shards.max(1);
        let per_shard_cap = capacity / shard_count;
        let shards = (0..shard_count)
            .map(|_| {
                Mutex::new(Shard {
                    entries: LruCache::unbounded(),
                    size: 0,
                    capacity: per_shard_cap,
                })
            })
            .collect();
        CleanCache { shards }
    }

    pub fn get(&self, hash: &Hash) -> Option<Vec<u8>> {
        self.shard_for(hash).lock().entries.get(hash).cloned()
    }

    pub fn set(&self, hash: Hash, blob: Vec<u8>) {
        self.shard_for(&hash).lock().set(hash, blob);
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.shard_for(hash).lock().entries.contains(hash)
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes currently accounted across all shards
    pub fn size(&self) -> usize {
        self.shards.iter().map(|s| s.lock().size).sum()
    }

    fn shard_for(&self, hash: &Hash) -> &Mutex<Shard> {
        let bytes = hash.as_bytes();
        let idx = u64::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ]) as usize
            % self.shards.len();
        &self.shards[idx]
    }
}
