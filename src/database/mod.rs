//! Write-back memory database for trie nodes
//!
//! Sits between trie code and a persistent [`KeyValueStore`]:
//! - new nodes are staged in a dirty table, ordered by a flush list
//! - trie roots are pinned under a meta-root (the zero hash) and shared
//!   subtrees are reference counted, so dropping a root collects exactly
//!   the nodes nothing else keeps alive
//! - [`Database::cap`] bounds memory by flushing the oldest nodes and
//!   [`Database::commit`] forces a whole subtree to disk
//! - reads go clean cache, then dirty table, then disk
//!
//! Mutations are serialized by a writer mutex. Reads only take the shared
//! side of the state lock, so they keep running while `cap` or `commit`
//! is writing batches; the exclusive lock is held only to evict nodes that
//! were already written.

mod dirty;
mod flush;
mod gc;
mod stats;


pub use stats::Stats;

use crate::cache::CleanCache;
use crate::config::DatabaseConfig;
use crate::model::{Hash, StorageSize};
use crate::store::KeyValueStore;
use crate::trie::{Node, TrieNode};
use crate::{Error, Result};
use dirty::DirtyState;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

/// Key prefix under which preimages are persisted
pub const SECURE_KEY_PREFIX: &[u8] = b"secure-key-";

/// Store key of the preimage for `hash`
pub fn secure_key(hash: &Hash) -> Vec<u8> {
    let mut key = Vec::with_capacity(SECURE_KEY_PREFIX.len() + hash.as_bytes().len());
    key.extend_from_slice(SECURE_KEY_PREFIX);
    key.extend_from_slice(hash.as_bytes());
    key
}

/// The trie node memory database
pub struct Database {
    disk: Arc<dyn KeyValueStore>,
    cleans: Option<CleanCache>,
    config: DatabaseConfig,
    state: RwLock<DirtyState>,
    writer: Mutex<()>,
}

impl Database {
    /// Create a database over `disk` with default settings
    pub fn new(disk: Arc<dyn KeyValueStore>) -> Self {
        Database {
            disk,
            cleans: None,
            config: DatabaseConfig::default(),
            state: RwLock::new(DirtyState::new()),
            writer: Mutex::new(()),
        }
        .with_clean_cache()
    }

    /// Create a database over `disk` with explicit settings
    pub fn with_config(disk: Arc<dyn KeyValueStore>, config: DatabaseConfig) -> Result<Self> {
        config.validate()?;
        Ok(Database {
            disk,
            cleans: None,
            config,
            state: RwLock::new(DirtyState::new()),
            writer: Mutex::new(()),
        }
        .with_clean_cache())
    }

    fn with_clean_cache(mut self) -> Self {
        if self.config.clean_cache_size > 0 {
            self.cleans = Some(CleanCache::new(
                self.config.clean_cache_size,
                self.config.clean_cache_shards,
            ));
        }
        self
    }

    /// The persistent store behind this database
    pub fn disk_db(&self) -> &Arc<dyn KeyValueStore> {
        &self.disk
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// The clean cache, if enabled
    pub fn clean_cache(&self) -> Option<&CleanCache> {
        self.cleans.as_ref()
    }

    // === Staging ===

    /// Stage a node under `hash`. `blob` is its encoding and is used for
    /// size accounting. Already-dirty hashes are left untouched.
    pub fn insert(&self, hash: Hash, blob: &[u8], node: Node) -> Result<()> {
        if hash.is_zero() {
            error!("database.insert.meta_root");
            return Err(Error::MetaRoot("cannot insert a node under the zero hash".into()));
        }
        let _writer = self.writer.lock();
        self.state.write().insert(hash, blob.len(), node);
        Ok(())
    }

    /// Stage an opaque, reference counted blob with no children
    pub fn insert_blob(&self, hash: Hash, blob: &[u8]) -> Result<()> {
        self.insert(hash, blob, Node::Raw(blob.to_vec()))
    }

    /// Stage a collapsed trie node under its own hash, returning the hash
    pub fn insert_node(&self, node: TrieNode) -> Result<Hash> {
        let blob = node.encode()?;
        let hash = Hash::digest(&blob);
        self.insert(hash, &blob, Node::Collapsed(node))?;
        Ok(hash)
    }

    /// Buffer the preimage of a hashed key until the next flush
    pub fn insert_preimage(&self, hash: Hash, preimage: &[u8]) {
        let _writer = self.writer.lock();
        self.state.write().insert_preimage(hash, preimage);
    }

    // === Reference counting ===

    /// Add a reference from `parent` to `child`. Use [`Hash::ZERO`] as the
    /// parent to pin a trie root.
    pub fn reference(&self, child: Hash, parent: Hash) -> Result<()> {
        if child.is_zero() {
            error!(parent = %parent, "database.reference.meta_root");
            return Err(Error::MetaRoot("the meta-root cannot be referenced".into()));
        }
        let _writer = self.writer.lock();
        self.state.write().reference(child, parent);
        Ok(())
    }

    /// Release the pin on `root`, collecting every dirty node that is no
    /// longer reachable from another pinned root.
    ///
    /// `root` is expected to be pinned. A dirty node that is not pinned
    /// still loses one parent count, so releasing a node that only a dirty
    /// parent holds collects it while that parent keeps pointing at it. A
    /// later commit of the parent then persists it without that child.
    /// Such calls are counted in [`Stats::unpinned_dereferences`].
    pub fn dereference(&self, root: Hash) -> Result<()> {
        if root.is_zero() {
            error!("database.dereference.meta_root");
            return Err(Error::MetaRoot("the meta-root cannot be dereferenced".into()));
        }
        let _writer = self.writer.lock();
        let mut state = self.state.write();

        let (nodes, storage, start) = (state.len(), state.dirties_size, Instant::now());
        let dirty = state.nodes.contains_key(&root);
        if !state.dereference(root, Hash::ZERO) && dirty {
            state.stats.unpinned_dereferences += 1;
            warn!(root = %root, "database.dereference.unpinned");
        }

        let collected = (nodes - state.len()) as u64;
        let freed = storage - state.dirties_size;
        let elapsed = start.elapsed();
        state.stats.gc_nodes += collected;
        state.stats.gc_size += freed;
        state.stats.gc_time += elapsed;

        debug!(
            root = %root,
            nodes = collected,
            size = %freed,
            time = ?elapsed,
            gcnodes = state.stats.gc_nodes,
            gcsize = %state.stats.gc_size,
            gctime = ?state.stats.gc_time,
            livenodes = state.len(),
            livesize = %state.dirties_size,
            "database.dereference"
        );
        Ok(())
    }

    // === Reads ===

    /// Encoded node for `hash`, from the clean cache, the dirty table or
    /// disk, in that order
    pub fn node(&self, hash: &Hash) -> Result<Vec<u8>> {
        if hash.is_zero() {
            return Err(Error::NotFound("the meta-root has no encoding".into()));
        }
        if let Some(enc) = self.cleans.as_ref().and_then(|c| c.get(hash)) {
            return Ok(enc);
        }
        if let Some(blob) = self.state.read().nodes.get(hash).map(|n| n.blob()) {
            return blob;
        }
        self.load_from_disk(hash)
    }

    /// Decoded node for `hash`. Dirty collapsed nodes are returned as-is.
    pub fn trie_node(&self, hash: &Hash) -> Result<TrieNode> {
        if hash.is_zero() {
            return Err(Error::NotFound("the meta-root has no encoding".into()));
        }
        if let Some(enc) = self.cleans.as_ref().and_then(|c| c.get(hash)) {
            return TrieNode::decode(&enc);
        }
        if let Some(node) = self.state.read().nodes.get(hash).map(|n| n.node.to_trie_node()) {
            return node;
        }
        TrieNode::decode(&self.load_from_disk(hash)?)
    }

    fn load_from_disk(&self, hash: &Hash) -> Result<Vec<u8>> {
        let enc = self
            .disk
            .get(hash.as_bytes())?
            .ok_or_else(|| Error::NotFound(hash.to_hex()))?;
        if let Some(cleans) = &self.cleans {
            cleans.set(*hash, enc.clone());
        }
        Ok(enc)
    }

    /// Preimage of a hashed key, from memory or disk
    pub fn preimage(&self, hash: &Hash) -> Result<Option<Vec<u8>>> {
        if let Some(preimage) = self.state.read().preimages.get(hash) {
            return Ok(Some(preimage.clone()));
        }
        self.disk.get(&secure_key(hash))
    }

    // === Introspection ===

    /// Hashes of all dirty nodes, without the meta-root. Expensive.
    pub fn nodes(&self) -> Vec<Hash> {
        let state = self.state.read();
        state
            .nodes
            .keys()
            .filter(|hash| !hash.is_zero())
            .copied()
            .collect()
    }

    /// Whether `hash` is currently dirty
    pub fn contains(&self, hash: &Hash) -> bool {
        !hash.is_zero() && self.state.read().nodes.contains_key(hash)
    }

    /// Parent count of a dirty node
    pub fn parent_count(&self, hash: &Hash) -> Option<u32> {
        self.state.read().nodes.get(hash).map(|n| n.parents)
    }

    /// Dirty hashes from oldest to newest
    pub fn flush_order(&self) -> Vec<Hash> {
        self.state.read().flush_order()
    }

    /// Resident size of the dirty table and size of buffered preimages
    pub fn size(&self) -> (StorageSize, StorageSize) {
        let state = self.state.read();
        (state.resident_size(), state.preimages_size)
    }

    pub fn stats(&self) -> Stats {
        self.state.read().stats.clone()
    }
}
