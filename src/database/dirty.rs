//! Dirty node table, flush list and size accounting

use super::stats::Stats;
use crate::model::{Hash, StorageSize, HASH_LENGTH};
use crate::trie::Node;
use crate::Result;
use std::collections::HashMap;

/// Approximate in-memory footprint of a [`CachedNode`] without its payload
pub(crate) const CACHED_NODE_SIZE: usize = std::mem::size_of::<CachedNode>();

/// Approximate footprint of an allocated but empty external children map
pub(crate) const CHILDREN_MAP_SIZE: usize = 48;

/// Footprint of one external child entry: the key plus a u16 counter
pub(crate) const CHILD_EDGE_SIZE: usize = HASH_LENGTH + 2;

/// Everything known about one dirty node
#[derive(Debug)]
pub(crate) struct CachedNode {
    /// Collapsed trie node or raw blob
    pub(crate) node: Node,
    /// Byte size of the encoded node
    pub(crate) size: usize,
    /// Number of live edges pointing at this node
    pub(crate) parents: u32,
    /// Explicit references to other nodes, with multiplicity
    pub(crate) children: Option<HashMap<Hash, u16>>,
    pub(crate) flush_prev: Hash,
    pub(crate) flush_next: Hash,
}

impl CachedNode {
    fn meta_root() -> Self {
        CachedNode {
            node: Node::Raw(Vec::new()),
            size: 0,
            parents: 0,
            children: Some(HashMap::new()),
            flush_prev: Hash::ZERO,
            flush_next: Hash::ZERO,
        }
    }

    pub(crate) fn blob(&self) -> Result<Vec<u8>> {
        self.node.encoded_bytes()
    }

    /// Hashes of embedded children, without the meta-root
    pub(crate) fn embedded_children(&self) -> Vec<Hash> {
        let mut children = self.node.child_hashes();
        children.retain(|hash| !hash.is_zero());
        children
    }

    /// Every tracked child, explicit references first, each listed once
    pub(crate) fn all_children(&self) -> Vec<Hash> {
        let mut children: Vec<Hash> = self
            .children
            .as_ref()
            .map(|map| map.keys().copied().collect())
            .unwrap_or_default();
        children.extend(self.embedded_children());
        children
    }

    /// Bytes charged for the explicit children map, if allocated
    pub(crate) fn children_bookkeeping(&self) -> StorageSize {
        match &self.children {
            Some(map) => StorageSize::from(CHILDREN_MAP_SIZE + map.len() * CHILD_EDGE_SIZE),
            None => StorageSize::ZERO,
        }
    }

    /// Bytes charged for the payload of this node
    pub(crate) fn payload_size(&self) -> StorageSize {
        StorageSize::from(HASH_LENGTH + self.size)
    }
}

/// All mutable state of the memory database, guarded by one lock
#[derive(Debug)]
pub(crate) struct DirtyState {
    pub(crate) nodes: HashMap<Hash, CachedNode>,
    /// Flush-list head, the zero hash when the list is empty
    pub(crate) oldest: Hash,
    /// Flush-list tail, the zero hash when the list is empty
    pub(crate) newest: Hash,

    pub(crate) preimages: HashMap<Hash, Vec<u8>>,

    /// Payload bytes of dirty nodes, metadata excluded
    pub(crate) dirties_size: StorageSize,
    /// Bytes of explicit children bookkeeping
    pub(crate) children_size: StorageSize,
    pub(crate) preimages_size: StorageSize,

    pub(crate) stats: Stats,
}

impl DirtyState {
    pub(crate) fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(Hash::ZERO, CachedNode::meta_root());
        DirtyState {
            nodes,
            oldest: Hash::ZERO,
            newest: Hash::ZERO,
            preimages: HashMap::new(),
            dirties_size: StorageSize::ZERO,
            children_size: StorageSize::ZERO,
            preimages_size: StorageSize::ZERO,
            stats: Stats::default(),
        }
    }

    /// Number of dirty nodes, not counting the meta-root
    pub(crate) fn len(&self) -> usize {
        self.nodes.len() - 1
    }

    /// Stage a node. Returns false if the hash was already dirty.
    pub(crate) fn insert(&mut self, hash: Hash, size: usize, node: Node) -> bool {
        if self.nodes.contains_key(&hash) {
            return false;
        }

        let entry = CachedNode {
            node,
            size,
            parents: 0,
            children: None,
            flush_prev: self.newest,
            flush_next: Hash::ZERO,
        };
        for child in entry.embedded_children() {
            if let Some(c) = self.nodes.get_mut(&child) {
                c.parents += 1;
            }
        }
        self.dirties_size += entry.payload_size();
        self.nodes.insert(hash, entry);

        if self.oldest.is_zero() {
            self.oldest = hash;
        } else if let Some(tail) = self.nodes.get_mut(&self.newest) {
            tail.flush_next = hash;
        }
        self.newest = hash;
        true
    }

    pub(crate) fn insert_preimage(&mut self, hash: Hash, preimage: &[u8]) {
        if self.preimages.contains_key(&hash) {
            return;
        }
        self.preimages_size += StorageSize::from(HASH_LENGTH + preimage.len());
        self.preimages.insert(hash, preimage.to_vec());
    }

    pub(crate) fn clear_preimages(&mut self) {
        self.preimages.clear();
        self.preimages_size = StorageSize::ZERO;
    }

    /// Patch the neighbours of a node that has left the table
    pub(crate) fn unlink(&mut self, prev: Hash, next: Hash) {
        match self.nodes.get_mut(&prev) {
            Some(node) if !prev.is_zero() => node.flush_next = next,
            _ => self.oldest = next,
        }
        match self.nodes.get_mut(&next) {
            Some(node) if !next.is_zero() => node.flush_prev = prev,
            _ => self.newest = prev,
        }
    }

    /// Remove a node that is now durable, subtracting everything it was
    /// charged for. The meta-root is never removed.
    pub(crate) fn uncache(&mut self, hash: &Hash) -> Option<CachedNode> {
        if hash.is_zero() {
            return None;
        }
        let node = self.nodes.remove(hash)?;
        self.unlink(node.flush_prev, node.flush_next);
        self.dirties_size -= node.payload_size();
        self.children_size -= node.children_bookkeeping();
        Some(node)
    }

    /// Drop flush-list entries from the head until `stop` becomes the head
    pub(crate) fn evict_until(&mut self, stop: Hash) {
        while self.oldest != stop && !self.oldest.is_zero() {
            let oldest = self.oldest;
            if self.uncache(&oldest).is_none() {
                break;
            }
        }
    }

    /// Resident bytes: payload plus per-node metadata plus external
    /// children bookkeeping, minus the meta-root's own edges
    pub(crate) fn resident_size(&self) -> StorageSize {
        let metadata = StorageSize::from(self.len() * CACHED_NODE_SIZE);
        let metaroot_refs = self
            .nodes
            .get(&Hash::ZERO)
            .and_then(|root| root.children.as_ref())
            .map(|map| StorageSize::from(map.len() * CHILD_EDGE_SIZE))
            .unwrap_or_default();
        self.dirties_size + self.children_size + metadata - metaroot_refs
    }

    /// Resident bytes a node accounts for, as subtracted by `cap`
    pub(crate) fn flush_cost(node: &CachedNode) -> StorageSize {
        node.payload_size() + StorageSize::from(CACHED_NODE_SIZE) + node.children_bookkeeping()
    }

    /// Walk the flush list from oldest to newest
    pub(crate) fn flush_order(&self) -> Vec<Hash> {
        let mut order = Vec::with_capacity(self.len());
        let mut cursor = self.oldest;
        while !cursor.is_zero() {
            order.push(cursor);
            cursor = match self.nodes.get(&cursor) {
                Some(node) => node.flush_next,
                None => break,
            };
        }
        order
    }
}
