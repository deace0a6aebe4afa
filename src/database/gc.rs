//! Reference counting over the dirty node graph

use super::dirty::{DirtyState, CHILDREN_MAP_SIZE, CHILD_EDGE_SIZE};
use crate::model::{Hash, StorageSize};
use std::collections::HashMap;
use tracing::warn;

impl DirtyState {
    /// Add an edge from `parent` to `child`.
    ///
    /// Nodes that are not dirty are durable and not reference tracked, so
    /// an absent child or parent makes this a no-op. The meta-root holds at
    /// most one pin per root; ordinary parents count every reference.
    pub(crate) fn reference(&mut self, child: Hash, parent: Hash) {
        if child == parent || !self.nodes.contains_key(&child) {
            return;
        }
        let Some(parent_node) = self.nodes.get_mut(&parent) else {
            return;
        };

        if parent_node.children.is_none() {
            self.children_size += StorageSize::from(CHILDREN_MAP_SIZE);
        }
        let children = parent_node.children.get_or_insert_with(HashMap::new);
        let existing = children.get(&child).copied().unwrap_or(0);
        if existing > 0 && parent.is_zero() {
            return;
        }
        if existing == u16::MAX {
            warn!(child = %child, parent = %parent, "database.reference.saturated");
            return;
        }
        children.insert(child, existing + 1);
        if existing == 0 {
            self.children_size += StorageSize::from(CHILD_EDGE_SIZE);
        }

        if let Some(child_node) = self.nodes.get_mut(&child) {
            child_node.parents += 1;
        }
    }

    /// Drop one edge from `parent` to `child`, collecting `child` and
    /// everything only it kept alive.
    ///
    /// The child's parent count is released even when no explicit edge
    /// existed. Returns whether one did.
    pub(crate) fn dereference(&mut self, child: Hash, parent: Hash) -> bool {
        let mut had_edge = false;
        if let Some(children) = self
            .nodes
            .get_mut(&parent)
            .and_then(|node| node.children.as_mut())
        {
            if let Some(count) = children.get_mut(&child) {
                had_edge = true;
                *count -= 1;
                if *count == 0 {
                    children.remove(&child);
                    self.children_size -= StorageSize::from(CHILD_EDGE_SIZE);
                }
            }
        }
        self.release(child);
        had_edge
    }

    /// Decrement parent counts starting at `hash`, cascading into the
    /// children of every node whose count reaches zero.
    fn release(&mut self, hash: Hash) {
        let mut pending = vec![hash];
        while let Some(hash) = pending.pop() {
            if hash.is_zero() {
                continue;
            }
            let Some(node) = self.nodes.get_mut(&hash) else {
                continue;
            };
            if node.parents > 0 {
                node.parents -= 1;
            } else {
                // A durable node re-staged in a new shape can be dirty
                // without parents. Clamp, but keep a count of it.
                self.stats.clamped_dereferences += 1;
                warn!(node = %hash, "database.dereference.clamped");
            }
            if node.parents > 0 {
                continue;
            }

            let Some(node) = self.nodes.remove(&hash) else {
                continue;
            };
            self.unlink(node.flush_prev, node.flush_next);
            self.dirties_size -= node.payload_size();
            self.children_size -= node.children_bookkeeping();

            if let Some(children) = &node.children {
                for (child, count) in children {
                    pending.extend(std::iter::repeat(*child).take(*count as usize));
                }
            }
            pending.extend(node.embedded_children());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trie::{ChildRef, Node, TrieNode};

    fn blob(state: &mut DirtyState, tag: &str) -> Hash {
        let hash = Hash::digest(tag.as_bytes());
        state.insert(hash, tag.len(), Node::Raw(tag.as_bytes().to_vec()));
        hash
    }

    #[test]
    fn test_meta_root_pin_is_idempotent() {
        let mut state = DirtyState::new();
        let root = blob(&mut state, "root");

        state.reference(root, Hash::ZERO);
        state.reference(root, Hash::ZERO);
        assert_eq!(state.nodes[&root].parents, 1);

        state.dereference(root, Hash::ZERO);
        assert!(!state.nodes.contains_key(&root));
    }

    #[test]
    fn test_ordinary_references_are_additive() {
        let mut state = DirtyState::new();
        let parent = blob(&mut state, "parent");
        let child = blob(&mut state, "child");
        state.reference(parent, Hash::ZERO);

        state.reference(child, parent);
        state.reference(child, parent);
        assert_eq!(state.nodes[&child].parents, 2);
        assert_eq!(state.nodes[&parent].children.as_ref().unwrap()[&child], 2);

        // Collecting the parent releases both edges
        state.dereference(parent, Hash::ZERO);
        assert_eq!(state.len(), 0);
        assert_eq!(state.children_size, StorageSize::ZERO);
        assert_eq!(state.stats.clamped_dereferences, 0);
    }

    #[test]
    fn test_reference_to_clean_node_is_noop() {
        let mut state = DirtyState::new();
        let parent = blob(&mut state, "parent");
        state.reference(Hash::digest(b"on disk"), parent);
        assert!(state.nodes[&parent].children.is_none());
        assert_eq!(state.children_size, StorageSize::ZERO);
    }

    #[test]
    fn test_embedded_children_cascade() {
        let mut state = DirtyState::new();
        let leaf = TrieNode::leaf(b"k".to_vec(), b"v".to_vec());
        let leaf_hash = leaf.hash().unwrap();
        state.insert(leaf_hash, 8, Node::from(leaf));

        let ext = TrieNode::extension(b"p".to_vec(), leaf_hash);
        let ext_hash = ext.hash().unwrap();
        state.insert(ext_hash, 40, Node::from(ext));
        assert_eq!(state.nodes[&leaf_hash].parents, 1);

        state.reference(ext_hash, Hash::ZERO);
        state.dereference(ext_hash, Hash::ZERO);
        assert_eq!(state.len(), 0);
        assert!(state.flush_order().is_empty());
    }

    #[test]
    fn test_shared_child_survives() {
        let mut state = DirtyState::new();
        let shared = blob(&mut state, "shared");
        let branch = |tag: u8| {
            TrieNode::branch(vec![tag]).with_child(0, ChildRef::Hash(shared))
        };
        let (a, b) = (branch(1), branch(2));
        let (ha, hb) = (a.hash().unwrap(), b.hash().unwrap());
        state.insert(ha, 10, Node::from(a));
        state.insert(hb, 10, Node::from(b));
        state.reference(ha, Hash::ZERO);
        state.reference(hb, Hash::ZERO);

        state.dereference(ha, Hash::ZERO);
        assert!(state.nodes.contains_key(&shared));
        assert_eq!(state.nodes[&shared].parents, 1);

        state.dereference(hb, Hash::ZERO);
        assert!(!state.nodes.contains_key(&shared));
    }

    #[test]
    fn test_clamped_dereference_is_counted() {
        let mut state = DirtyState::new();
        let orphan = blob(&mut state, "orphan");

        // Dirty but never referenced: dropping it clamps at zero
        state.dereference(orphan, Hash::ZERO);
        assert!(!state.nodes.contains_key(&orphan));
        assert_eq!(state.stats.clamped_dereferences, 1);
    }

    #[test]
    fn test_reference_cycle_terminates() {
        let mut state = DirtyState::new();
        let a = blob(&mut state, "a");
        let b = blob(&mut state, "b");
        state.reference(a, Hash::ZERO);
        state.reference(b, a);
        state.reference(a, b);

        // b still holds a, so unpinning only drops the root edge
        state.dereference(a, Hash::ZERO);
        assert!(state.nodes.contains_key(&a));
        assert!(state.nodes.contains_key(&b));
    }
}
