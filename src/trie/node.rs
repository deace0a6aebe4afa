//! Trie node types and their canonical encoding

use crate::model::Hash;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single child slot of a collapsed node
///
/// Small values are embedded directly in their parent; everything else is
/// referenced by the hash of its own encoding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChildRef {
    /// Reference to a separately stored node
    Hash(Hash),
    /// Value bytes stored inline
    Inline(Vec<u8>),
}

impl ChildRef {
    /// The referenced node hash, if this slot points at another node
    pub fn as_hash(&self) -> Option<Hash> {
        match self {
            ChildRef::Hash(hash) => Some(*hash),
            ChildRef::Inline(_) => None,
        }
    }
}

/// A collapsed node in the merkle trie
///
/// This is the structural record the memory database keeps for dirty trie
/// nodes: only data that is part of the canonical encoding, no caches.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrieNode {
    /// A branch node with children indexed by the next key byte
    Branch {
        /// Prefix bytes shared by all children
        prefix: Vec<u8>,
        /// Child slots indexed by the byte following the prefix
        children: BTreeMap<u8, ChildRef>,
        /// Optional value if this exact key exists
        value: Option<Vec<u8>>,
    },
    /// A node holding the remaining key suffix and a single slot
    Leaf {
        key_suffix: Vec<u8>,
        value: ChildRef,
    },
    /// An empty node
    #[default]
    Empty,
}

impl TrieNode {
    /// Create a leaf carrying an inline value
    pub fn leaf(key_suffix: Vec<u8>, value: Vec<u8>) -> Self {
        TrieNode::Leaf {
            key_suffix,
            value: ChildRef::Inline(value),
        }
    }

    /// Create a leaf that continues into another node
    pub fn extension(key_suffix: Vec<u8>, child: Hash) -> Self {
        TrieNode::Leaf {
            key_suffix,
            value: ChildRef::Hash(child),
        }
    }

    /// Create a branch node with no children
    pub fn branch(prefix: Vec<u8>) -> Self {
        TrieNode::Branch {
            prefix,
            children: BTreeMap::new(),
            value: None,
        }
    }

    /// Set a child slot on a branch; a no-op for other node kinds
    pub fn with_child(mut self, index: u8, child: ChildRef) -> Self {
        if let TrieNode::Branch { children, .. } = &mut self {
            children.insert(index, child);
        }
        self
    }

    /// Canonical byte encoding of this node
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode a node previously produced by [`TrieNode::encode`]
    pub fn decode(data: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(data)?)
    }

    /// Compute the hash of this node
    pub fn hash(&self) -> Result<Hash> {
        Ok(Hash::digest(&self.encode()?))
    }

    /// Check if this node is empty
    pub fn is_empty(&self) -> bool {
        matches!(self, TrieNode::Empty)
    }

    /// Hashes of every node referenced from this one, in slot order
    pub fn child_hashes(&self) -> Vec<Hash> {
        match self {
            TrieNode::Branch { children, .. } => {
                children.values().filter_map(ChildRef::as_hash).collect()
            }
            TrieNode::Leaf { value, .. } => value.as_hash().into_iter().collect(),
            TrieNode::Empty => Vec::new(),
        }
    }
}

/// What the memory database stores for a dirty entry
///
/// Raw blobs are opaque to the database and have no children. Collapsed
/// nodes are re-encoded on demand when they are flushed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    Raw(Vec<u8>),
    Collapsed(TrieNode),
}

impl Node {
    /// The bytes that get written to the persistent store
    pub fn encoded_bytes(&self) -> Result<Vec<u8>> {
        match self {
            Node::Raw(blob) => Ok(blob.clone()),
            Node::Collapsed(node) => node.encode(),
        }
    }

    /// Hashes of the nodes embedded as children
    pub fn child_hashes(&self) -> Vec<Hash> {
        match self {
            Node::Raw(_) => Vec::new(),
            Node::Collapsed(node) => node.child_hashes(),
        }
    }

    /// Expand into the structural form, decoding raw bytes if needed
    pub fn to_trie_node(&self) -> Result<TrieNode> {
        match self {
            Node::Raw(blob) => TrieNode::decode(blob),
            Node::Collapsed(node) => Ok(node.clone()),
        }
    }
}

impl From<TrieNode> for Node {
    fn from(node: TrieNode) -> Self {
        Node::Collapsed(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_hash_deterministic() {
        let node = TrieNode::leaf(b"key".to_vec(), b"value".to_vec());
        assert_eq!(node.hash().unwrap(), node.hash().unwrap());
    }

    #[test]
    fn test_different_nodes_different_hashes() {
        let n1 = TrieNode::leaf(b"key1".to_vec(), b"value".to_vec());
        let n2 = TrieNode::leaf(b"key2".to_vec(), b"value".to_vec());
        assert_ne!(n1.hash().unwrap(), n2.hash().unwrap());
    }

    #[test]
    fn test_child_hashes_skip_inline_slots() {
        let a = Hash::digest(b"a");
        let b = Hash::digest(b"b");
        let node = TrieNode::branch(vec![])
            .with_child(3, ChildRef::Hash(b))
            .with_child(1, ChildRef::Hash(a))
            .with_child(2, ChildRef::Inline(b"small".to_vec()));

        assert_eq!(node.child_hashes(), vec![a, b]);
        assert_eq!(TrieNode::extension(vec![7], a).child_hashes(), vec![a]);
        assert!(TrieNode::leaf(vec![7], vec![1]).child_hashes().is_empty());
    }

    #[test]
    fn test_raw_node_decodes_to_structure() {
        let node = TrieNode::extension(b"ab".to_vec(), Hash::digest(b"child"));
        let raw = Node::Raw(node.encode().unwrap());

        assert!(raw.child_hashes().is_empty());
        assert_eq!(raw.to_trie_node().unwrap(), node);
        assert_eq!(
            Node::from(node.clone()).encoded_bytes().unwrap(),
            node.encode().unwrap()
        );
    }
}
