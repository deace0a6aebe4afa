//! Merkle trie node representation
//!
//! The memory database does not walk or update tries itself. It only needs
//! to encode a node and to enumerate the hashes of its children, which is
//! what this module provides.

mod node;

pub use node::{ChildRef, Node, TrieNode};
