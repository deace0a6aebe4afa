//! # trienode_db
//!
//! A write-back memory database for content-addressed Merkle trie nodes.
//!
//! Trie code stages freshly built nodes here instead of writing them
//! straight to disk. The database tracks which nodes are shared between
//! trie roots, throws away whole subtrees when a root is released, and
//! writes nodes out either in insertion order under memory pressure or for
//! one specific root on demand.
//!
//! ## Core Concepts
//!
//! - **Dirty nodes**: staged in memory, not yet on disk
//! - **Pins**: references from the meta-root (the zero hash) that keep a
//!   trie root and everything below it alive
//! - **Cap**: flush the oldest nodes until memory use is under a limit
//! - **Commit**: flush one root's subtree regardless of memory use
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use trienode_db::{Database, Hash, MemoryStore, StorageSize, TrieNode};
//!
//! let db = Database::new(Arc::new(MemoryStore::new()));
//! let root = db.insert_node(TrieNode::leaf(b"key".to_vec(), b"value".to_vec()))?;
//! db.reference(root, Hash::ZERO)?;
//! db.cap(StorageSize(64 * 1024 * 1024))?;
//! db.commit(root, true)?;
//! ```

pub mod cache;
pub mod config;
pub mod model;
pub mod store;
pub mod trie;

mod database;
mod error;

pub use cache::CleanCache;
pub use config::DatabaseConfig;
pub use database::{secure_key, Database, Stats, SECURE_KEY_PREFIX};
pub use error::{Error, Result};
pub use model::{Hash, StorageSize, HASH_LENGTH};
pub use store::{Batch, FileStore, KeyValueStore, KeyValueWriter, MemoryStore, IDEAL_BATCH_SIZE};
pub use trie::{ChildRef, Node, TrieNode};

/// Store file format version
pub const VERSION: u32 = 1;

/// Magic bytes for file identification
pub const MAGIC: &[u8; 8] = b"TRIENODE";
