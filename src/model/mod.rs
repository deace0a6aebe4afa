//! Core value types shared by every layer

mod hash;
mod size;

pub use hash::{Hash, HASH_LENGTH};
pub use size::StorageSize;
