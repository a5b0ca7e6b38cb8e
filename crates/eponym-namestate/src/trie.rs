//! Seam to the authenticated name trie.
//!
//! The engine never computes trie internals; it stages leaf changes and
//! asks the trie to land its dirty nodes in the block's write batch so the
//! KV state and the root advance together.

use crate::db::WriteBatch;

/// Authenticated mapping `name_hash → record_hash`, committed once per
/// block. Implementations buffer `insert`/`remove` internally: `root_hash`
/// must already reflect staged changes, `commit_to` stages every dirty node
/// into the caller's batch and promotes the staged state, and `rollback`
/// discards staged state without touching durable storage.
pub trait CommitmentTrie {
    fn insert(&mut self, key: [u8; 32], value: [u8; 32]) -> Result<(), String>;

    fn remove(&mut self, key: [u8; 32]) -> Result<(), String>;

    /// Current root over committed plus staged state.
    fn root_hash(&self) -> [u8; 32];

    /// Stage dirty nodes into `batch`. The engine commits the batch; an
    /// aborted batch must be preceded by `rollback`.
    fn commit_to(&mut self, batch: &WriteBatch) -> Result<(), String>;

    /// Discard staged insert/remove operations.
    fn rollback(&mut self);
}
