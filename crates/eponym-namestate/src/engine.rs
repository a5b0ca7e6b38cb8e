//! Block-level entry points tying the store, the view and the trie.
//!
//! The validator drives one engine per chain: `connect_covenants` /
//! `disconnect_covenants` once per transaction, then a single flush that
//! lands the whole block in one atomic batch. A consensus failure rejects
//! the block before anything durable happens; the only durable effect is
//! the committed batch.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, trace};

use eponym_consensus::{Network, Tx, TxOutPoint, TxOutput, NAME_ERR_ROOT_MISMATCH};

use crate::db::Store;
use crate::meta::StateMeta;
use crate::trie::CommitmentTrie;
use crate::view::NameView;
use crate::StateError;

// ---------------------------------------------------------------------------
// External views (supplied by the chain validator)
// ---------------------------------------------------------------------------

/// Prior outputs consumed by the block. During disconnect the same view
/// must hand back the coins the block consumed, value included.
pub trait CoinView {
    fn get_output(&self, prevout: &TxOutPoint) -> Result<Option<TxOutput>, String>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainEntry {
    pub hash: [u8; 32],
    pub height: u32,
}

/// Header-chain lookups used to validate renewal references.
pub trait ChainView {
    fn get_entry(&self, block_hash: &[u8; 32]) -> Result<Option<ChainEntry>, String>;
    fn is_main_chain(&self, entry: &ChainEntry) -> Result<bool, String>;
}

// ---------------------------------------------------------------------------
// NameEngine
// ---------------------------------------------------------------------------

pub struct NameEngine<T: CommitmentTrie> {
    pub(crate) store: Store,
    pub(crate) network: Network,
    trie: T,
    meta: StateMeta,
    meta_path: PathBuf,
}

impl<T: CommitmentTrie> NameEngine<T> {
    /// Open (or create) the engine state under `state_dir`.
    pub fn open(state_dir: &Path, network: Network, trie: T) -> Result<Self, String> {
        fs::create_dir_all(state_dir).map_err(|e| format!("create state dir: {e}"))?;
        let store = Store::open(&state_dir.join("namestate.redb"))?;
        let meta_path = StateMeta::path_in(state_dir);
        let meta = if meta_path.exists() {
            StateMeta::load(&meta_path, &network)?
        } else {
            StateMeta::genesis(&network)
        };

        // Seed or cross-check the committed root so the store and the trie
        // can never silently diverge across restarts.
        match store.committed_root()? {
            None => {
                let batch = store.begin_write()?;
                batch.put_root(&trie.root_hash())?;
                batch.commit()?;
            }
            Some(root) => {
                if root != trie.root_hash() {
                    return Err(format!(
                        "trie root {} disagrees with committed root {}",
                        hex::encode(trie.root_hash()),
                        hex::encode(root)
                    ));
                }
            }
        }

        Ok(Self {
            store,
            network,
            trie,
            meta,
            meta_path,
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn meta(&self) -> &StateMeta {
        &self.meta
    }

    /// Current trie root, staged changes included.
    pub fn tree_root(&self) -> [u8; 32] {
        self.trie.root_hash()
    }

    /// Apply every transaction of a block, flush, and commit atomically iff
    /// the resulting trie root matches `committed_root`. `Ok(false)` is a
    /// consensus rejection; nothing durable happened.
    pub fn connect_block(
        &mut self,
        txs: &[Tx],
        height: u32,
        committed_root: &[u8; 32],
        coins: &dyn CoinView,
        chain: &dyn ChainView,
    ) -> Result<bool, String> {
        let mut view = NameView::new();
        for tx in txs {
            match self.connect_covenants(tx, height, &mut view, coins, chain) {
                Ok(()) => {}
                Err(StateError::Invalid(code)) => {
                    debug!("connect rejected at height {height}: {code}");
                    return Ok(false);
                }
                Err(StateError::Fatal(e)) => return Err(e),
            }
        }

        let batch = self.store.begin_write()?;
        view.commit(&batch, &mut self.trie)?;

        let root = self.trie.root_hash();
        if root != *committed_root {
            debug!(
                "{NAME_ERR_ROOT_MISMATCH} at height {height}: computed {}",
                hex::encode(root)
            );
            self.trie.rollback();
            // Dropping the batch aborts every staged write.
            return Ok(false);
        }

        self.trie.commit_to(&batch)?;
        batch.put_root(&root)?;
        batch.commit()?;

        self.meta.update(height, &root);
        self.meta.save_atomic(&self.meta_path)?;
        trace!("connected block at height {height}, root {}", hex::encode(root));
        Ok(true)
    }

    /// Dry-run a block against a throwaway batch and report whether the
    /// recomputed root agrees with `committed_root`. The comparison runs
    /// after the block is applied, never against the pre-block root.
    pub fn verify_block(
        &mut self,
        txs: &[Tx],
        height: u32,
        committed_root: &[u8; 32],
        coins: &dyn CoinView,
        chain: &dyn ChainView,
    ) -> Result<bool, String> {
        let mut view = NameView::new();
        for tx in txs {
            match self.connect_covenants(tx, height, &mut view, coins, chain) {
                Ok(()) => {}
                Err(StateError::Invalid(code)) => {
                    debug!("verify rejected at height {height}: {code}");
                    return Ok(false);
                }
                Err(StateError::Fatal(e)) => return Err(e),
            }
        }

        let batch = self.store.begin_write()?;
        let result = view.commit(&batch, &mut self.trie);
        let root = self.trie.root_hash();
        self.trie.rollback();
        drop(batch);
        result?;

        Ok(root == *committed_root)
    }

    /// Reverse one block: transactions in reverse order, then one atomic
    /// flush. Failures here are invariant violations, not block verdicts.
    pub fn disconnect_block(
        &mut self,
        txs: &[Tx],
        height: u32,
        coins: &dyn CoinView,
    ) -> Result<(), String> {
        let mut view = NameView::new();
        for tx in txs.iter().rev() {
            self.disconnect_covenants(tx, height, &mut view, coins)
                .map_err(|e| match e {
                    StateError::Fatal(msg) => msg,
                    StateError::Invalid(code) => format!("disconnect: {code}"),
                })?;
        }

        let batch = self.store.begin_write()?;
        view.commit(&batch, &mut self.trie)?;
        self.trie.commit_to(&batch)?;
        let root = self.trie.root_hash();
        batch.put_root(&root)?;
        batch.commit()?;

        self.meta.update(height.saturating_sub(1), &root);
        self.meta.save_atomic(&self.meta_path)?;
        trace!(
            "disconnected block at height {height}, root {}",
            hex::encode(root)
        );
        Ok(())
    }
}
