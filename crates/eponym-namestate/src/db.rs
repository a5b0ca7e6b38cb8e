//! redb-backed persistent storage for the name engine.
//!
//! Two logical tables:
//! - `namestate` — the seven prefixed key families (see `keys`)
//! - `name_trie` — node storage owned by the commitment trie
//!
//! All mutation goes through `WriteBatch`, which wraps one redb write
//! transaction so a block's KV writes and trie writes commit atomically.

use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition, WriteTransaction};

use eponym_consensus::TxOutPoint;

use crate::auction::Auction;
use crate::keys::{
    auction_key, bid_bounds, bid_key, outpoint_from_indexed_key, renewal_key, reveal_bounds,
    reveal_key, reverse_key, root_key, undo_key,
};

const NAMESTATE_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("namestate");
const TRIE_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("name_trie");

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

pub struct Store {
    db: Database,
}

impl Store {
    /// Open (or create) a redb database at `path`.
    pub fn open(path: &Path) -> Result<Self, String> {
        let db = Database::create(path).map_err(|e| format!("redb open: {e}"))?;
        // Ensure both tables exist by opening a write transaction.
        let tx = db
            .begin_write()
            .map_err(|e| format!("redb begin_write: {e}"))?;
        tx.open_table(NAMESTATE_TABLE)
            .map_err(|e| format!("create namestate table: {e}"))?;
        tx.open_table(TRIE_TABLE)
            .map_err(|e| format!("create trie table: {e}"))?;
        tx.commit().map_err(|e| format!("redb commit: {e}"))?;
        Ok(Self { db })
    }

    /// Begin a redb write transaction. Caller uses the returned `WriteBatch`
    /// to stage mutations, then calls `commit()`. Dropping the batch without
    /// committing aborts every staged write.
    pub fn begin_write(&self) -> Result<WriteBatch, String> {
        let tx = self
            .db
            .begin_write()
            .map_err(|e| format!("begin_write: {e}"))?;
        Ok(WriteBatch { tx })
    }

    fn get_raw(&self, key: &[u8]) -> Result<Option<Vec<u8>>, String> {
        let tx = self
            .db
            .begin_read()
            .map_err(|e| format!("begin_read: {e}"))?;
        let table = tx
            .open_table(NAMESTATE_TABLE)
            .map_err(|e| format!("open namestate: {e}"))?;
        match table.get(key).map_err(|e| format!("get: {e}"))? {
            Some(guard) => Ok(Some(guard.value().to_vec())),
            None => Ok(None),
        }
    }

    // ── Auctions ────────────────────────────────────────────────────────

    pub fn get_auction(&self, name_hash: &[u8; 32]) -> Result<Option<Auction>, String> {
        match self.get_raw(&auction_key(name_hash))? {
            Some(blob) => Ok(Some(Auction::deserialize(&blob)?)),
            None => Ok(None),
        }
    }

    // ── Reverse index ───────────────────────────────────────────────────

    pub fn get_reverse(&self, outpoint: &TxOutPoint) -> Result<Option<[u8; 32]>, String> {
        match self.get_raw(&reverse_key(outpoint))? {
            Some(v) => {
                if v.len() != 32 {
                    return Err(format!("reverse index: expected 32 bytes, got {}", v.len()));
                }
                let mut nh = [0u8; 32];
                nh.copy_from_slice(&v);
                Ok(Some(nh))
            }
            None => Ok(None),
        }
    }

    // ── Bids and reveals ────────────────────────────────────────────────

    pub fn has_bid(&self, name_hash: &[u8; 32], outpoint: &TxOutPoint) -> Result<bool, String> {
        Ok(self.get_raw(&bid_key(name_hash, outpoint))?.is_some())
    }

    pub fn get_reveal(
        &self,
        name_hash: &[u8; 32],
        outpoint: &TxOutPoint,
    ) -> Result<Option<u64>, String> {
        match self.get_raw(&reveal_key(name_hash, outpoint))? {
            Some(v) => {
                if v.len() != 8 {
                    return Err(format!("reveal value: expected 8 bytes, got {}", v.len()));
                }
                Ok(Some(u64::from_le_bytes(v.as_slice().try_into().unwrap())))
            }
            None => Ok(None),
        }
    }

    /// Iterate reveal records under `name_hash` in ascending key order.
    pub fn iter_reveals<F>(&self, name_hash: &[u8; 32], mut f: F) -> Result<(), String>
    where
        F: FnMut(&TxOutPoint, u64),
    {
        let tx = self
            .db
            .begin_read()
            .map_err(|e| format!("begin_read: {e}"))?;
        let table = tx
            .open_table(NAMESTATE_TABLE)
            .map_err(|e| format!("open namestate: {e}"))?;
        let (lo, hi) = reveal_bounds(name_hash);
        let iter = table
            .range(lo.as_slice()..=hi.as_slice())
            .map_err(|e| format!("reveal range: {e}"))?;
        for result in iter {
            let (key_guard, val_guard) = result.map_err(|e| format!("reveal next: {e}"))?;
            let outpoint = outpoint_from_indexed_key(key_guard.value())?;
            let raw = val_guard.value();
            if raw.len() != 8 {
                return Err(format!("reveal value: expected 8 bytes, got {}", raw.len()));
            }
            let value = u64::from_le_bytes(raw.try_into().unwrap());
            f(&outpoint, value);
        }
        Ok(())
    }

    /// Count bid markers under `name_hash`.
    pub fn count_bids(&self, name_hash: &[u8; 32]) -> Result<u64, String> {
        let tx = self
            .db
            .begin_read()
            .map_err(|e| format!("begin_read: {e}"))?;
        let table = tx
            .open_table(NAMESTATE_TABLE)
            .map_err(|e| format!("open namestate: {e}"))?;
        let (lo, hi) = bid_bounds(name_hash);
        let iter = table
            .range(lo.as_slice()..=hi.as_slice())
            .map_err(|e| format!("bid range: {e}"))?;
        let mut count = 0u64;
        for result in iter {
            result.map_err(|e| format!("bid next: {e}"))?;
            count += 1;
        }
        Ok(count)
    }

    // ── Undo records ────────────────────────────────────────────────────

    pub fn get_undo(&self, outpoint: &TxOutPoint) -> Result<Option<Vec<u8>>, String> {
        self.get_raw(&undo_key(outpoint))
    }

    pub fn get_renewal_undo(&self, outpoint: &TxOutPoint) -> Result<Option<u32>, String> {
        match self.get_raw(&renewal_key(outpoint))? {
            Some(v) => {
                if v.len() != 4 {
                    return Err(format!("renewal undo: expected 4 bytes, got {}", v.len()));
                }
                Ok(Some(u32::from_le_bytes(v.as_slice().try_into().unwrap())))
            }
            None => Ok(None),
        }
    }

    // ── Meta ────────────────────────────────────────────────────────────

    /// Trie root as of the last committed block, if any.
    pub fn committed_root(&self) -> Result<Option<[u8; 32]>, String> {
        match self.get_raw(&root_key())? {
            Some(v) => {
                if v.len() != 32 {
                    return Err(format!("committed root: expected 32 bytes, got {}", v.len()));
                }
                let mut root = [0u8; 32];
                root.copy_from_slice(&v);
                Ok(Some(root))
            }
            None => Ok(None),
        }
    }

    // ── Full scans (consistency checks and tests) ───────────────────────

    /// Iterate every namestate entry in lexicographic key order.
    pub fn iter_all<F>(&self, mut f: F) -> Result<(), String>
    where
        F: FnMut(&[u8], &[u8]),
    {
        let tx = self
            .db
            .begin_read()
            .map_err(|e| format!("begin_read: {e}"))?;
        let table = tx
            .open_table(NAMESTATE_TABLE)
            .map_err(|e| format!("open namestate: {e}"))?;
        let iter = table.iter().map_err(|e| format!("namestate iter: {e}"))?;
        for result in iter {
            let (key_guard, val_guard) = result.map_err(|e| format!("namestate next: {e}"))?;
            f(key_guard.value(), val_guard.value());
        }
        Ok(())
    }

    pub fn get_trie_node(&self, key: &[u8]) -> Result<Option<Vec<u8>>, String> {
        let tx = self
            .db
            .begin_read()
            .map_err(|e| format!("begin_read: {e}"))?;
        let table = tx
            .open_table(TRIE_TABLE)
            .map_err(|e| format!("open trie: {e}"))?;
        match table.get(key).map_err(|e| format!("get trie node: {e}"))? {
            Some(guard) => Ok(Some(guard.value().to_vec())),
            None => Ok(None),
        }
    }

    /// Iterate every trie node in lexicographic key order.
    pub fn iter_trie<F>(&self, mut f: F) -> Result<(), String>
    where
        F: FnMut(&[u8], &[u8]),
    {
        let tx = self
            .db
            .begin_read()
            .map_err(|e| format!("begin_read: {e}"))?;
        let table = tx
            .open_table(TRIE_TABLE)
            .map_err(|e| format!("open trie: {e}"))?;
        let iter = table.iter().map_err(|e| format!("trie iter: {e}"))?;
        for result in iter {
            let (key_guard, val_guard) = result.map_err(|e| format!("trie next: {e}"))?;
            f(key_guard.value(), val_guard.value());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// WriteBatch — wraps a redb WriteTransaction for atomic multi-table writes
// ---------------------------------------------------------------------------

pub struct WriteBatch {
    tx: WriteTransaction,
}

impl WriteBatch {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), String> {
        let mut table = self
            .tx
            .open_table(NAMESTATE_TABLE)
            .map_err(|e| format!("open namestate: {e}"))?;
        table.insert(key, value).map_err(|e| format!("put: {e}"))?;
        Ok(())
    }

    fn del(&self, key: &[u8]) -> Result<(), String> {
        let mut table = self
            .tx
            .open_table(NAMESTATE_TABLE)
            .map_err(|e| format!("open namestate: {e}"))?;
        table.remove(key).map_err(|e| format!("del: {e}"))?;
        Ok(())
    }

    pub fn put_auction(&self, name_hash: &[u8; 32], blob: &[u8]) -> Result<(), String> {
        self.put(&auction_key(name_hash), blob)
    }

    pub fn del_auction(&self, name_hash: &[u8; 32]) -> Result<(), String> {
        self.del(&auction_key(name_hash))
    }

    pub fn put_reverse(&self, outpoint: &TxOutPoint, name_hash: &[u8; 32]) -> Result<(), String> {
        self.put(&reverse_key(outpoint), name_hash)
    }

    pub fn del_reverse(&self, outpoint: &TxOutPoint) -> Result<(), String> {
        self.del(&reverse_key(outpoint))
    }

    pub fn put_bid(&self, name_hash: &[u8; 32], outpoint: &TxOutPoint) -> Result<(), String> {
        self.put(&bid_key(name_hash, outpoint), &[])
    }

    pub fn del_bid(&self, name_hash: &[u8; 32], outpoint: &TxOutPoint) -> Result<(), String> {
        self.del(&bid_key(name_hash, outpoint))
    }

    pub fn put_reveal(
        &self,
        name_hash: &[u8; 32],
        outpoint: &TxOutPoint,
        value: u64,
    ) -> Result<(), String> {
        self.put(&reveal_key(name_hash, outpoint), &value.to_le_bytes())
    }

    pub fn del_reveal(&self, name_hash: &[u8; 32], outpoint: &TxOutPoint) -> Result<(), String> {
        self.del(&reveal_key(name_hash, outpoint))
    }

    pub fn put_undo(&self, outpoint: &TxOutPoint, blob: &[u8]) -> Result<(), String> {
        self.put(&undo_key(outpoint), blob)
    }

    pub fn del_undo(&self, outpoint: &TxOutPoint) -> Result<(), String> {
        self.del(&undo_key(outpoint))
    }

    pub fn put_renewal_undo(&self, outpoint: &TxOutPoint, height: u32) -> Result<(), String> {
        self.put(&renewal_key(outpoint), &height.to_le_bytes())
    }

    pub fn del_renewal_undo(&self, outpoint: &TxOutPoint) -> Result<(), String> {
        self.del(&renewal_key(outpoint))
    }

    pub fn put_root(&self, root: &[u8; 32]) -> Result<(), String> {
        self.put(&root_key(), root)
    }

    // ── Trie bucket (driven by CommitmentTrie::commit_to) ───────────────

    pub fn put_trie_node(&self, key: &[u8], value: &[u8]) -> Result<(), String> {
        let mut table = self
            .tx
            .open_table(TRIE_TABLE)
            .map_err(|e| format!("open trie: {e}"))?;
        table
            .insert(key, value)
            .map_err(|e| format!("put trie node: {e}"))?;
        Ok(())
    }

    pub fn del_trie_node(&self, key: &[u8]) -> Result<(), String> {
        let mut table = self
            .tx
            .open_table(TRIE_TABLE)
            .map_err(|e| format!("open trie: {e}"))?;
        table
            .remove(key)
            .map_err(|e| format!("del trie node: {e}"))?;
        Ok(())
    }

    /// Commit the write batch atomically.
    pub fn commit(self) -> Result<(), String> {
        self.tx.commit().map_err(|e| format!("commit: {e}"))
    }
}
