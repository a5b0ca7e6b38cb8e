//! Per-block auction cache.
//!
//! Auctions touched by a block are loaded once and mutated in memory; the
//! op logs land in the KV batch only in `commit`. The view also overlays
//! the outpoint reverse index so a transaction can spend a bid or reveal
//! created earlier in the same block.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use eponym_consensus::{blake2b256, hash_name, TxOutPoint};

use crate::auction::{Auction, NameOp};
use crate::db::{Store, WriteBatch};
use crate::trie::CommitmentTrie;

pub struct NameView {
    auctions: BTreeMap<[u8; 32], Auction>,
    /// Block-local reverse-index overlay: `Some` = added this block,
    /// `None` = removed this block. Consulted before the store.
    reverse: BTreeMap<TxOutPoint, Option<[u8; 32]>>,
}

impl NameView {
    pub fn new() -> Self {
        Self {
            auctions: BTreeMap::new(),
            reverse: BTreeMap::new(),
        }
    }

    /// Auction by name hash, loading from the store on first touch.
    pub fn get_auction(
        &mut self,
        store: &Store,
        name_hash: &[u8; 32],
    ) -> Result<Option<&mut Auction>, String> {
        if !self.auctions.contains_key(name_hash) {
            match store.get_auction(name_hash)? {
                Some(auction) => {
                    self.auctions.insert(*name_hash, auction);
                }
                None => return Ok(None),
            }
        }
        Ok(self.auctions.get_mut(name_hash))
    }

    /// Auction by name, created in the view if absent everywhere.
    pub fn ensure_auction(
        &mut self,
        store: &Store,
        name: &[u8],
        height: u32,
    ) -> Result<&mut Auction, String> {
        let name_hash = hash_name(name);
        match self.auctions.entry(name_hash) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let auction = match store.get_auction(&name_hash)? {
                    Some(auction) => auction,
                    None => Auction::new(name.to_vec(), height),
                };
                Ok(entry.insert(auction))
            }
        }
    }

    /// Auction owning `outpoint`, resolved through the reverse index
    /// (block-local overlay first, then the store).
    pub fn get_auction_for(
        &mut self,
        store: &Store,
        outpoint: &TxOutPoint,
    ) -> Result<Option<&mut Auction>, String> {
        let name_hash = match self.reverse.get(outpoint) {
            Some(Some(name_hash)) => Some(*name_hash),
            Some(None) => None,
            None => store.get_reverse(outpoint)?,
        };
        match name_hash {
            Some(name_hash) => self.get_auction(store, &name_hash),
            None => Ok(None),
        }
    }

    pub(crate) fn auction_mut(&mut self, name_hash: &[u8; 32]) -> Result<&mut Auction, String> {
        self.auctions
            .get_mut(name_hash)
            .ok_or_else(|| "view: mutation of unloaded auction".to_string())
    }

    // ── Reverse-indexed mutators ────────────────────────────────────────
    //
    // Bid and reveal records carry a reverse entry; routing these four
    // through the view keeps the overlay in step with the op log.

    pub fn add_bid(&mut self, name_hash: &[u8; 32], outpoint: &TxOutPoint) -> Result<(), String> {
        self.auction_mut(name_hash)?.add_bid(*outpoint);
        self.reverse.insert(*outpoint, Some(*name_hash));
        Ok(())
    }

    pub fn remove_bid(
        &mut self,
        name_hash: &[u8; 32],
        outpoint: &TxOutPoint,
    ) -> Result<(), String> {
        self.auction_mut(name_hash)?.remove_bid(*outpoint)?;
        self.reverse.insert(*outpoint, None);
        Ok(())
    }

    pub fn add_reveal(
        &mut self,
        name_hash: &[u8; 32],
        outpoint: &TxOutPoint,
        value: u64,
    ) -> Result<(), String> {
        self.auction_mut(name_hash)?.add_reveal(*outpoint, value);
        self.reverse.insert(*outpoint, Some(*name_hash));
        Ok(())
    }

    pub fn remove_reveal(
        &mut self,
        name_hash: &[u8; 32],
        outpoint: &TxOutPoint,
    ) -> Result<(), String> {
        self.auction_mut(name_hash)?.remove_reveal(*outpoint);
        self.reverse.insert(*outpoint, None);
        Ok(())
    }

    pub fn save(&mut self, name_hash: &[u8; 32]) -> Result<(), String> {
        self.auction_mut(name_hash)?.save();
        Ok(())
    }

    // ── Flush ───────────────────────────────────────────────────────────

    /// Replay every auction's op log into the batch and the trie, clearing
    /// the logs. Within one auction, ops replay in the order the engine
    /// applied them; auctions flush in name-hash order.
    pub fn commit<T: CommitmentTrie>(
        &mut self,
        batch: &WriteBatch,
        trie: &mut T,
    ) -> Result<(), String> {
        for (name_hash, auction) in self.auctions.iter_mut() {
            let ops = std::mem::take(&mut auction.ops);
            for op in ops {
                match op {
                    NameOp::AddBid { outpoint } => {
                        batch.put_bid(name_hash, &outpoint)?;
                        batch.put_reverse(&outpoint, name_hash)?;
                    }
                    NameOp::RemoveBid { outpoint } => {
                        batch.del_bid(name_hash, &outpoint)?;
                        batch.del_reverse(&outpoint)?;
                    }
                    NameOp::AddReveal { outpoint, value } => {
                        batch.put_reveal(name_hash, &outpoint, value)?;
                        batch.put_reverse(&outpoint, name_hash)?;
                    }
                    NameOp::RemoveReveal { outpoint } => {
                        batch.del_reveal(name_hash, &outpoint)?;
                        batch.del_reverse(&outpoint)?;
                    }
                    // Owner changes are carried by the serialized blob.
                    NameOp::SetOwner { .. } | NameOp::SetNull => {}
                    NameOp::Commit { data } => trie.insert(*name_hash, blake2b256(&data))?,
                    NameOp::Uncommit => trie.remove(*name_hash)?,
                    NameOp::AddUndo { outpoint, blob } => batch.put_undo(&outpoint, &blob)?,
                    NameOp::RemoveUndo { outpoint } => batch.del_undo(&outpoint)?,
                    NameOp::AddRenewal { outpoint, prior } => {
                        batch.put_renewal_undo(&outpoint, prior)?
                    }
                    NameOp::RemoveRenewal { outpoint } => batch.del_renewal_undo(&outpoint)?,
                    NameOp::Save => batch.put_auction(name_hash, &auction.serialize())?,
                    NameOp::Remove => batch.del_auction(name_hash)?,
                }
            }
        }
        self.reverse.clear();
        Ok(())
    }
}

impl Default for NameView {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records staged leaf operations; root is a hash over the sorted
    /// staged-plus-committed leaf set.
    struct RecordingTrie {
        leaves: BTreeMap<[u8; 32], [u8; 32]>,
        staged: Vec<(String, [u8; 32])>,
    }

    impl RecordingTrie {
        fn new() -> Self {
            Self {
                leaves: BTreeMap::new(),
                staged: Vec::new(),
            }
        }
    }

    impl CommitmentTrie for RecordingTrie {
        fn insert(&mut self, key: [u8; 32], value: [u8; 32]) -> Result<(), String> {
            self.leaves.insert(key, value);
            self.staged.push(("insert".into(), key));
            Ok(())
        }

        fn remove(&mut self, key: [u8; 32]) -> Result<(), String> {
            self.leaves.remove(&key);
            self.staged.push(("remove".into(), key));
            Ok(())
        }

        fn root_hash(&self) -> [u8; 32] {
            let mut buf = Vec::new();
            for (k, v) in &self.leaves {
                buf.extend_from_slice(k);
                buf.extend_from_slice(v);
            }
            blake2b256(&buf)
        }

        fn commit_to(&mut self, _batch: &WriteBatch) -> Result<(), String> {
            self.staged.clear();
            Ok(())
        }

        fn rollback(&mut self) {
            self.staged.clear();
        }
    }

    fn outpoint(fill: u8, vout: u32) -> TxOutPoint {
        TxOutPoint::new([fill; 32], vout)
    }

    fn temp_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("namestate.redb")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_ensure_creates_once() {
        let (_dir, store) = temp_store();
        let mut view = NameView::new();

        let nh = view.ensure_auction(&store, b"alice", 10).unwrap().name_hash;
        view.auction_mut(&nh).unwrap().bids = 5;
        // Second ensure returns the cached instance, not a fresh one.
        assert_eq!(view.ensure_auction(&store, b"alice", 99).unwrap().bids, 5);
    }

    #[test]
    fn test_same_block_reverse_visibility() {
        let (_dir, store) = temp_store();
        let mut view = NameView::new();

        let nh = view.ensure_auction(&store, b"alice", 10).unwrap().name_hash;
        let bid = outpoint(0x01, 0);
        view.add_bid(&nh, &bid).unwrap();

        // Visible through the overlay without any store record.
        let found = view.get_auction_for(&store, &bid).unwrap().unwrap();
        assert_eq!(found.name_hash, nh);

        view.remove_bid(&nh, &bid).unwrap();
        assert!(view.get_auction_for(&store, &bid).unwrap().is_none());
    }

    #[test]
    fn test_overlay_removal_shadows_store() {
        let (_dir, store) = temp_store();
        let nh = hash_name(b"alice");
        let bid = outpoint(0x01, 0);

        let a = Auction::new(b"alice".to_vec(), 10);
        let wb = store.begin_write().unwrap();
        wb.put_auction(&nh, &a.serialize()).unwrap();
        wb.put_reverse(&bid, &nh).unwrap();
        wb.commit().unwrap();

        let mut view = NameView::new();
        // Store record resolves.
        assert!(view.get_auction_for(&store, &bid).unwrap().is_some());
        // After a block-local removal it must not.
        view.auction_mut(&nh).unwrap().bids = 1;
        view.remove_bid(&nh, &bid).unwrap();
        assert!(view.get_auction_for(&store, &bid).unwrap().is_none());
    }

    #[test]
    fn test_commit_replays_ops() {
        let (_dir, store) = temp_store();
        let mut view = NameView::new();
        let mut trie = RecordingTrie::new();

        let nh = view.ensure_auction(&store, b"alice", 10).unwrap().name_hash;
        let bid = outpoint(0x01, 0);
        let reveal = outpoint(0x02, 0);
        view.add_bid(&nh, &bid).unwrap();
        view.remove_bid(&nh, &bid).unwrap();
        view.add_reveal(&nh, &reveal, 1000).unwrap();
        {
            let a = view.auction_mut(&nh).unwrap();
            a.commit(b"v1".to_vec());
            a.save();
        }

        let wb = store.begin_write().unwrap();
        view.commit(&wb, &mut trie).unwrap();
        wb.commit().unwrap();

        // The trie buffered exactly one staged leaf operation.
        assert_eq!(trie.staged, vec![("insert".to_string(), nh)]);

        // Bid added then removed nets out; reveal and auction persist.
        assert_eq!(store.count_bids(&nh).unwrap(), 0);
        assert!(store.get_reverse(&bid).unwrap().is_none());
        assert_eq!(store.get_reveal(&nh, &reveal).unwrap(), Some(1000));
        assert_eq!(store.get_reverse(&reveal).unwrap(), Some(nh));
        let saved = store.get_auction(&nh).unwrap().unwrap();
        assert_eq!(saved.data, Some(b"v1".to_vec()));
        assert!(saved.ops.is_empty());
        // Op log cleared on flush.
        assert!(view.auction_mut(&nh).unwrap().ops.is_empty());
        // Trie saw the commit.
        assert_eq!(trie.leaves.get(&nh), Some(&blake2b256(b"v1")));
    }
}
