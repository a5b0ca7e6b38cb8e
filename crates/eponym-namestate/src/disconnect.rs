//! Inverse covenant transitions for one transaction.
//!
//! Strict mirror of the connect path: outputs are processed before inputs,
//! each list in reverse index order, so nested transitions unwind in the
//! opposite order they were applied. Reveal values are recovered from the
//! coin view, which restores consumed coins during a reorg; anything the
//! coin view cannot supply, or any transition that could never have
//! connected, is an invariant violation rather than a block verdict.

use log::trace;

use eponym_consensus::{hash_name, Covenant, Tx, TxOutPoint};

use crate::engine::{CoinView, NameEngine};
use crate::trie::CommitmentTrie;
use crate::view::NameView;
use crate::StateError;

impl<T: CommitmentTrie> NameEngine<T> {
    /// Revert every covenant transition of `tx`, which connected at
    /// `height`.
    pub fn disconnect_covenants(
        &self,
        tx: &Tx,
        height: u32,
        view: &mut NameView,
        coins: &dyn CoinView,
    ) -> Result<(), StateError> {
        trace!(
            "disconnect tx {} from height {height}",
            hex::encode(tx.hash)
        );

        for i in (0..tx.outputs.len()).rev() {
            if let Covenant::Bid { name } = &tx.outputs[i].covenant {
                self.disconnect_bid_output(tx, i as u32, name, view)?;
            }
        }

        for i in (0..tx.inputs.len()).rev() {
            let prevout = tx.inputs[i].prevout;
            let spent = coins.get_output(&prevout)?.ok_or_else(|| {
                StateError::Fatal(format!(
                    "disconnect: missing coin for {}:{}",
                    hex::encode(prevout.txid),
                    prevout.vout
                ))
            })?;
            let output = tx.outputs.get(i);
            let outpoint = TxOutPoint::new(tx.hash, i as u32);

            match &spent.covenant {
                Covenant::None => continue,
                Covenant::Bid { .. } => {
                    // Invert BID → REVEAL: the reveal at our own index
                    // becomes the sealed bid again.
                    let nh = {
                        let auction =
                            view.get_auction_for(&self.store, &outpoint)?.ok_or_else(|| {
                                StateError::Fatal(
                                    "disconnect: reveal without auction".to_string(),
                                )
                            })?;
                        auction.name_hash
                    };
                    view.remove_reveal(&nh, &outpoint)?;
                    view.add_bid(&nh, &prevout)?;
                    view.save(&nh)?;
                }
                Covenant::Reveal {
                    name_hash: prior_nh,
                } => {
                    self.require_loaded(view, prior_nh)?;
                    let nh = *prior_nh;
                    match output.map(|o| &o.covenant) {
                        Some(Covenant::Redeem { .. }) => {}
                        Some(Covenant::Update { .. }) => {
                            let auction = view.auction_mut(&nh)?;
                            auction.set_null();
                            auction.renewal = auction.height;
                            auction.uncommit();
                        }
                        Some(Covenant::Transfer { .. }) => {
                            let auction = view.auction_mut(&nh)?;
                            auction.set_null();
                            auction.renewal = auction.height;
                        }
                        Some(Covenant::Release { .. }) => {
                            self.restore_undo(&prevout, &nh, view)?;
                        }
                        _ => {
                            return Err(StateError::Fatal(
                                "disconnect: reveal spent without a table row".to_string(),
                            ))
                        }
                    }
                    // The consumed reveal re-materializes with the restored
                    // coin's value.
                    view.add_reveal(&nh, &prevout, spent.value)?;
                    view.save(&nh)?;
                }
                Covenant::Update {
                    name_hash: prior_nh,
                    data: prior_data,
                    ..
                } => {
                    self.require_loaded(view, prior_nh)?;
                    let nh = *prior_nh;
                    match output.map(|o| &o.covenant) {
                        Some(Covenant::Update { renewal_block, .. }) => {
                            let restored_renewal = if renewal_block.is_some() {
                                Some(self.store.get_renewal_undo(&prevout)?.ok_or_else(|| {
                                    StateError::Fatal(
                                        "disconnect: missing renewal undo".to_string(),
                                    )
                                })?)
                            } else {
                                None
                            };
                            let auction = view.auction_mut(&nh)?;
                            auction.set_owner(prevout);
                            auction.commit(prior_data.clone());
                            if let Some(renewal) = restored_renewal {
                                auction.renewal = renewal;
                                auction.remove_renewal(prevout);
                            }
                            auction.save();
                        }
                        // UPDATE → TRANSFER connected as a no-op.
                        Some(Covenant::Transfer { .. }) => {}
                        Some(Covenant::Release { .. }) => {
                            self.restore_undo(&prevout, &nh, view)?;
                            view.save(&nh)?;
                        }
                        _ => {
                            return Err(StateError::Fatal(
                                "disconnect: update spent without a table row".to_string(),
                            ))
                        }
                    }
                }
                Covenant::Transfer {
                    name_hash: prior_nh,
                } => {
                    self.require_loaded(view, prior_nh)?;
                    let nh = *prior_nh;
                    match output.map(|o| &o.covenant) {
                        Some(Covenant::Update { .. }) => {
                            // Before TRANSFER → UPDATE the transfer output
                            // owned the name with nothing committed.
                            let auction = view.auction_mut(&nh)?;
                            auction.set_owner(prevout);
                            auction.uncommit();
                            auction.save();
                        }
                        Some(Covenant::Release { .. }) => {
                            self.restore_undo(&prevout, &nh, view)?;
                            view.save(&nh)?;
                        }
                        _ => {
                            return Err(StateError::Fatal(
                                "disconnect: transfer spent without a table row".to_string(),
                            ))
                        }
                    }
                }
                Covenant::Redeem { .. } | Covenant::Release { .. } => {
                    return Err(StateError::Fatal(
                        "disconnect: unspendable covenant was spent".to_string(),
                    ))
                }
            }
        }

        Ok(())
    }

    /// Invert a BID output: drop the bid, and when the auction empties,
    /// either restore the pre-reopen snapshot or delete the auction
    /// entirely.
    fn disconnect_bid_output(
        &self,
        tx: &Tx,
        index: u32,
        name: &[u8],
        view: &mut NameView,
    ) -> Result<(), StateError> {
        let nh = hash_name(name);
        if view.get_auction(&self.store, &nh)?.is_none() {
            return Err(StateError::Fatal(format!(
                "disconnect: no auction for name {}",
                String::from_utf8_lossy(name)
            )));
        }

        view.remove_bid(&nh, &TxOutPoint::new(tx.hash, index))?;

        if view.auction_mut(&nh)?.bids > 0 {
            view.save(&nh)?;
            return Ok(());
        }

        let synthetic = TxOutPoint::synthetic(tx.hash, index);
        match self.store.get_undo(&synthetic)? {
            Some(blob) => {
                // This bid reopened an expired name; bring the old epoch
                // back, trie commitment included.
                let auction = view.auction_mut(&nh)?;
                auction.restore(&blob)?;
                auction.remove_undo(synthetic);
                if let Some(record) = auction.data.clone() {
                    auction.commit(record);
                }
                auction.save();
            }
            None => {
                view.auction_mut(&nh)?.remove();
            }
        }
        Ok(())
    }

    /// Load the auction for `name_hash` into the view, failing fatally when
    /// it does not exist.
    fn require_loaded(&self, view: &mut NameView, name_hash: &[u8; 32]) -> Result<(), StateError> {
        view.get_auction(&self.store, name_hash)?
            .map(|_| ())
            .ok_or_else(|| StateError::Fatal("disconnect: auction missing".to_string()))
    }

    /// Consume the undo record under `prevout`, restoring the snapshot and
    /// its trie commitment.
    fn restore_undo(
        &self,
        prevout: &TxOutPoint,
        name_hash: &[u8; 32],
        view: &mut NameView,
    ) -> Result<(), StateError> {
        let blob = self.store.get_undo(prevout)?.ok_or_else(|| {
            StateError::Fatal(format!(
                "disconnect: missing undo for {}:{}",
                hex::encode(prevout.txid),
                prevout.vout
            ))
        })?;
        let auction = view.auction_mut(name_hash)?;
        auction.restore(&blob)?;
        auction.remove_undo(*prevout);
        if let Some(record) = auction.data.clone() {
            auction.commit(record);
        }
        Ok(())
    }
}
