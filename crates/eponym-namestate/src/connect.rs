//! Forward covenant transitions for one transaction.
//!
//! Inputs pair with the output at the same index; the (prior covenant,
//! output covenant) pair selects a row of the transition table. Any pair
//! outside the table rejects the block. BID outputs are handled after the
//! inputs, in natural index order. All mutations land in the view's op
//! logs; nothing is durable until the block-level flush.

use log::debug;

use eponym_consensus::{
    hash_name, is_name_valid, Covenant, Tx, TxOutPoint, TxOutput, MAX_RECORD_SIZE,
    NAME_ERR_NAME_INVALID,
    NAME_ERR_NOT_WINNER, NAME_ERR_OUTPUT_MISSING, NAME_ERR_PHASE_INVALID,
    NAME_ERR_RECORD_TOO_LARGE, NAME_ERR_RENEWAL_EXPIRED, NAME_ERR_RENEWAL_IMMATURE,
    NAME_ERR_RENEWAL_NOT_MAIN, NAME_ERR_RENEWAL_UNKNOWN_BLOCK, NAME_ERR_ROLLOUT_EARLY,
    NAME_ERR_TRANSITION_INVALID, NAME_ERR_WINNER_REDEEM, ROLLOUT_SLOTS,
};

use crate::auction::AuctionPhase;
use crate::engine::{ChainView, CoinView, NameEngine};
use crate::trie::CommitmentTrie;
use crate::view::NameView;
use crate::winner::pick_winner;
use crate::StateError;

impl<T: CommitmentTrie> NameEngine<T> {
    /// Apply every covenant transition of `tx` at `height`. An `Invalid`
    /// error means the enclosing block must be rejected; `Fatal` means an
    /// invariant or storage failure.
    pub fn connect_covenants(
        &self,
        tx: &Tx,
        height: u32,
        view: &mut NameView,
        coins: &dyn CoinView,
        chain: &dyn ChainView,
    ) -> Result<(), StateError> {
        for (i, input) in tx.inputs.iter().enumerate() {
            let prevout = input.prevout;
            let spent = coins.get_output(&prevout)?.ok_or_else(|| {
                StateError::Fatal(format!(
                    "connect: missing coin for {}:{}",
                    hex::encode(prevout.txid),
                    prevout.vout
                ))
            })?;
            let output = tx.outputs.get(i);
            let outpoint = TxOutPoint::new(tx.hash, i as u32);

            match &spent.covenant {
                Covenant::None => continue,
                Covenant::Bid { .. } => {
                    self.connect_reveal(&prevout, output, outpoint, height, view)?
                }
                Covenant::Reveal {
                    name_hash: prior_nh,
                } => self.connect_from_reveal(&prevout, prior_nh, output, outpoint, height, view)?,
                Covenant::Update {
                    name_hash: prior_nh,
                    ..
                } => self.connect_from_update(
                    &prevout, prior_nh, output, outpoint, height, view, chain,
                )?,
                Covenant::Transfer {
                    name_hash: prior_nh,
                } => self.connect_from_transfer(&prevout, prior_nh, output, outpoint, height, view)?,
                Covenant::Redeem { .. } | Covenant::Release { .. } => {
                    return Err(StateError::Invalid(NAME_ERR_TRANSITION_INVALID))
                }
            }
        }

        for (i, out) in tx.outputs.iter().enumerate() {
            if let Covenant::Bid { name } = &out.covenant {
                self.connect_bid_output(tx, i as u32, name, height, view)?;
            }
        }

        Ok(())
    }

    /// BID → REVEAL. Legal through the end of the reveal period.
    fn connect_reveal(
        &self,
        prevout: &TxOutPoint,
        output: Option<&TxOutput>,
        outpoint: TxOutPoint,
        height: u32,
        view: &mut NameView,
    ) -> Result<(), StateError> {
        let out = output.ok_or(StateError::Invalid(NAME_ERR_OUTPUT_MISSING))?;
        let Covenant::Reveal { name_hash: out_nh } = &out.covenant else {
            return Err(StateError::Invalid(NAME_ERR_TRANSITION_INVALID));
        };

        let (nh, phase) = {
            let auction = view
                .get_auction_for(&self.store, prevout)?
                .ok_or_else(|| StateError::Fatal("connect: bid without auction".to_string()))?;
            (auction.name_hash, auction.state(height, &self.network))
        };
        if nh != *out_nh {
            return Err(StateError::Invalid(NAME_ERR_TRANSITION_INVALID));
        }
        if phase == AuctionPhase::Closed {
            return Err(StateError::Invalid(NAME_ERR_PHASE_INVALID));
        }

        view.remove_bid(&nh, prevout)?;
        view.add_reveal(&nh, &outpoint, out.value)?;
        view.save(&nh)?;
        Ok(())
    }

    /// REVEAL → {REDEEM, UPDATE, TRANSFER, RELEASE}, all CLOSED-phase.
    fn connect_from_reveal(
        &self,
        prevout: &TxOutPoint,
        prior_nh: &[u8; 32],
        output: Option<&TxOutput>,
        outpoint: TxOutPoint,
        height: u32,
        view: &mut NameView,
    ) -> Result<(), StateError> {
        let out = output.ok_or(StateError::Invalid(NAME_ERR_TRANSITION_INVALID))?;

        let (nh, phase, owner) = {
            let auction = view
                .get_auction_for(&self.store, prevout)?
                .ok_or_else(|| StateError::Fatal("connect: reveal without auction".to_string()))?;
            (
                auction.name_hash,
                auction.state(height, &self.network),
                auction.owner,
            )
        };
        if nh != *prior_nh {
            return Err(StateError::Invalid(NAME_ERR_TRANSITION_INVALID));
        }
        if phase != AuctionPhase::Closed {
            return Err(StateError::Invalid(NAME_ERR_PHASE_INVALID));
        }

        // The current owner wins outright; otherwise scan the reveal set.
        let winner = match owner {
            Some(owner) => Some(owner),
            None => pick_winner(&self.store, &nh)?,
        };

        match &out.covenant {
            Covenant::Redeem { name_hash } => {
                if *name_hash != nh {
                    return Err(StateError::Invalid(NAME_ERR_TRANSITION_INVALID));
                }
                if winner == Some(*prevout) {
                    return Err(StateError::Invalid(NAME_ERR_WINNER_REDEEM));
                }
                view.remove_reveal(&nh, prevout)?;
                view.save(&nh)?;
            }
            Covenant::Update {
                name_hash,
                data,
                renewal_block,
            } => {
                if *name_hash != nh || renewal_block.is_some() {
                    return Err(StateError::Invalid(NAME_ERR_TRANSITION_INVALID));
                }
                if data.len() > MAX_RECORD_SIZE {
                    return Err(StateError::Invalid(NAME_ERR_RECORD_TOO_LARGE));
                }
                if winner != Some(*prevout) {
                    return Err(StateError::Invalid(NAME_ERR_NOT_WINNER));
                }
                view.remove_reveal(&nh, prevout)?;
                let auction = view.auction_mut(&nh)?;
                auction.set_owner(outpoint);
                auction.renewal = height;
                auction.commit(data.clone());
                auction.save();
            }
            Covenant::Transfer { name_hash } => {
                if *name_hash != nh {
                    return Err(StateError::Invalid(NAME_ERR_TRANSITION_INVALID));
                }
                if winner != Some(*prevout) {
                    return Err(StateError::Invalid(NAME_ERR_NOT_WINNER));
                }
                view.remove_reveal(&nh, prevout)?;
                let auction = view.auction_mut(&nh)?;
                auction.set_owner(outpoint);
                auction.renewal = height;
                auction.save();
            }
            Covenant::Release { name_hash } => {
                if *name_hash != nh {
                    return Err(StateError::Invalid(NAME_ERR_TRANSITION_INVALID));
                }
                if winner != Some(*prevout) {
                    return Err(StateError::Invalid(NAME_ERR_NOT_WINNER));
                }
                view.remove_reveal(&nh, prevout)?;
                let auction = view.auction_mut(&nh)?;
                auction.add_undo(*prevout);
                auction.set_null();
                auction.save();
            }
            _ => return Err(StateError::Invalid(NAME_ERR_TRANSITION_INVALID)),
        }
        Ok(())
    }

    /// UPDATE → {UPDATE, TRANSFER, RELEASE}. The owning output must be the
    /// one being spent. UPDATE → UPDATE mutates and stops; UPDATE →
    /// TRANSFER deliberately changes nothing.
    #[allow(clippy::too_many_arguments)]
    fn connect_from_update(
        &self,
        prevout: &TxOutPoint,
        prior_nh: &[u8; 32],
        output: Option<&TxOutput>,
        outpoint: TxOutPoint,
        height: u32,
        view: &mut NameView,
        chain: &dyn ChainView,
    ) -> Result<(), StateError> {
        let out = output.ok_or(StateError::Invalid(NAME_ERR_TRANSITION_INVALID))?;

        let (nh, phase, owner, prior_renewal) = {
            let auction = view
                .get_auction(&self.store, prior_nh)?
                .ok_or_else(|| StateError::Fatal("connect: update without auction".to_string()))?;
            (
                auction.name_hash,
                auction.state(height, &self.network),
                auction.owner,
                auction.renewal,
            )
        };
        if phase != AuctionPhase::Closed {
            return Err(StateError::Invalid(NAME_ERR_PHASE_INVALID));
        }
        if owner != Some(*prevout) {
            return Err(StateError::Invalid(NAME_ERR_NOT_WINNER));
        }

        match &out.covenant {
            Covenant::Update {
                name_hash,
                data,
                renewal_block,
            } => {
                if *name_hash != nh {
                    return Err(StateError::Invalid(NAME_ERR_TRANSITION_INVALID));
                }
                if data.len() > MAX_RECORD_SIZE {
                    return Err(StateError::Invalid(NAME_ERR_RECORD_TOO_LARGE));
                }
                if let Some(block_hash) = renewal_block {
                    self.check_renewal(block_hash, height, chain)?;
                }
                let auction = view.auction_mut(&nh)?;
                auction.set_owner(outpoint);
                auction.commit(data.clone());
                if renewal_block.is_some() {
                    auction.add_renewal(*prevout, prior_renewal);
                    auction.renewal = height;
                }
                auction.save();
            }
            Covenant::Transfer { name_hash } => {
                if *name_hash != nh {
                    return Err(StateError::Invalid(NAME_ERR_TRANSITION_INVALID));
                }
                // Ownership stays with the spent update output's auction
                // state; the transfer output takes effect only when spent.
            }
            Covenant::Release { name_hash } => {
                if *name_hash != nh {
                    return Err(StateError::Invalid(NAME_ERR_TRANSITION_INVALID));
                }
                let auction = view.auction_mut(&nh)?;
                auction.add_undo(*prevout);
                auction.set_null();
                auction.uncommit();
                auction.save();
            }
            _ => return Err(StateError::Invalid(NAME_ERR_TRANSITION_INVALID)),
        }
        Ok(())
    }

    /// TRANSFER → {UPDATE, RELEASE}.
    fn connect_from_transfer(
        &self,
        prevout: &TxOutPoint,
        prior_nh: &[u8; 32],
        output: Option<&TxOutput>,
        outpoint: TxOutPoint,
        height: u32,
        view: &mut NameView,
    ) -> Result<(), StateError> {
        let out = output.ok_or(StateError::Invalid(NAME_ERR_TRANSITION_INVALID))?;

        let (nh, phase, owner) = {
            let auction = view
                .get_auction(&self.store, prior_nh)?
                .ok_or_else(|| StateError::Fatal("connect: transfer without auction".to_string()))?;
            (
                auction.name_hash,
                auction.state(height, &self.network),
                auction.owner,
            )
        };
        if phase != AuctionPhase::Closed {
            return Err(StateError::Invalid(NAME_ERR_PHASE_INVALID));
        }
        if owner != Some(*prevout) {
            return Err(StateError::Invalid(NAME_ERR_NOT_WINNER));
        }

        match &out.covenant {
            Covenant::Update {
                name_hash,
                data,
                renewal_block,
            } => {
                if *name_hash != nh || renewal_block.is_some() {
                    return Err(StateError::Invalid(NAME_ERR_TRANSITION_INVALID));
                }
                if data.len() > MAX_RECORD_SIZE {
                    return Err(StateError::Invalid(NAME_ERR_RECORD_TOO_LARGE));
                }
                let auction = view.auction_mut(&nh)?;
                auction.set_owner(outpoint);
                auction.commit(data.clone());
                auction.save();
            }
            Covenant::Release { name_hash } => {
                if *name_hash != nh {
                    return Err(StateError::Invalid(NAME_ERR_TRANSITION_INVALID));
                }
                let auction = view.auction_mut(&nh)?;
                auction.add_undo(*prevout);
                auction.set_null();
                auction.uncommit();
                auction.save();
            }
            _ => return Err(StateError::Invalid(NAME_ERR_TRANSITION_INVALID)),
        }
        Ok(())
    }

    /// A BID output: gate, create or reopen the auction, record the bid.
    fn connect_bid_output(
        &self,
        tx: &Tx,
        index: u32,
        name: &[u8],
        height: u32,
        view: &mut NameView,
    ) -> Result<(), StateError> {
        if !is_name_valid(name) {
            return Err(StateError::Invalid(NAME_ERR_NAME_INVALID));
        }
        let nh = hash_name(name);

        // Names become available one weekly slot at a time on mainnet.
        if self.network.is_main() {
            let start = (nh[0] as u32 % ROLLOUT_SLOTS) * self.network.rollout_interval;
            if height < start {
                return Err(StateError::Invalid(NAME_ERR_ROLLOUT_EARLY));
            }
        }

        let expired = {
            let auction = view.ensure_auction(&self.store, name, height)?;
            auction.is_expired(height, &self.network)
        };

        if expired {
            // The old epoch ran out its renewal window: snapshot it under a
            // synthetic outpoint and reopen from scratch.
            debug!("reopening expired name {}", String::from_utf8_lossy(name));
            let auction = view.auction_mut(&nh)?;
            auction.add_undo(TxOutPoint::synthetic(tx.hash, index));
            auction.set_null();
            auction.height = height;
            auction.renewal = height;
            auction.bids = 0;
            auction.uncommit();
        }

        let phase = view.auction_mut(&nh)?.state(height, &self.network);
        if phase != AuctionPhase::Bidding {
            return Err(StateError::Invalid(NAME_ERR_PHASE_INVALID));
        }

        view.add_bid(&nh, &TxOutPoint::new(tx.hash, index))?;
        view.save(&nh)?;
        Ok(())
    }

    /// A renewal reference must be a mature main-chain block no older than
    /// the renewal period.
    fn check_renewal(
        &self,
        block_hash: &[u8; 32],
        height: u32,
        chain: &dyn ChainView,
    ) -> Result<(), StateError> {
        let entry = chain
            .get_entry(block_hash)?
            .ok_or(StateError::Invalid(NAME_ERR_RENEWAL_UNKNOWN_BLOCK))?;
        if !chain.is_main_chain(&entry)? {
            return Err(StateError::Invalid(NAME_ERR_RENEWAL_NOT_MAIN));
        }
        if entry.height > height.saturating_sub(self.network.coinbase_maturity) {
            return Err(StateError::Invalid(NAME_ERR_RENEWAL_IMMATURE));
        }
        if entry.height < height.saturating_sub(self.network.renewal_period) {
            return Err(StateError::Invalid(NAME_ERR_RENEWAL_EXPIRED));
        }
        Ok(())
    }
}
