//! Per-name auction state and its pending-operation log.
//!
//! An auction is mutated only through the methods below; each mutation that
//! has a durable effect appends one `NameOp`. Nothing touches the KV store
//! or the trie until the view flushes the log in `NameView::commit`, so a
//! rejected block leaves no durable artifact.

use eponym_consensus::{hash_name, Network, TxOutPoint};

use crate::keys::{decode_outpoint, encode_outpoint};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuctionPhase {
    Bidding,
    Reveal,
    Closed,
}

/// One pending state-transition operation. Replayed in order by the view
/// flush; the order within one auction is the order the engine applied the
/// mutations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NameOp {
    AddBid { outpoint: TxOutPoint },
    RemoveBid { outpoint: TxOutPoint },
    AddReveal { outpoint: TxOutPoint, value: u64 },
    RemoveReveal { outpoint: TxOutPoint },
    SetOwner { owner: Option<TxOutPoint> },
    SetNull,
    Commit { data: Vec<u8> },
    Uncommit,
    AddUndo { outpoint: TxOutPoint, blob: Vec<u8> },
    RemoveUndo { outpoint: TxOutPoint },
    AddRenewal { outpoint: TxOutPoint, prior: u32 },
    RemoveRenewal { outpoint: TxOutPoint },
    Save,
    Remove,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Auction {
    pub name_hash: [u8; 32],
    pub name: Vec<u8>,
    pub owner: Option<TxOutPoint>,
    /// Height at which the current auction epoch started.
    pub height: u32,
    /// Height of the last renewal (epoch start until first renewal).
    pub renewal: u32,
    /// Count of currently-recorded bids.
    pub bids: u32,
    /// Record committed to the trie by the latest UPDATE. `None` when no
    /// commitment exists; an empty record is a real commitment.
    pub data: Option<Vec<u8>>,
    /// Transient op log, cleared on flush. Never serialized.
    pub ops: Vec<NameOp>,
}

impl Auction {
    pub fn new(name: Vec<u8>, height: u32) -> Self {
        Self {
            name_hash: hash_name(&name),
            name,
            owner: None,
            height,
            renewal: height,
            bids: 0,
            data: None,
            ops: Vec::new(),
        }
    }

    /// Auction phase at `height`, a pure function of the epoch start and the
    /// chain parameters.
    pub fn state(&self, height: u32, network: &Network) -> AuctionPhase {
        let reveal_start = self.height.saturating_add(network.bidding_period);
        let close_start = reveal_start.saturating_add(network.reveal_period);
        if height < reveal_start {
            AuctionPhase::Bidding
        } else if height < close_start {
            AuctionPhase::Reveal
        } else {
            AuctionPhase::Closed
        }
    }

    pub fn is_expired(&self, height: u32, network: &Network) -> bool {
        height >= self.renewal.saturating_add(network.renewal_window)
    }

    // ── Mutators (each appends exactly one op) ──────────────────────────

    pub fn add_bid(&mut self, outpoint: TxOutPoint) {
        self.bids += 1;
        self.ops.push(NameOp::AddBid { outpoint });
    }

    pub fn remove_bid(&mut self, outpoint: TxOutPoint) -> Result<(), String> {
        self.bids = self
            .bids
            .checked_sub(1)
            .ok_or_else(|| "auction: bid count underflow".to_string())?;
        self.ops.push(NameOp::RemoveBid { outpoint });
        Ok(())
    }

    pub fn add_reveal(&mut self, outpoint: TxOutPoint, value: u64) {
        self.ops.push(NameOp::AddReveal { outpoint, value });
    }

    pub fn remove_reveal(&mut self, outpoint: TxOutPoint) {
        self.ops.push(NameOp::RemoveReveal { outpoint });
    }

    pub fn set_owner(&mut self, owner: TxOutPoint) {
        self.owner = Some(owner);
        self.ops.push(NameOp::SetOwner { owner: Some(owner) });
    }

    pub fn set_null(&mut self) {
        self.owner = None;
        self.ops.push(NameOp::SetNull);
    }

    /// Stage `data` as the name's committed record.
    pub fn commit(&mut self, data: Vec<u8>) {
        self.data = Some(data.clone());
        self.ops.push(NameOp::Commit { data });
    }

    /// Drop the committed record (trie entry removed on flush).
    pub fn uncommit(&mut self) {
        self.data = None;
        self.ops.push(NameOp::Uncommit);
    }

    /// Snapshot the current state under `outpoint` so a disconnect can
    /// restore it. The blob is captured now, before any further mutation.
    pub fn add_undo(&mut self, outpoint: TxOutPoint) {
        let blob = self.serialize();
        self.ops.push(NameOp::AddUndo { outpoint, blob });
    }

    pub fn remove_undo(&mut self, outpoint: TxOutPoint) {
        self.ops.push(NameOp::RemoveUndo { outpoint });
    }

    pub fn add_renewal(&mut self, outpoint: TxOutPoint, prior: u32) {
        self.ops.push(NameOp::AddRenewal { outpoint, prior });
    }

    pub fn remove_renewal(&mut self, outpoint: TxOutPoint) {
        self.ops.push(NameOp::RemoveRenewal { outpoint });
    }

    pub fn save(&mut self) {
        self.ops.push(NameOp::Save);
    }

    pub fn remove(&mut self) {
        self.ops.push(NameOp::Remove);
    }

    /// Replace this auction's fields with a previously-serialized snapshot.
    /// The op log is preserved; the snapshot must belong to the same name.
    pub fn restore(&mut self, blob: &[u8]) -> Result<(), String> {
        let prior = Auction::deserialize(blob)?;
        if prior.name_hash != self.name_hash {
            return Err("auction undo: name hash mismatch".into());
        }
        self.name = prior.name;
        self.owner = prior.owner;
        self.height = prior.height;
        self.renewal = prior.renewal;
        self.bids = prior.bids;
        self.data = prior.data;
        Ok(())
    }

    // ── Blob codec ──────────────────────────────────────────────────────
    //
    // name_len[1] || name || owner_flag[1] (|| txid[32] || vout[4]) ||
    // height[4] || renewal[4] || bids[4] || data_flag[1] (|| data_len[2] || data)

    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(56 + self.name.len());
        buf.push(self.name.len() as u8);
        buf.extend_from_slice(&self.name);
        match &self.owner {
            Some(outpoint) => {
                buf.push(1);
                buf.extend_from_slice(&encode_outpoint(outpoint));
            }
            None => buf.push(0),
        }
        buf.extend_from_slice(&self.height.to_le_bytes());
        buf.extend_from_slice(&self.renewal.to_le_bytes());
        buf.extend_from_slice(&self.bids.to_le_bytes());
        match &self.data {
            Some(record) => {
                buf.push(1);
                buf.extend_from_slice(&(record.len() as u16).to_le_bytes());
                buf.extend_from_slice(record);
            }
            None => buf.push(0),
        }
        buf
    }

    pub fn deserialize(data: &[u8]) -> Result<Self, String> {
        fn take<'a>(data: &'a [u8], offset: &mut usize, len: usize) -> Result<&'a [u8], String> {
            if *offset + len > data.len() {
                return Err("auction blob: truncated".into());
            }
            let out = &data[*offset..*offset + len];
            *offset += len;
            Ok(out)
        }

        let mut offset = 0usize;

        let name_len = take(data, &mut offset, 1)?[0] as usize;
        let name = take(data, &mut offset, name_len)?.to_vec();

        let owner = match take(data, &mut offset, 1)?[0] {
            0 => None,
            1 => Some(decode_outpoint(take(data, &mut offset, 36)?)?),
            other => return Err(format!("auction blob: bad owner flag {other}")),
        };

        let height = u32::from_le_bytes(take(data, &mut offset, 4)?.try_into().unwrap());
        let renewal = u32::from_le_bytes(take(data, &mut offset, 4)?.try_into().unwrap());
        let bids = u32::from_le_bytes(take(data, &mut offset, 4)?.try_into().unwrap());

        let record = match take(data, &mut offset, 1)?[0] {
            0 => None,
            1 => {
                let data_len =
                    u16::from_le_bytes(take(data, &mut offset, 2)?.try_into().unwrap()) as usize;
                Some(take(data, &mut offset, data_len)?.to_vec())
            }
            other => return Err(format!("auction blob: bad data flag {other}")),
        };

        if offset != data.len() {
            return Err(format!(
                "auction blob: {} trailing bytes",
                data.len() - offset
            ));
        }

        Ok(Self {
            name_hash: hash_name(&name),
            name,
            owner,
            height,
            renewal,
            bids,
            data: record,
            ops: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outpoint(fill: u8, vout: u32) -> TxOutPoint {
        TxOutPoint::new([fill; 32], vout)
    }

    #[test]
    fn test_blob_roundtrip() {
        let mut a = Auction::new(b"alice".to_vec(), 100);
        a.owner = Some(outpoint(0x33, 1));
        a.renewal = 140;
        a.bids = 3;
        a.data = Some(b"v1".to_vec());

        let blob = a.serialize();
        let b = Auction::deserialize(&blob).unwrap();
        assert_eq!(a, b);
        assert_eq!(b.name_hash, hash_name(b"alice"));
    }

    #[test]
    fn test_blob_roundtrip_null_owner() {
        let a = Auction::new(b"x0-y1".to_vec(), 0);
        let b = Auction::deserialize(&a.serialize()).unwrap();
        assert_eq!(a, b);
        assert!(b.owner.is_none());
        assert!(b.data.is_none());
    }

    #[test]
    fn test_blob_distinguishes_empty_record_from_none() {
        let mut a = Auction::new(b"alice".to_vec(), 100);
        a.data = Some(Vec::new());
        let b = Auction::deserialize(&a.serialize()).unwrap();
        assert_eq!(b.data, Some(Vec::new()));
        a.data = None;
        let c = Auction::deserialize(&a.serialize()).unwrap();
        assert_eq!(c.data, None);
    }

    #[test]
    fn test_blob_rejects_malformed() {
        assert!(Auction::deserialize(&[]).is_err());
        let mut blob = Auction::new(b"alice".to_vec(), 5).serialize();
        blob.push(0); // trailing byte
        assert!(Auction::deserialize(&blob).is_err());
        let blob = Auction::new(b"alice".to_vec(), 5).serialize();
        assert!(Auction::deserialize(&blob[..blob.len() - 1]).is_err());
    }

    #[test]
    fn test_phase_windows() {
        let net = Network::regtest();
        let a = Auction::new(b"alice".to_vec(), 100);
        assert_eq!(a.state(100, &net), AuctionPhase::Bidding);
        assert_eq!(a.state(104, &net), AuctionPhase::Bidding);
        assert_eq!(a.state(105, &net), AuctionPhase::Reveal);
        assert_eq!(a.state(114, &net), AuctionPhase::Reveal);
        assert_eq!(a.state(115, &net), AuctionPhase::Closed);
        assert_eq!(a.state(u32::MAX, &net), AuctionPhase::Closed);
    }

    #[test]
    fn test_expiry_boundary() {
        let net = Network::regtest();
        let a = Auction::new(b"alice".to_vec(), 100);
        assert!(!a.is_expired(100 + net.renewal_window - 1, &net));
        assert!(a.is_expired(100 + net.renewal_window, &net));
    }

    #[test]
    fn test_ops_accumulate_in_order() {
        let mut a = Auction::new(b"alice".to_vec(), 0);
        a.add_bid(outpoint(0x01, 0));
        a.remove_bid(outpoint(0x01, 0)).unwrap();
        a.add_reveal(outpoint(0x02, 0), 1000);
        a.save();
        assert_eq!(a.bids, 0);
        assert_eq!(a.ops.len(), 4);
        assert!(matches!(a.ops[0], NameOp::AddBid { .. }));
        assert!(matches!(a.ops[3], NameOp::Save));
    }

    #[test]
    fn test_remove_bid_underflow_is_error() {
        let mut a = Auction::new(b"alice".to_vec(), 0);
        assert!(a.remove_bid(outpoint(0x01, 0)).is_err());
    }

    #[test]
    fn test_undo_snapshot_captures_state_at_append() {
        let mut a = Auction::new(b"alice".to_vec(), 10);
        a.owner = Some(outpoint(0x05, 0));
        a.data = Some(b"old".to_vec());
        a.add_undo(TxOutPoint::synthetic([0x09; 32], 0));
        // Mutate after the snapshot.
        a.set_null();
        a.uncommit();

        let NameOp::AddUndo { blob, .. } = &a.ops[0] else {
            panic!("expected AddUndo");
        };
        let snap = Auction::deserialize(blob).unwrap();
        assert_eq!(snap.owner, Some(outpoint(0x05, 0)));
        assert_eq!(snap.data, Some(b"old".to_vec()));
    }

    #[test]
    fn test_restore_checks_name() {
        let mut a = Auction::new(b"alice".to_vec(), 10);
        let other = Auction::new(b"bob".to_vec(), 10);
        assert!(a.restore(&other.serialize()).is_err());
        let snap = Auction::new(b"alice".to_vec(), 4).serialize();
        a.restore(&snap).unwrap();
        assert_eq!(a.height, 4);
    }
}
