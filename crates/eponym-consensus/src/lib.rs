//! Eponym consensus library: covenant types, name rules, chain parameters.
//!
//! Only consensus-domain definitions live here. Auction state transitions
//! and persistence are implemented by `eponym-namestate`; P2P, wallet and
//! script policy MUST NOT be implemented in this crate.

mod covenant;
mod hash;
mod name;
mod network;

pub use covenant::{
    covenant_decode, covenant_encode, Covenant, COVENANT_BID, COVENANT_NONE, COVENANT_REDEEM,
    COVENANT_RELEASE, COVENANT_REVEAL, COVENANT_TRANSFER, COVENANT_UPDATE,
};
pub use hash::blake2b256;
pub use name::{hash_name, is_name_valid};
pub use network::{Network, NetworkType};

pub const CONSENSUS_REVISION: &str = "v1";

/// Longest accepted name, in bytes.
pub const MAX_NAME_SIZE: usize = 63;
/// Largest record payload an UPDATE covenant may commit.
pub const MAX_RECORD_SIZE: usize = 512;
/// Weekly rollout slots derived from the first name-hash byte.
pub const ROLLOUT_SLOTS: u32 = 52;

// Covenant transition failures (block rejected, never retried).
pub const NAME_ERR_TRANSITION_INVALID: &str = "NAME_ERR_TRANSITION_INVALID";
pub const NAME_ERR_PHASE_INVALID: &str = "NAME_ERR_PHASE_INVALID";
pub const NAME_ERR_OUTPUT_MISSING: &str = "NAME_ERR_OUTPUT_MISSING";
pub const NAME_ERR_NOT_WINNER: &str = "NAME_ERR_NOT_WINNER";
pub const NAME_ERR_WINNER_REDEEM: &str = "NAME_ERR_WINNER_REDEEM";
pub const NAME_ERR_NAME_INVALID: &str = "NAME_ERR_NAME_INVALID";
pub const NAME_ERR_ROLLOUT_EARLY: &str = "NAME_ERR_ROLLOUT_EARLY";
pub const NAME_ERR_RECORD_TOO_LARGE: &str = "NAME_ERR_RECORD_TOO_LARGE";
pub const NAME_ERR_RENEWAL_UNKNOWN_BLOCK: &str = "NAME_ERR_RENEWAL_UNKNOWN_BLOCK";
pub const NAME_ERR_RENEWAL_NOT_MAIN: &str = "NAME_ERR_RENEWAL_NOT_MAIN";
pub const NAME_ERR_RENEWAL_IMMATURE: &str = "NAME_ERR_RENEWAL_IMMATURE";
pub const NAME_ERR_RENEWAL_EXPIRED: &str = "NAME_ERR_RENEWAL_EXPIRED";
pub const NAME_ERR_ROOT_MISMATCH: &str = "NAME_ERR_ROOT_MISMATCH";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TxOutPoint {
    pub txid: [u8; 32],
    pub vout: u32,
}

impl TxOutPoint {
    /// High bit of `vout`, reserved for synthetic outpoints keying undo
    /// records. Real outputs never set it.
    pub const SYNTHETIC_BIT: u32 = 0x8000_0000;

    pub fn new(txid: [u8; 32], vout: u32) -> Self {
        debug_assert!(vout & Self::SYNTHETIC_BIT == 0, "real vout sets high bit");
        Self { txid, vout }
    }

    /// Synthetic outpoint for the BID output at `index` of `txid`.
    pub fn synthetic(txid: [u8; 32], index: u32) -> Self {
        debug_assert!(index & Self::SYNTHETIC_BIT == 0, "index already synthetic");
        Self {
            txid,
            vout: index | Self::SYNTHETIC_BIT,
        }
    }

    pub fn is_synthetic(&self) -> bool {
        self.vout & Self::SYNTHETIC_BIT != 0
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxInput {
    pub prevout: TxOutPoint,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxOutput {
    pub value: u64,
    pub covenant: Covenant,
}

/// A transaction as seen by the name engine: hash plus covenant-annotated
/// inputs and outputs. Script, witness and fee accounting are validated
/// elsewhere.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tx {
    pub hash: [u8; 32],
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

pub fn compact_size_encode(n: u64) -> Vec<u8> {
    if n < 253 {
        return vec![n as u8];
    }
    if n <= 0xffff {
        let mut out = vec![0xfd];
        out.extend_from_slice(&(n as u16).to_le_bytes());
        return out;
    }
    if n <= 0xffff_ffff {
        let mut out = vec![0xfe];
        out.extend_from_slice(&(n as u32).to_le_bytes());
        return out;
    }
    let mut out = vec![0xff];
    out.extend_from_slice(&n.to_le_bytes());
    out
}

pub fn compact_size_decode(bytes: &[u8]) -> Result<(u64, usize), String> {
    if bytes.is_empty() {
        return Err("compactsize: empty".into());
    }
    let tag = bytes[0];
    if tag < 0xfd {
        return Ok((tag as u64, 1));
    }
    if tag == 0xfd {
        if bytes.len() < 3 {
            return Err("compactsize: truncated u16".into());
        }
        let n = u16::from_le_bytes([bytes[1], bytes[2]]) as u64;
        if n < 253 {
            return Err("compactsize: non-minimal u16".into());
        }
        return Ok((n, 3));
    }
    if tag == 0xfe {
        if bytes.len() < 5 {
            return Err("compactsize: truncated u32".into());
        }
        let n = u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]) as u64;
        if n < 0x1_0000 {
            return Err("compactsize: non-minimal u32".into());
        }
        return Ok((n, 5));
    }
    if bytes.len() < 9 {
        return Err("compactsize: truncated u64".into());
    }
    let n = u64::from_le_bytes([
        bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7], bytes[8],
    ]);
    if n < 0x1_0000_0000 {
        return Err("compactsize: non-minimal u64".into());
    }
    Ok((n, 9))
}

pub fn hex_decode_strict(s: &str) -> Result<Vec<u8>, String> {
    let cleaned: String = s.split_whitespace().collect();
    hex::decode(cleaned).map_err(|e| format!("hex decode error: {e}"))
}
