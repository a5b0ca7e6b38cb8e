//! Canonical byte encoding for the namestate key families.
//!
//! Seven families share one ordered bucket, distinguished by a prefix byte:
//! - `a` `name_hash` → serialized auction
//! - `n` `txid‖vout` → `name_hash` (reverse index)
//! - `b` `name_hash‖txid‖vout` → empty (bid marker)
//! - `r` `name_hash‖txid‖vout` → revealed amount (u64 LE)
//! - `u` `txid‖vout` → serialized auction undo snapshot
//! - `k` `txid‖vout` → prior renewal height (u32 LE)
//! - `s` (singleton) → committed trie root
//!
//! All integers are little-endian. Layouts are deterministic and must not
//! change without a schema migration.

use eponym_consensus::TxOutPoint;

pub const PREFIX_AUCTION: u8 = b'a';
pub const PREFIX_REVERSE: u8 = b'n';
pub const PREFIX_BID: u8 = b'b';
pub const PREFIX_REVEAL: u8 = b'r';
pub const PREFIX_UNDO: u8 = b'u';
pub const PREFIX_RENEWAL: u8 = b'k';
pub const PREFIX_META: u8 = b's';

// ---------------------------------------------------------------------------
// Outpoint: txid[32] || vout_le[4] = 36 bytes
// ---------------------------------------------------------------------------

pub fn encode_outpoint(outpoint: &TxOutPoint) -> [u8; 36] {
    let mut buf = [0u8; 36];
    buf[0..32].copy_from_slice(&outpoint.txid);
    buf[32..36].copy_from_slice(&outpoint.vout.to_le_bytes());
    buf
}

pub fn decode_outpoint(data: &[u8]) -> Result<TxOutPoint, String> {
    if data.len() != 36 {
        return Err(format!("outpoint key: expected 36 bytes, got {}", data.len()));
    }
    let mut txid = [0u8; 32];
    txid.copy_from_slice(&data[0..32]);
    let vout = u32::from_le_bytes(data[32..36].try_into().unwrap());
    Ok(TxOutPoint { txid, vout })
}

// ---------------------------------------------------------------------------
// Key builders
// ---------------------------------------------------------------------------

pub fn auction_key(name_hash: &[u8; 32]) -> [u8; 33] {
    let mut buf = [0u8; 33];
    buf[0] = PREFIX_AUCTION;
    buf[1..33].copy_from_slice(name_hash);
    buf
}

pub fn reverse_key(outpoint: &TxOutPoint) -> [u8; 37] {
    let mut buf = [0u8; 37];
    buf[0] = PREFIX_REVERSE;
    buf[1..37].copy_from_slice(&encode_outpoint(outpoint));
    buf
}

fn indexed_key(prefix: u8, name_hash: &[u8; 32], outpoint: &TxOutPoint) -> [u8; 69] {
    let mut buf = [0u8; 69];
    buf[0] = prefix;
    buf[1..33].copy_from_slice(name_hash);
    buf[33..69].copy_from_slice(&encode_outpoint(outpoint));
    buf
}

pub fn bid_key(name_hash: &[u8; 32], outpoint: &TxOutPoint) -> [u8; 69] {
    indexed_key(PREFIX_BID, name_hash, outpoint)
}

pub fn reveal_key(name_hash: &[u8; 32], outpoint: &TxOutPoint) -> [u8; 69] {
    indexed_key(PREFIX_REVEAL, name_hash, outpoint)
}

pub fn undo_key(outpoint: &TxOutPoint) -> [u8; 37] {
    let mut buf = [0u8; 37];
    buf[0] = PREFIX_UNDO;
    buf[1..37].copy_from_slice(&encode_outpoint(outpoint));
    buf
}

pub fn renewal_key(outpoint: &TxOutPoint) -> [u8; 37] {
    let mut buf = [0u8; 37];
    buf[0] = PREFIX_RENEWAL;
    buf[1..37].copy_from_slice(&encode_outpoint(outpoint));
    buf
}

pub fn root_key() -> [u8; 1] {
    [PREFIX_META]
}

/// Inclusive scan bounds covering every record of `prefix` under one name.
fn prefix_bounds(prefix: u8, name_hash: &[u8; 32]) -> ([u8; 69], [u8; 69]) {
    let mut lo = [0u8; 69];
    lo[0] = prefix;
    lo[1..33].copy_from_slice(name_hash);
    let mut hi = [0xffu8; 69];
    hi[0] = prefix;
    hi[1..33].copy_from_slice(name_hash);
    (lo, hi)
}

pub fn bid_bounds(name_hash: &[u8; 32]) -> ([u8; 69], [u8; 69]) {
    prefix_bounds(PREFIX_BID, name_hash)
}

pub fn reveal_bounds(name_hash: &[u8; 32]) -> ([u8; 69], [u8; 69]) {
    prefix_bounds(PREFIX_REVEAL, name_hash)
}

/// Recover the outpoint from a `b`/`r` family key.
pub fn outpoint_from_indexed_key(key: &[u8]) -> Result<TxOutPoint, String> {
    if key.len() != 69 {
        return Err(format!("indexed key: expected 69 bytes, got {}", key.len()));
    }
    decode_outpoint(&key[33..69])
}
