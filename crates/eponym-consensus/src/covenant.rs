//! Covenant variants and their wire item encoding.
//!
//! A covenant is a typed annotation on a transaction output constraining how
//! it may be spent. On the wire it is a type byte followed by a compact-size
//! item vector; each item is a compact-size length plus raw bytes. Integers
//! are little-endian throughout.

use crate::{compact_size_decode, compact_size_encode, MAX_NAME_SIZE, MAX_RECORD_SIZE};

pub const COVENANT_NONE: u8 = 0;
pub const COVENANT_BID: u8 = 1;
pub const COVENANT_REVEAL: u8 = 2;
pub const COVENANT_REDEEM: u8 = 3;
pub const COVENANT_UPDATE: u8 = 4;
pub const COVENANT_TRANSFER: u8 = 5;
pub const COVENANT_RELEASE: u8 = 6;

/// Exhaustive covenant kinds. Adding a variant must force every transition
/// match in the state engine to be revisited.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Covenant {
    None,
    /// Opens (or joins) an auction for `name`. The name hash is recomputed
    /// by the engine, never trusted from the wire.
    Bid { name: Vec<u8> },
    /// Opens a prior sealed bid; the revealed amount is the output value.
    Reveal { name_hash: [u8; 32] },
    /// Returns a losing reveal to its owner.
    Redeem { name_hash: [u8; 32] },
    /// Commits `data` for the name. `renewal_block` optionally references a
    /// recent main-chain block to push the renewal height forward.
    Update {
        name_hash: [u8; 32],
        data: Vec<u8>,
        renewal_block: Option<[u8; 32]>,
    },
    /// Moves the owning output without recommitting data.
    Transfer { name_hash: [u8; 32] },
    /// Gives the name up, reopening it for auction.
    Release { name_hash: [u8; 32] },
}

impl Covenant {
    pub fn type_byte(&self) -> u8 {
        match self {
            Covenant::None => COVENANT_NONE,
            Covenant::Bid { .. } => COVENANT_BID,
            Covenant::Reveal { .. } => COVENANT_REVEAL,
            Covenant::Redeem { .. } => COVENANT_REDEEM,
            Covenant::Update { .. } => COVENANT_UPDATE,
            Covenant::Transfer { .. } => COVENANT_TRANSFER,
            Covenant::Release { .. } => COVENANT_RELEASE,
        }
    }

    /// Name hash carried by the covenant, if any. BID carries the raw name
    /// instead and hashes through the engine.
    pub fn name_hash(&self) -> Option<&[u8; 32]> {
        match self {
            Covenant::Reveal { name_hash }
            | Covenant::Redeem { name_hash }
            | Covenant::Update { name_hash, .. }
            | Covenant::Transfer { name_hash }
            | Covenant::Release { name_hash } => Some(name_hash),
            Covenant::None | Covenant::Bid { .. } => None,
        }
    }

    pub fn is_name_covenant(&self) -> bool {
        !matches!(self, Covenant::None)
    }
}

fn push_item(buf: &mut Vec<u8>, item: &[u8]) {
    buf.extend_from_slice(&compact_size_encode(item.len() as u64));
    buf.extend_from_slice(item);
}

pub fn covenant_encode(cov: &Covenant) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.push(cov.type_byte());
    match cov {
        Covenant::None => {
            buf.extend_from_slice(&compact_size_encode(0));
        }
        Covenant::Bid { name } => {
            buf.extend_from_slice(&compact_size_encode(1));
            push_item(&mut buf, name);
        }
        Covenant::Reveal { name_hash }
        | Covenant::Redeem { name_hash }
        | Covenant::Transfer { name_hash }
        | Covenant::Release { name_hash } => {
            buf.extend_from_slice(&compact_size_encode(1));
            push_item(&mut buf, name_hash);
        }
        Covenant::Update {
            name_hash,
            data,
            renewal_block,
        } => {
            let items = if renewal_block.is_some() { 3 } else { 2 };
            buf.extend_from_slice(&compact_size_encode(items));
            push_item(&mut buf, name_hash);
            push_item(&mut buf, data);
            if let Some(block) = renewal_block {
                push_item(&mut buf, block);
            }
        }
    }
    buf
}

fn read_item<'a>(data: &'a [u8], offset: &mut usize) -> Result<&'a [u8], String> {
    let (len, used) =
        compact_size_decode(&data[*offset..]).map_err(|e| format!("covenant item len: {e}"))?;
    *offset += used;
    let len = len as usize;
    if *offset + len > data.len() {
        return Err("covenant: truncated item".into());
    }
    let item = &data[*offset..*offset + len];
    *offset += len;
    Ok(item)
}

fn item_to_hash(item: &[u8]) -> Result<[u8; 32], String> {
    if item.len() != 32 {
        return Err(format!("covenant: expected 32-byte hash, got {}", item.len()));
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(item);
    Ok(out)
}

/// Decode one covenant from `data`, returning it with the byte count
/// consumed. Item shapes are enforced per type.
pub fn covenant_decode(data: &[u8]) -> Result<(Covenant, usize), String> {
    if data.is_empty() {
        return Err("covenant: empty".into());
    }
    let type_byte = data[0];
    let mut offset = 1;

    let (count, used) =
        compact_size_decode(&data[offset..]).map_err(|e| format!("covenant item count: {e}"))?;
    offset += used;

    let expect = |want: u64| -> Result<(), String> {
        if count == want {
            Ok(())
        } else {
            Err(format!(
                "covenant type {type_byte}: expected {want} items, got {count}"
            ))
        }
    };

    let cov = match type_byte {
        COVENANT_NONE => {
            expect(0)?;
            Covenant::None
        }
        COVENANT_BID => {
            expect(1)?;
            let name = read_item(data, &mut offset)?;
            if name.is_empty() || name.len() > MAX_NAME_SIZE {
                return Err(format!("covenant BID: bad name length {}", name.len()));
            }
            Covenant::Bid {
                name: name.to_vec(),
            }
        }
        COVENANT_REVEAL => {
            expect(1)?;
            let name_hash = item_to_hash(read_item(data, &mut offset)?)?;
            Covenant::Reveal { name_hash }
        }
        COVENANT_REDEEM => {
            expect(1)?;
            let name_hash = item_to_hash(read_item(data, &mut offset)?)?;
            Covenant::Redeem { name_hash }
        }
        COVENANT_UPDATE => {
            if count != 2 && count != 3 {
                return Err(format!("covenant UPDATE: expected 2 or 3 items, got {count}"));
            }
            let name_hash = item_to_hash(read_item(data, &mut offset)?)?;
            let record = read_item(data, &mut offset)?;
            if record.len() > MAX_RECORD_SIZE {
                return Err(format!("covenant UPDATE: record too large ({})", record.len()));
            }
            let renewal_block = if count == 3 {
                Some(item_to_hash(read_item(data, &mut offset)?)?)
            } else {
                None
            };
            Covenant::Update {
                name_hash,
                data: record.to_vec(),
                renewal_block,
            }
        }
        COVENANT_TRANSFER => {
            expect(1)?;
            let name_hash = item_to_hash(read_item(data, &mut offset)?)?;
            Covenant::Transfer { name_hash }
        }
        COVENANT_RELEASE => {
            expect(1)?;
            let name_hash = item_to_hash(read_item(data, &mut offset)?)?;
            Covenant::Release { name_hash }
        }
        other => return Err(format!("covenant: unknown type {other}")),
    };

    Ok((cov, offset))
}
