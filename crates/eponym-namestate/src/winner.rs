//! First-price winner selection over revealed bids.

use eponym_consensus::TxOutPoint;

use crate::db::Store;

/// Scan every reveal under `name_hash` and return the outpoint carrying the
/// highest value. Ties break toward the lexicographically later key, which
/// the ascending scan yields for free. Returns `None` when nothing was
/// revealed.
pub fn pick_winner(store: &Store, name_hash: &[u8; 32]) -> Result<Option<TxOutPoint>, String> {
    let mut best: Option<(u64, TxOutPoint)> = None;
    store.iter_reveals(name_hash, |outpoint, value| match best {
        Some((best_value, _)) if value < best_value => {}
        _ => best = Some((value, *outpoint)),
    })?;
    Ok(best.map(|(_, outpoint)| outpoint))
}
