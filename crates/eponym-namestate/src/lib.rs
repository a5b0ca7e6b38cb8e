//! Name-auction state engine for the Eponym chain.
//!
//! Drives first-price sealed-bid auctions over human-readable names: one
//! auction per name, mutated by covenant transitions as the validator
//! connects and disconnects blocks, persisted in an ordered KV store, and
//! committed to an authenticated trie whose root every block header pins.
//!
//! The engine owns the transition rules and the persistent layout. It does
//! not parse transactions, verify scripts, or implement the trie; those
//! arrive through the traits in [`engine`] and [`trie`].

use core::fmt;

mod auction;
mod connect;
mod db;
mod disconnect;
mod engine;
pub mod keys;
mod meta;
mod trie;
mod view;
mod winner;

pub use auction::{Auction, AuctionPhase, NameOp};
pub use db::{Store, WriteBatch};
pub use engine::{ChainEntry, ChainView, CoinView, NameEngine};
pub use meta::{StateMeta, CURRENT_SCHEMA_VERSION};
pub use trie::CommitmentTrie;
pub use view::NameView;
pub use winner::pick_winner;

/// Engine failure, split the only way the validator cares about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StateError {
    /// Consensus-invalid transition; the enclosing block is rejected and
    /// never retried.
    Invalid(&'static str),
    /// Invariant violation or storage fault; not a verdict on the block.
    Fatal(String),
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateError::Invalid(code) => write!(f, "{code}"),
            StateError::Fatal(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for StateError {}

impl From<String> for StateError {
    fn from(msg: String) -> Self {
        StateError::Fatal(msg)
    }
}
