//! Chain-wide auction parameters per network.
//!
//! All durations are block counts. Mainnet assumes 144 blocks/day: bidding
//! runs five days, reveal ten, names roll out over 52 weekly slots, and a
//! name must be renewed within a year of its epoch start.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetworkType {
    Main,
    Test,
    Regtest,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Network {
    pub net: NetworkType,
    /// Blocks an auction accepts sealed bids.
    pub bidding_period: u32,
    /// Blocks bidders may open their bids after bidding closes.
    pub reveal_period: u32,
    /// Blocks per weekly rollout slot (mainnet gate).
    pub rollout_interval: u32,
    /// Epoch duration before a name becomes re-auctionable.
    pub renewal_window: u32,
    /// Maximum age of a block referenced by a renewal.
    pub renewal_period: u32,
    /// Maturity depth required of a renewal reference.
    pub coinbase_maturity: u32,
}

impl Network {
    pub fn main() -> Self {
        Self {
            net: NetworkType::Main,
            bidding_period: 720,
            reveal_period: 1_440,
            rollout_interval: 1_008,
            renewal_window: 52_560,
            renewal_period: 26_280,
            coinbase_maturity: 100,
        }
    }

    pub fn test() -> Self {
        Self {
            net: NetworkType::Test,
            bidding_period: 50,
            reveal_period: 100,
            rollout_interval: 72,
            renewal_window: 5_000,
            renewal_period: 2_500,
            coinbase_maturity: 10,
        }
    }

    pub fn regtest() -> Self {
        Self {
            net: NetworkType::Regtest,
            bidding_period: 5,
            reveal_period: 10,
            rollout_interval: 2,
            renewal_window: 80,
            renewal_period: 40,
            coinbase_maturity: 2,
        }
    }

    pub fn is_main(&self) -> bool {
        self.net == NetworkType::Main
    }
}
