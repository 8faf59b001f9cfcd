//! Major-coins filter applied to every fetched batch

use crate::{config::MarketDataConfig, types::Coin};
use std::collections::HashSet;

/// Decides which coins belong in the major coins view
///
/// The denylist always wins. Anything else passes if it is allowlisted or
/// ranked within the top `rank_threshold` by market cap.
#[derive(Debug, Clone)]
pub struct CoinFilter {
    denylist: HashSet<String>,
    allowlist: HashSet<String>,
    rank_threshold: u32,
}

impl CoinFilter {
    pub fn new(denylist: HashSet<String>, allowlist: HashSet<String>, rank_threshold: u32) -> Self {
        Self {
            denylist,
            allowlist,
            rank_threshold,
        }
    }

    pub fn from_config(config: &MarketDataConfig) -> Self {
        Self::new(
            config.denylist.clone(),
            config.allowlist.clone(),
            config.rank_threshold,
        )
    }

    /// Whether a single coin passes
    pub fn allows(&self, coin: &Coin) -> bool {
        if self.denylist.contains(&coin.id) {
            return false;
        }
        self.allowlist.contains(&coin.id) || coin.market_cap_rank <= self.rank_threshold
    }

    /// Keeps the allowed coins, in input order
    pub fn apply(&self, coins: &[Coin]) -> Vec<Coin> {
        coins.iter().filter(|c| self.allows(c)).cloned().collect()
    }
}

impl Default for CoinFilter {
    fn default() -> Self {
        Self::from_config(&MarketDataConfig::default())
    }
}
