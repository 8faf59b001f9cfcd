//! Views derived from a coin snapshot

use crate::{constants::MIN_SEARCH_QUERY_LEN, types::Coin};

/// Coins with the largest 24h gains, best first
///
/// The sort is stable, so equal changes keep snapshot (market cap) order.
pub fn top_gainers(coins: &[Coin], count: usize) -> Vec<Coin> {
    let mut sorted = coins.to_vec();
    sorted.sort_by(|a, b| b.change_24h().total_cmp(&a.change_24h()));
    sorted.truncate(count);
    sorted
}

/// Coins with the largest 24h losses, worst first
pub fn top_losers(coins: &[Coin], count: usize) -> Vec<Coin> {
    let mut sorted = coins.to_vec();
    sorted.sort_by(|a, b| a.change_24h().total_cmp(&b.change_24h()));
    sorted.truncate(count);
    sorted
}

/// Case-insensitive match on name or symbol
pub fn search(coins: &[Coin], query: &str) -> Vec<Coin> {
    let query = query.trim();
    if query.chars().count() < MIN_SEARCH_QUERY_LEN {
        return Vec::new();
    }

    let needle = query.to_lowercase();
    coins
        .iter()
        .filter(|c| {
            c.name.to_lowercase().contains(&needle) || c.symbol.to_lowercase().contains(&needle)
        })
        .cloned()
        .collect()
}
