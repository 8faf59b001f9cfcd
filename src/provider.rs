//! Provider abstraction for fetching ranked market data from external APIs

use crate::{
    error::ProviderError,
    types::{Coin, CoinDetail, MarketChart},
};
use async_trait::async_trait;

/// Trait for market data providers
///
/// Implementations return coins ordered by descending market cap, with 24h
/// change and 7-day sparkline where the source has them.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Fetches the top `limit` coins by market cap
    ///
    /// # Arguments
    /// * `limit` - Number of coins to request
    ///
    /// # Returns
    /// At most `limit` coins, unfiltered, or an error if the fetch fails
    async fn fetch_markets(&self, limit: usize) -> Result<Vec<Coin>, ProviderError> {
        self.fetch_markets_page(limit, 1).await
    }

    /// Fetches page `page` (starting at 1) of the market list, `per_page`
    /// coins per page
    async fn fetch_markets_page(&self, per_page: usize, page: u32) -> Result<Vec<Coin>, ProviderError>;

    /// Fetches extended information about the coin `id`
    async fn fetch_coin_detail(&self, id: &str) -> Result<CoinDetail, ProviderError>;

    /// Fetches `days` of USD price, market cap and volume history for `id`
    async fn fetch_market_chart(&self, id: &str, days: u32) -> Result<MarketChart, ProviderError>;

    /// Returns the name of this provider
    fn provider_name(&self) -> &'static str;
}
