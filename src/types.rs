//! Types for the market data service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Point-in-time market data for a single asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coin {
    /// Stable slug, e.g. `"bitcoin"`
    pub id: String,

    /// Ticker symbol, e.g. `"btc"`
    pub symbol: String,

    /// Display name
    pub name: String,

    /// Logo URL
    pub image: String,

    /// Price in USD
    pub current_price: f64,

    /// 24h price change percentage, `None` when the provider omitted it
    pub price_change_percentage_24h: Option<f64>,

    /// Market capitalization in USD
    pub market_cap: f64,

    /// Position by market cap, starting at 1
    pub market_cap_rank: u32,

    /// 24h trading volume in USD
    pub total_volume: f64,

    /// Recent prices (7 days, oldest first) for trend rendering
    pub sparkline: Option<Vec<f64>>,
}

impl Coin {
    /// The 24h change used for ordering. Missing or NaN values count as 0.
    pub fn change_24h(&self) -> f64 {
        match self.price_change_percentage_24h {
            Some(pct) if !pct.is_nan() => pct,
            _ => 0.0,
        }
    }
}

/// Where the coins in a [`MarketSnapshot`] came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DataFreshness {
    /// Fetched from the provider by this call
    Live,
    /// Served from a cache entry that had not yet expired
    Cached,
    /// The fetch failed; this is the last snapshot that succeeded
    Stale { reason: String },
}

/// A coherent batch of coins from a single fetch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// Coins in market cap order
    pub coins: Vec<Coin>,

    /// When the underlying fetch was issued
    pub fetched_at: DateTime<Utc>,

    /// Freshness of the data
    pub freshness: DataFreshness,
}

impl MarketSnapshot {
    pub(crate) fn from_entry(
        coins: &Arc<[Coin]>,
        limit: usize,
        fetched_at: DateTime<Utc>,
        freshness: DataFreshness,
    ) -> Self {
        Self {
            coins: coins.iter().take(limit).cloned().collect(),
            fetched_at,
            freshness,
        }
    }

    /// True when a failed fetch fell back to an older snapshot
    pub fn is_stale(&self) -> bool {
        matches!(self.freshness, DataFreshness::Stale { .. })
    }
}

/// Biggest movers over the last 24h, derived from one snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopMovers {
    pub gainers: Vec<Coin>,
    pub losers: Vec<Coin>,
    pub fetched_at: DateTime<Utc>,
    pub freshness: DataFreshness,
}

/// Extended information about one coin
///
/// Market fields are `None` when the provider has no USD value for them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinDetail {
    pub id: String,
    pub symbol: String,
    pub name: String,

    /// English description, may contain HTML
    pub description: String,

    /// First non-empty homepage link
    pub homepage: Option<String>,

    /// Largest available logo URL
    pub image: String,

    pub current_price: Option<f64>,
    pub market_cap: Option<f64>,
    pub market_cap_rank: Option<u32>,
    pub total_volume: Option<f64>,
    pub high_24h: Option<f64>,
    pub low_24h: Option<f64>,
    pub price_change_24h: Option<f64>,
    pub price_change_percentage_24h: Option<f64>,
    pub price_change_percentage_7d: Option<f64>,
    pub price_change_percentage_30d: Option<f64>,
    pub circulating_supply: Option<f64>,
    pub total_supply: Option<f64>,
    pub max_supply: Option<f64>,

    /// All-time high in USD
    pub ath: Option<f64>,

    /// All-time low in USD
    pub atl: Option<f64>,

    pub sparkline: Option<Vec<f64>>,
}

/// One sample of a chart series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Historical USD series for one coin, oldest sample first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketChart {
    pub prices: Vec<ChartPoint>,
    pub market_caps: Vec<ChartPoint>,
    pub total_volumes: Vec<ChartPoint>,
}

/// Overall system health status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// Fresh data is available
    Healthy,
    /// Data is available but old, or the last fetch failed
    Degraded,
    /// No data has ever been fetched
    Unhealthy,
}

/// Component health information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    /// Component name
    pub name: String,
    /// Component status
    pub status: HealthStatus,
    /// Optional status message
    pub message: Option<String>,
    /// Component-specific details
    pub details: std::collections::HashMap<String, serde_json::Value>,
    /// Last checked timestamp
    pub last_checked: DateTime<Utc>,
}
