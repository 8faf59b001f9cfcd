//! Constants for the market data service
//!
//! These are the compile-time defaults gathered into
//! [`MarketDataConfig`](crate::config::MarketDataConfig). A service built with
//! `MarketDataConfig::default()` behaves exactly as described here.

/// How long a fetched snapshot is served without hitting the network (in seconds).
/// Also the polling period.
pub const CACHE_TTL_SECS: u64 = 30;

/// How long before the newest snapshot is reported as degraded by the health check (in seconds)
pub const STALE_THRESHOLD_SECS: u64 = 300;

/// HTTP request timeout when fetching markets (in seconds)
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Smallest accepted `limit`
pub const MIN_LIMIT: usize = 1;

/// Largest accepted `limit` (CoinGecko's `per_page` maximum)
pub const MAX_LIMIT: usize = 250;

/// Number of coins requested by each polling tick
pub const DEFAULT_POLL_LIMIT: usize = 50;

/// How long coin details, charts and market pages are served from cache (in seconds)
pub const LOOKUP_CACHE_TTL_SECS: u64 = 60;

/// Longest market chart history that can be requested (in days)
pub const MAX_CHART_DAYS: u32 = 365;

/// Coins ranked at or above this market cap rank pass the filter
pub const TOP_RANK_THRESHOLD: u32 = 20;

/// Meme/joke assets that never appear in the major coins view
pub const DENYLIST: &[&str] = &[
    "dogecoin",
    "pepe",
    "floki",
    "bonk",
    "dogwifcoin",
    "safemoon",
    "baby-doge-coin",
    "shiba-inu",
    "memecoin",
    "wojak",
];

/// Major coins that pass the filter regardless of rank
pub const ALLOWLIST: &[&str] = &[
    "bitcoin",
    "ethereum",
    "binancecoin",
    "solana",
    "ripple",
    "cardano",
    "avalanche-2",
    "polkadot",
    "polygon",
    "chainlink",
    "toncoin",
    "tron",
    "shiba-inu",
    "litecoin",
    "bitcoin-cash",
    "uniswap",
    "stellar",
    "cosmos",
    "near",
    "aptos",
    "internet-computer",
    "hedera",
    "filecoin",
    "arbitrum",
    "optimism",
    "vechain",
    "the-graph",
    "algorand",
    "fantom",
    "injective-protocol",
];

/// CoinGecko API base URL
pub const COINGECKO_API_URL: &str = "https://api.coingecko.com/api/v3";

/// CoinGecko API endpoint for ranked market queries
pub const COINGECKO_MARKETS_ENDPOINT: &str = "/coins/markets";

/// CoinGecko API endpoint prefix for per-coin queries
pub const COINGECKO_COINS_ENDPOINT: &str = "/coins";

/// Quote currency for all prices
pub const VS_CURRENCY: &str = "usd";

/// User agent for HTTP requests
pub const USER_AGENT: &str = "coin-market-sdk/0.1.0";

/// Storage key for the persisted watchlist
pub const WATCHLIST_STORAGE_KEY: &str = "watchlist-storage";

/// Storage key for the persisted portfolio positions
pub const PORTFOLIO_STORAGE_KEY: &str = "portfolio-storage";

/// Storage key for the persisted price alerts
pub const ALERTS_STORAGE_KEY: &str = "alerts-storage";

/// Shortest search query that produces results
pub const MIN_SEARCH_QUERY_LEN: usize = 2;
