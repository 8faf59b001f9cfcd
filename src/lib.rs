//! # Coin Market SDK
//!
//! Top-coins market data for dashboards: a TTL-cached fetch against CoinGecko,
//! a denylist/allowlist filter, stale fallback when the provider fails, and a
//! visibility-aware poller that pushes fresh snapshots to subscribers. Coin
//! details, price charts and market pages are cached per key.
//!
//! ## Usage
//!
//! ```no_run
//! use coin_market_sdk::{MarketDataConfig, MarketDataService};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let service = MarketDataService::new(MarketDataConfig::from_env()?)?;
//!
//! let snapshot = service.fetch_top_coins(50).await?;
//! if snapshot.is_stale() {
//!     println!("showing cached data");
//! }
//! for coin in &snapshot.coins {
//!     println!("{}: ${:.2}", coin.symbol, coin.current_price);
//! }
//!
//! // Polls every TTL while at least one subscription is alive
//! let _subscription = service.subscribe(|snapshot| {
//!     println!("{} coins ({:?})", snapshot.coins.len(), snapshot.freshness);
//! });
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod filter;
pub mod metrics;
pub mod movers;
pub mod provider;
pub mod providers;
pub mod records;
pub mod repository;
pub mod service;
pub mod types;
pub mod visibility;

// Re-export commonly used types
pub use clock::{Clock, SystemClock};
pub use config::MarketDataConfig;
pub use error::{BuildError, ConfigError, MarketDataError, ProviderError, StorageError};
pub use filter::CoinFilter;
pub use metrics::FetchMetrics;
pub use provider::MarketDataProvider;
pub use providers::CoinGeckoProvider;
pub use records::{
    Alert, AlertDirection, Alerts, NewAlert, NewPosition, Portfolio, PortfolioValuation, Position,
    PositionUpdate, Watchlist, WatchlistEntry,
};
pub use repository::{FileBackend, MemoryBackend, Record, Repository, StorageBackend};
pub use service::{MarketDataService, MarketDataServiceBuilder, Subscription};
pub use types::{
    ChartPoint, Coin, CoinDetail, ComponentHealth, DataFreshness, HealthStatus, MarketChart,
    MarketSnapshot, TopMovers,
};
pub use visibility::{Visibility, VisibilitySource};
