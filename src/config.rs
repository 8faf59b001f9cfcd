//! Runtime configuration for the market data service
//!
//! Every field defaults to the matching value in [`crate::constants`]. Callers
//! that need different behavior construct a config explicitly or apply
//! environment overrides with [`MarketDataConfig::from_env`].

use crate::{
    constants::{
        ALLOWLIST, CACHE_TTL_SECS, COINGECKO_API_URL, DEFAULT_POLL_LIMIT, DENYLIST,
        LOOKUP_CACHE_TTL_SECS, MAX_CHART_DAYS, MAX_LIMIT, MIN_LIMIT, REQUEST_TIMEOUT_SECS,
        STALE_THRESHOLD_SECS, TOP_RANK_THRESHOLD,
    },
    error::ConfigError,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Overrides the provider base URL
pub const ENV_API_URL: &str = "MARKET_DATA_API_URL";
/// Overrides the cache TTL and polling period, in seconds
pub const ENV_CACHE_TTL_SECS: &str = "MARKET_DATA_CACHE_TTL_SECS";
/// Overrides the HTTP timeout, in seconds
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "MARKET_DATA_REQUEST_TIMEOUT_SECS";
/// Overrides the number of coins fetched per polling tick
pub const ENV_POLL_LIMIT: &str = "MARKET_DATA_POLL_LIMIT";

/// Configuration injected into [`MarketDataService`](crate::service::MarketDataService)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketDataConfig {
    /// Provider base URL (no trailing slash)
    pub api_url: String,

    /// Lifetime of a cache entry, and the polling period
    pub cache_ttl: Duration,

    /// Minimum time since the last network fetch began before a polling
    /// tick may fetch again
    pub min_fetch_interval: Duration,

    /// Lifetime of cached coin details, market charts and market pages
    pub lookup_cache_ttl: Duration,

    /// Longest market chart history accepted, in days
    pub max_chart_days: u32,

    /// HTTP request timeout
    pub request_timeout: Duration,

    /// Age after which the health check reports degraded
    pub stale_threshold: Duration,

    /// Smallest accepted `limit`
    pub min_limit: usize,

    /// Largest accepted `limit`
    pub max_limit: usize,

    /// Number of coins fetched by each polling tick
    pub poll_limit: usize,

    /// Coins ranked at or above this pass the filter
    pub rank_threshold: u32,

    /// Ids that are always filtered out
    pub denylist: HashSet<String>,

    /// Ids that pass the filter regardless of rank
    pub allowlist: HashSet<String>,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        let ttl = Duration::from_secs(CACHE_TTL_SECS);
        Self {
            api_url: COINGECKO_API_URL.to_string(),
            cache_ttl: ttl,
            min_fetch_interval: ttl / 2,
            lookup_cache_ttl: Duration::from_secs(LOOKUP_CACHE_TTL_SECS),
            max_chart_days: MAX_CHART_DAYS,
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            stale_threshold: Duration::from_secs(STALE_THRESHOLD_SECS),
            min_limit: MIN_LIMIT,
            max_limit: MAX_LIMIT,
            poll_limit: DEFAULT_POLL_LIMIT,
            rank_threshold: TOP_RANK_THRESHOLD,
            denylist: DENYLIST.iter().map(|id| id.to_string()).collect(),
            allowlist: ALLOWLIST.iter().map(|id| id.to_string()).collect(),
        }
    }
}

impl MarketDataConfig {
    /// Defaults with overrides read from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary key lookup
    ///
    /// Changing the TTL also moves `min_fetch_interval` to half the new TTL.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_URL) {
            self.api_url = url.trim_end_matches('/').to_string();
        }
        if let Some(secs) = parse_var::<u64>(&lookup, ENV_CACHE_TTL_SECS)? {
            self.cache_ttl = Duration::from_secs(secs);
            self.min_fetch_interval = self.cache_ttl / 2;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, ENV_REQUEST_TIMEOUT_SECS)? {
            self.request_timeout = Duration::from_secs(secs);
        }
        if let Some(limit) = parse_var::<usize>(&lookup, ENV_POLL_LIMIT)? {
            self.poll_limit = limit;
        }

        self.validate()?;
        Ok(self)
    }

    /// Checks that the values can drive a working service
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_ttl.is_zero() {
            return Err(ConfigError::Inconsistent(
                "cache_ttl must be greater than zero".to_string(),
            ));
        }
        if self.min_fetch_interval > self.cache_ttl {
            return Err(ConfigError::Inconsistent(
                "min_fetch_interval must not exceed cache_ttl".to_string(),
            ));
        }
        if self.min_limit == 0 || self.min_limit > self.max_limit {
            return Err(ConfigError::Inconsistent(format!(
                "limit bounds {}..={} are empty or start at zero",
                self.min_limit, self.max_limit
            )));
        }
        if self.max_chart_days == 0 {
            return Err(ConfigError::Inconsistent(
                "max_chart_days must be greater than zero".to_string(),
            ));
        }
        if !(self.min_limit..=self.max_limit).contains(&self.poll_limit) {
            return Err(ConfigError::Inconsistent(format!(
                "poll_limit {} is outside {}..={}",
                self.poll_limit, self.min_limit, self.max_limit
            )));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw,
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = MarketDataConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cache_ttl, Duration::from_secs(CACHE_TTL_SECS));
        assert_eq!(config.min_fetch_interval, config.cache_ttl / 2);
        assert_eq!(config.lookup_cache_ttl, Duration::from_secs(60));
        assert!(config.denylist.contains("dogecoin"));
        assert!(config.allowlist.contains("bitcoin"));
    }

    #[test]
    fn test_overrides_apply() {
        let config = MarketDataConfig::default()
            .with_overrides(lookup(&[
                (ENV_API_URL, "http://localhost:8080/api/v3/"),
                (ENV_CACHE_TTL_SECS, "60"),
                (ENV_POLL_LIMIT, "100"),
            ]))
            .unwrap();

        assert_eq!(config.api_url, "http://localhost:8080/api/v3");
        assert_eq!(config.cache_ttl, Duration::from_secs(60));
        assert_eq!(config.min_fetch_interval, Duration::from_secs(30));
        assert_eq!(config.poll_limit, 100);
    }

    #[test]
    fn test_unparseable_override_is_rejected() {
        let err = MarketDataConfig::default()
            .with_overrides(lookup(&[(ENV_CACHE_TTL_SECS, "soon")]))
            .unwrap_err();

        assert_eq!(
            err,
            ConfigError::InvalidValue {
                key: ENV_CACHE_TTL_SECS.to_string(),
                value: "soon".to_string(),
            }
        );
    }

    #[test]
    fn test_zero_ttl_is_inconsistent() {
        let result = MarketDataConfig::default().with_overrides(lookup(&[(ENV_CACHE_TTL_SECS, "0")]));
        assert!(matches!(result, Err(ConfigError::Inconsistent(_))));
    }

    #[test]
    fn test_poll_limit_must_fit_bounds() {
        let result = MarketDataConfig::default().with_overrides(lookup(&[(ENV_POLL_LIMIT, "1000")]));
        assert!(matches!(result, Err(ConfigError::Inconsistent(_))));
    }
}
