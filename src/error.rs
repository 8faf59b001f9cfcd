//! Error types for the market data service

use thiserror::Error;

/// Errors that can occur when fetching markets from a provider
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network request failed
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// Invalid response from provider
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Provider API error
    #[error("Provider API error: {0}")]
    ApiError(String),

    /// Timeout waiting for response
    #[error("Request timeout")]
    Timeout,
}

/// Errors surfaced to callers of the market data service
///
/// A failed fetch that could fall back to a cached snapshot is not an error;
/// it shows up as [`DataFreshness::Stale`](crate::types::DataFreshness::Stale).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MarketDataError {
    /// Requested limit is outside the accepted bounds
    #[error("Invalid argument: limit {limit} is outside {min}..={max}")]
    InvalidArgument { limit: usize, min: usize, max: usize },

    /// A coin id, chart range or page number was rejected before any request
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// The fetch failed and there is no cached snapshot to fall back to
    #[error("Market data unavailable: {reason}")]
    DataUnavailable { reason: String },
}

impl MarketDataError {
    /// Creates an InvalidArgument error
    pub fn invalid_limit(limit: usize, min: usize, max: usize) -> Self {
        Self::InvalidArgument { limit, min, max }
    }

    /// Creates an InvalidRequest error
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Creates a DataUnavailable error
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::DataUnavailable {
            reason: reason.into(),
        }
    }
}

/// Errors from assembling a [`MarketDataService`](crate::service::MarketDataService)
#[derive(Debug, Error)]
pub enum BuildError {
    /// The configuration failed validation
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The default provider could not be created
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Errors from the persisted record storage
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading or writing the backend failed
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Records could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from reading configuration overrides
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable held a value that could not be parsed
    #[error("Invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },

    /// The resulting configuration is inconsistent
    #[error("Invalid configuration: {0}")]
    Inconsistent(String),
}
