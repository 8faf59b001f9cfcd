//! CoinGecko market data provider implementation

use crate::{
    constants::{
        COINGECKO_API_URL, COINGECKO_COINS_ENDPOINT, COINGECKO_MARKETS_ENDPOINT, REQUEST_TIMEOUT_SECS,
        USER_AGENT, VS_CURRENCY,
    },
    error::ProviderError,
    provider::MarketDataProvider,
    types::{ChartPoint, Coin, CoinDetail, MarketChart},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// One entry of the `/coins/markets` response
///
/// Only the fields the service uses are declared; serde drops the rest.
#[derive(Debug, Deserialize)]
struct CoinGeckoMarket {
    id: String,
    symbol: String,
    name: String,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    current_price: Option<f64>,
    #[serde(default)]
    market_cap: Option<f64>,
    #[serde(default)]
    market_cap_rank: Option<u32>,
    #[serde(default)]
    total_volume: Option<f64>,
    #[serde(default)]
    price_change_percentage_24h: Option<f64>,
    #[serde(default)]
    price_change_percentage_24h_in_currency: Option<f64>,
    #[serde(default)]
    sparkline_in_7d: Option<CoinGeckoSparkline>,
}

#[derive(Debug, Deserialize)]
struct CoinGeckoSparkline {
    #[serde(default)]
    price: Vec<f64>,
}

impl CoinGeckoMarket {
    /// Maps to a [`Coin`], dropping entries without a usable rank
    fn into_coin(self) -> Option<Coin> {
        let rank = match self.market_cap_rank {
            Some(rank) if rank > 0 => rank,
            _ => {
                tracing::debug!(id = %self.id, "Dropping unranked coin");
                return None;
            }
        };

        Some(Coin {
            id: self.id,
            symbol: self.symbol,
            name: self.name,
            image: self.image.unwrap_or_default(),
            current_price: self.current_price.unwrap_or_default(),
            price_change_percentage_24h: self
                .price_change_percentage_24h
                .or(self.price_change_percentage_24h_in_currency),
            market_cap: self.market_cap.unwrap_or_default(),
            market_cap_rank: rank,
            total_volume: self.total_volume.unwrap_or_default(),
            sparkline: self
                .sparkline_in_7d
                .map(|s| s.price)
                .filter(|prices| !prices.is_empty()),
        })
    }
}

/// `/coins/{id}` response
#[derive(Debug, Deserialize)]
struct CoinGeckoDetail {
    id: String,
    symbol: String,
    name: String,
    #[serde(default)]
    description: HashMap<String, Option<String>>,
    #[serde(default)]
    links: Option<CoinGeckoLinks>,
    #[serde(default)]
    image: Option<CoinGeckoImages>,
    #[serde(default)]
    market_cap_rank: Option<u32>,
    #[serde(default)]
    market_data: Option<CoinGeckoMarketData>,
}

#[derive(Debug, Deserialize)]
struct CoinGeckoLinks {
    #[serde(default)]
    homepage: Vec<Option<String>>,
}

#[derive(Debug, Deserialize)]
struct CoinGeckoImages {
    #[serde(default)]
    thumb: Option<String>,
    #[serde(default)]
    small: Option<String>,
    #[serde(default)]
    large: Option<String>,
}

/// Per-currency values, e.g. `{"usd": 1.0, "eur": 0.9}`
type CurrencyValues = HashMap<String, Option<f64>>;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CoinGeckoMarketData {
    current_price: CurrencyValues,
    market_cap: CurrencyValues,
    market_cap_rank: Option<u32>,
    total_volume: CurrencyValues,
    high_24h: CurrencyValues,
    low_24h: CurrencyValues,
    ath: CurrencyValues,
    atl: CurrencyValues,
    price_change_24h: Option<f64>,
    price_change_percentage_24h: Option<f64>,
    price_change_percentage_7d: Option<f64>,
    price_change_percentage_30d: Option<f64>,
    circulating_supply: Option<f64>,
    total_supply: Option<f64>,
    max_supply: Option<f64>,
    sparkline_7d: Option<CoinGeckoSparkline>,
}

fn usd(values: &CurrencyValues) -> Option<f64> {
    values.get(VS_CURRENCY).copied().flatten()
}

impl CoinGeckoDetail {
    fn into_detail(self) -> CoinDetail {
        let data = self.market_data.unwrap_or_default();
        let image = self
            .image
            .and_then(|i| i.large.or(i.small).or(i.thumb))
            .unwrap_or_default();
        let homepage = self
            .links
            .and_then(|l| l.homepage.into_iter().flatten().find(|url| !url.trim().is_empty()));

        CoinDetail {
            id: self.id,
            symbol: self.symbol,
            name: self.name,
            description: self.description.get("en").cloned().flatten().unwrap_or_default(),
            homepage,
            image,
            current_price: usd(&data.current_price),
            market_cap: usd(&data.market_cap),
            market_cap_rank: data.market_cap_rank.or(self.market_cap_rank),
            total_volume: usd(&data.total_volume),
            high_24h: usd(&data.high_24h),
            low_24h: usd(&data.low_24h),
            price_change_24h: data.price_change_24h,
            price_change_percentage_24h: data.price_change_percentage_24h,
            price_change_percentage_7d: data.price_change_percentage_7d,
            price_change_percentage_30d: data.price_change_percentage_30d,
            circulating_supply: data.circulating_supply,
            total_supply: data.total_supply,
            max_supply: data.max_supply,
            ath: usd(&data.ath),
            atl: usd(&data.atl),
            sparkline: data.sparkline_7d.map(|s| s.price).filter(|prices| !prices.is_empty()),
        }
    }
}

/// `/coins/{id}/market_chart` response: `[unix_millis, value]` pairs
#[derive(Debug, Deserialize)]
struct CoinGeckoChart {
    #[serde(default)]
    prices: Vec<(f64, Option<f64>)>,
    #[serde(default)]
    market_caps: Vec<(f64, Option<f64>)>,
    #[serde(default)]
    total_volumes: Vec<(f64, Option<f64>)>,
}

/// Drops samples with a missing value or an unrepresentable timestamp
fn chart_series(samples: Vec<(f64, Option<f64>)>) -> Vec<ChartPoint> {
    samples
        .into_iter()
        .filter_map(|(millis, value)| {
            let timestamp = DateTime::<Utc>::from_timestamp_millis(millis as i64)?;
            Some(ChartPoint {
                timestamp,
                value: value?,
            })
        })
        .collect()
}

/// CoinGecko market data provider
pub struct CoinGeckoProvider {
    client: Client,
    base_url: String,
}

impl CoinGeckoProvider {
    /// Creates a provider against the public CoinGecko API
    pub fn new() -> Result<Self, ProviderError> {
        Self::with_base_url(COINGECKO_API_URL, Duration::from_secs(REQUEST_TIMEOUT_SECS))
    }

    /// Creates a provider against a CoinGecko-compatible base URL
    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(ProviderError::NetworkError)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Builds the markets URL for one page of the market list
    fn build_url(&self, per_page: usize, page: u32) -> String {
        format!(
            "{}{}?vs_currency={}&order=market_cap_desc&per_page={}&page={}&sparkline=true&price_change_percentage=24h",
            self.base_url, COINGECKO_MARKETS_ENDPOINT, VS_CURRENCY, per_page, page
        )
    }

    fn build_detail_url(&self, id: &str) -> String {
        format!(
            "{}{}/{}?localization=false&tickers=false&market_data=true&community_data=false&developer_data=false&sparkline=true",
            self.base_url, COINGECKO_COINS_ENDPOINT, id
        )
    }

    fn build_chart_url(&self, id: &str, days: u32) -> String {
        format!(
            "{}{}/{}/market_chart?vs_currency={}&days={}",
            self.base_url, COINGECKO_COINS_ENDPOINT, id, VS_CURRENCY, days
        )
    }

    /// Parses a markets response body into coins
    fn parse_response(body: &str) -> Result<Vec<Coin>, ProviderError> {
        let markets: Vec<CoinGeckoMarket> = serde_json::from_str(body).map_err(|e| {
            ProviderError::InvalidResponse(format!("Failed to parse CoinGecko markets response: {}", e))
        })?;

        Ok(markets.into_iter().filter_map(CoinGeckoMarket::into_coin).collect())
    }

    fn parse_detail(body: &str) -> Result<CoinDetail, ProviderError> {
        let detail: CoinGeckoDetail = serde_json::from_str(body).map_err(|e| {
            ProviderError::InvalidResponse(format!("Failed to parse CoinGecko coin response: {}", e))
        })?;
        Ok(detail.into_detail())
    }

    fn parse_chart(body: &str) -> Result<MarketChart, ProviderError> {
        let chart: CoinGeckoChart = serde_json::from_str(body).map_err(|e| {
            ProviderError::InvalidResponse(format!("Failed to parse CoinGecko chart response: {}", e))
        })?;
        Ok(MarketChart {
            prices: chart_series(chart.prices),
            market_caps: chart_series(chart.market_caps),
            total_volumes: chart_series(chart.total_volumes),
        })
    }

    /// Sends a GET and returns the body of a successful response
    async fn get(&self, url: &str) -> Result<String, ProviderError> {
        let start = Instant::now();
        tracing::debug!(url = %url, "Requesting CoinGecko");

        let response = self
            .client
            .get(url)
            .header("accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout
                } else {
                    ProviderError::NetworkError(e)
                }
            })?;

        // Check for rate limiting
        if response.status().as_u16() == 429 {
            return Err(ProviderError::RateLimitExceeded);
        }

        // Check for other errors
        if !response.status().is_success() {
            return Err(ProviderError::ApiError(format!(
                "HTTP {}: {}",
                response.status(),
                response.text().await.unwrap_or_default()
            )));
        }

        let body = response.text().await.map_err(ProviderError::NetworkError)?;
        tracing::debug!(
            bytes = body.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "CoinGecko request succeeded"
        );
        Ok(body)
    }
}

#[async_trait]
impl MarketDataProvider for CoinGeckoProvider {
    async fn fetch_markets_page(&self, per_page: usize, page: u32) -> Result<Vec<Coin>, ProviderError> {
        let body = self.get(&self.build_url(per_page, page)).await?;
        let coins = Self::parse_response(&body)?;
        tracing::debug!(count = coins.len(), page, "Fetched markets from CoinGecko");
        Ok(coins)
    }

    async fn fetch_coin_detail(&self, id: &str) -> Result<CoinDetail, ProviderError> {
        let body = self.get(&self.build_detail_url(id)).await?;
        Self::parse_detail(&body)
    }

    async fn fetch_market_chart(&self, id: &str, days: u32) -> Result<MarketChart, ProviderError> {
        let body = self.get(&self.build_chart_url(id, days)).await?;
        let chart = Self::parse_chart(&body)?;
        tracing::debug!(id, days, samples = chart.prices.len(), "Fetched market chart from CoinGecko");
        Ok(chart)
    }

    fn provider_name(&self) -> &'static str {
        "coingecko"
    }
}
