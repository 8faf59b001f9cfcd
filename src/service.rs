//! Market data service
//!
//! Fetches the top coins, keeps the latest filtered batch in a TTL cache,
//! falls back to the cached batch when the provider fails and pushes
//! refreshed snapshots to subscribers while the consumer is visible.

use crate::{
    cache::{CacheEntry, KeyedCache, SnapshotCache},
    clock::{Clock, SystemClock},
    config::MarketDataConfig,
    error::{BuildError, MarketDataError, ProviderError},
    filter::CoinFilter,
    metrics::{FetchMetrics, MetricsCollector},
    movers,
    provider::MarketDataProvider,
    providers::CoinGeckoProvider,
    types::{
        Coin, CoinDetail, ComponentHealth, DataFreshness, HealthStatus, MarketChart, MarketSnapshot,
        TopMovers,
    },
    visibility::{Visibility, VisibilitySource},
};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

type Callback = Arc<dyn Fn(&MarketSnapshot) + Send + Sync>;

/// Subscriber set and poller handle, guarded together so the 0↔1
/// transitions and the poller lifecycle cannot interleave.
#[derive(Default)]
struct Registry {
    subscribers: BTreeMap<u64, Callback>,
    poller: Option<JoinHandle<()>>,
}

impl Registry {
    fn stop_poller(&mut self) {
        if let Some(handle) = self.poller.take() {
            handle.abort();
            tracing::info!("Stopped market data poller");
        }
    }
}

/// Where a poll tick came from, for logging
#[derive(Debug, Clone, Copy)]
enum TickTrigger {
    Timer,
    BecameVisible,
}

struct Inner {
    config: MarketDataConfig,
    filter: CoinFilter,
    provider: Arc<dyn MarketDataProvider>,
    cache: SnapshotCache,
    details: KeyedCache<CoinDetail>,
    charts: KeyedCache<MarketChart>,
    pages: KeyedCache<Vec<Coin>>,
    clock: Arc<dyn Clock>,
    visibility: Arc<dyn VisibilitySource>,
    metrics: MetricsCollector,
    registry: Mutex<Registry>,
    last_fetch_started: Mutex<Option<Instant>>,
    next_subscriber_id: AtomicU64,
    running: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Market data service
///
/// Cheap to clone; clones share cache, subscribers and poller. Independent
/// instances share nothing.
///
/// # Example
/// ```no_run
/// use coin_market_sdk::{MarketDataConfig, MarketDataService};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let service = MarketDataService::new(MarketDataConfig::default())?;
///
/// let snapshot = service.fetch_top_coins(25).await?;
/// for coin in &snapshot.coins {
///     println!("{:>3} {:<8} ${:.2}", coin.market_cap_rank, coin.symbol, coin.current_price);
/// }
///
/// let subscription = service.subscribe(|snapshot| {
///     println!("{} coins, stale: {}", snapshot.coins.len(), snapshot.is_stale());
/// });
/// # drop(subscription);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MarketDataService {
    inner: Arc<Inner>,
}

/// Assembles a [`MarketDataService`] from its collaborators
pub struct MarketDataServiceBuilder {
    config: MarketDataConfig,
    provider: Option<Arc<dyn MarketDataProvider>>,
    clock: Arc<dyn Clock>,
    visibility: Arc<dyn VisibilitySource>,
}

impl MarketDataServiceBuilder {
    /// Uses a custom provider instead of CoinGecko
    pub fn provider(mut self, provider: Arc<dyn MarketDataProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Visibility source that gates polling. Defaults to always visible.
    pub fn visibility(mut self, visibility: Arc<dyn VisibilitySource>) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn build(self) -> Result<MarketDataService, BuildError> {
        self.config.validate()?;

        let provider = match self.provider {
            Some(provider) => provider,
            None => Arc::new(CoinGeckoProvider::with_base_url(
                &self.config.api_url,
                self.config.request_timeout,
            )?),
        };

        let inner = Inner {
            filter: CoinFilter::from_config(&self.config),
            metrics: MetricsCollector::new(provider.provider_name()),
            provider,
            cache: SnapshotCache::new(),
            details: KeyedCache::new(),
            charts: KeyedCache::new(),
            pages: KeyedCache::new(),
            clock: self.clock,
            visibility: self.visibility,
            registry: Mutex::new(Registry::default()),
            last_fetch_started: Mutex::new(None),
            next_subscriber_id: AtomicU64::new(0),
            running: AtomicBool::new(true),
            config: self.config,
        };

        Ok(MarketDataService {
            inner: Arc::new(inner),
        })
    }
}

impl MarketDataService {
    /// Starts building a service around `config`
    pub fn builder(config: MarketDataConfig) -> MarketDataServiceBuilder {
        MarketDataServiceBuilder {
            config,
            provider: None,
            clock: Arc::new(SystemClock),
            visibility: Arc::new(Visibility::visible()),
        }
    }

    /// Creates a service backed by CoinGecko
    pub fn new(config: MarketDataConfig) -> Result<Self, BuildError> {
        Self::builder(config).build()
    }

    /// Creates a service with a custom provider
    pub fn with_provider(
        config: MarketDataConfig,
        provider: Arc<dyn MarketDataProvider>,
    ) -> Result<Self, BuildError> {
        Self::builder(config).provider(provider).build()
    }

    /// Gets the top `limit` coins by market cap
    ///
    /// Served from cache while the cached batch is younger than the TTL;
    /// otherwise fetched. When the fetch fails, the last cached batch is
    /// returned with [`DataFreshness::Stale`].
    ///
    /// # Errors
    /// * `InvalidArgument` if `limit` is outside the configured bounds
    /// * `DataUnavailable` if the fetch failed and nothing was ever cached
    pub async fn fetch_top_coins(&self, limit: usize) -> Result<MarketSnapshot, MarketDataError> {
        self.inner.fetch(limit, true).await
    }

    /// Like [`fetch_top_coins`](Self::fetch_top_coins) but always asks the
    /// provider, for explicit user retries
    pub async fn refresh(&self, limit: usize) -> Result<MarketSnapshot, MarketDataError> {
        self.inner.fetch(limit, false).await
    }

    /// Applies the configured major-coins filter
    pub fn filter_allowed(&self, coins: &[Coin]) -> Vec<Coin> {
        self.inner.filter.apply(coins)
    }

    /// Fetches `limit` coins and derives the `count` biggest gainers and
    /// losers from that one snapshot
    pub async fn top_movers(&self, limit: usize, count: usize) -> Result<TopMovers, MarketDataError> {
        let snapshot = self.fetch_top_coins(limit).await?;
        Ok(TopMovers {
            gainers: movers::top_gainers(&snapshot.coins, count),
            losers: movers::top_losers(&snapshot.coins, count),
            fetched_at: snapshot.fetched_at,
            freshness: snapshot.freshness,
        })
    }

    /// Searches the latest cached batch by name or symbol
    pub async fn search(&self, query: &str) -> Vec<Coin> {
        match self.inner.cache.latest().await {
            Some(entry) => movers::search(&entry.coins, query),
            None => Vec::new(),
        }
    }

    /// Gets page `page` (starting at 1) of the full market list
    ///
    /// Pages are not filtered and are cached per page size and number for
    /// `lookup_cache_ttl`. They never touch the top-coins snapshot.
    pub async fn markets_page(&self, per_page: usize, page: u32) -> Result<Vec<Coin>, MarketDataError> {
        let inner = &self.inner;
        inner.check_limit(per_page)?;
        if page == 0 {
            return Err(MarketDataError::invalid_request("page numbers start at 1"));
        }
        inner
            .lookup(
                &inner.pages,
                format!("markets-{per_page}-{page}"),
                inner.provider.fetch_markets_page(per_page, page),
            )
            .await
    }

    /// Gets extended information about one coin, cached for `lookup_cache_ttl`
    ///
    /// # Errors
    /// * `InvalidRequest` if `id` is not a coin id
    /// * `DataUnavailable` if the provider failed or does not know the coin
    pub async fn coin_detail(&self, id: &str) -> Result<CoinDetail, MarketDataError> {
        let inner = &self.inner;
        let id = normalize_coin_id(id)?;
        inner
            .lookup(&inner.details, format!("coin-{id}"), inner.provider.fetch_coin_detail(&id))
            .await
    }

    /// Gets `days` of USD history for one coin, cached per coin and range
    pub async fn market_chart(&self, id: &str, days: u32) -> Result<MarketChart, MarketDataError> {
        let inner = &self.inner;
        let id = normalize_coin_id(id)?;
        let max = inner.config.max_chart_days;
        if !(1..=max).contains(&days) {
            return Err(MarketDataError::invalid_request(format!(
                "chart range of {days} days is outside 1..={max}"
            )));
        }
        inner
            .lookup(
                &inner.charts,
                format!("chart-{id}-{days}"),
                inner.provider.fetch_market_chart(&id, days),
            )
            .await
    }

    /// The latest cached batch, whatever its age
    pub async fn latest_snapshot(&self) -> Option<MarketSnapshot> {
        let entry = self.inner.cache.latest().await?;
        let freshness = if entry.is_fresh(self.inner.clock.now(), self.inner.config.cache_ttl) {
            DataFreshness::Cached
        } else {
            DataFreshness::Stale {
                reason: "cache entry expired".to_string(),
            }
        };
        Some(MarketSnapshot::from_entry(
            &entry.coins,
            entry.coins.len(),
            entry.fetched_at,
            freshness,
        ))
    }

    /// Registers `callback` for every snapshot produced by polling
    ///
    /// The first subscriber starts the poller; it ticks once per cache TTL,
    /// skips ticks while the consumer is hidden and refreshes immediately when
    /// it becomes visible again. Must be called within a Tokio runtime.
    ///
    /// Dropping the returned [`Subscription`] unsubscribes. When the last
    /// subscriber leaves, the poller stops.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&MarketSnapshot) + Send + Sync + 'static,
    {
        let id = self.inner.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let mut registry = lock(&self.inner.registry);
        registry.subscribers.insert(id, Arc::new(callback));

        if registry.poller.is_none() && self.inner.running.load(Ordering::SeqCst) {
            registry.poller = Some(self.inner.spawn_poller());
        }

        Subscription {
            inner: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Allows polling again after [`stop`](Self::stop)
    pub fn start(&self) {
        self.inner.running.store(true, Ordering::SeqCst);
        let mut registry = lock(&self.inner.registry);
        if registry.poller.is_none() && !registry.subscribers.is_empty() {
            registry.poller = Some(self.inner.spawn_poller());
        }
    }

    /// Stops the poller and drops every subscriber
    ///
    /// New subscriptions register but do not poll until [`start`](Self::start).
    pub fn stop(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        let mut registry = lock(&self.inner.registry);
        registry.subscribers.clear();
        registry.stop_poller();
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner.registry).subscribers.len()
    }

    /// Whether the polling task is currently running
    pub fn is_polling(&self) -> bool {
        lock(&self.inner.registry)
            .poller
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn config(&self) -> &MarketDataConfig {
        &self.inner.config
    }

    /// Returns the name of the current provider
    pub fn provider_name(&self) -> &'static str {
        self.inner.provider.provider_name()
    }

    /// Gets fetch metrics including latency percentiles and cache counters
    pub async fn metrics(&self) -> FetchMetrics {
        self.inner.metrics.snapshot().await
    }

    /// Perform a health check on the market data service
    ///
    /// # Returns
    /// Unhealthy without any data, Degraded when the data is older than the
    /// stale threshold or the last fetch failed, Healthy otherwise
    pub async fn health_check(&self) -> ComponentHealth {
        let mut details = std::collections::HashMap::new();
        let metrics = self.metrics().await;
        let entry = self.inner.cache.latest().await;
        let age = entry.as_ref().map(|e| e.age(self.inner.clock.now()));

        details.insert(
            "cached_coins".to_string(),
            serde_json::json!(entry.as_ref().map_or(0, |e| e.coins.len())),
        );
        details.insert(
            "snapshot_age_secs".to_string(),
            serde_json::json!(age.map(|a| a.as_secs())),
        );
        details.insert(
            "provider_name".to_string(),
            serde_json::json!(self.provider_name()),
        );
        details.insert(
            "subscribers".to_string(),
            serde_json::json!(self.subscriber_count()),
        );
        details.insert(
            "success_rate".to_string(),
            serde_json::json!(metrics.success_rate),
        );

        let too_old = age.is_some_and(|a| a > self.inner.config.stale_threshold);
        let (status, message) = match age {
            None => (
                HealthStatus::Unhealthy,
                "Market data service has no snapshot".to_string(),
            ),
            Some(age) if too_old => (
                HealthStatus::Degraded,
                format!("Market data snapshot is {}s old", age.as_secs()),
            ),
            Some(_) if metrics.last_request_failed => (
                HealthStatus::Degraded,
                "Last market data fetch failed; serving cached snapshot".to_string(),
            ),
            Some(_) => (
                HealthStatus::Healthy,
                "Market data service is operational with fresh data".to_string(),
            ),
        };

        ComponentHealth {
            name: "market_data_service".to_string(),
            status,
            message: Some(message),
            details,
            last_checked: self.inner.clock.wall_clock(),
        }
    }
}

/// Lowercases a coin id and rejects anything that is not a CoinGecko slug
fn normalize_coin_id(id: &str) -> Result<String, MarketDataError> {
    let id = id.trim().to_ascii_lowercase();
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(id)
    } else {
        Err(MarketDataError::invalid_request(format!("{id:?} is not a coin id")))
    }
}

impl Inner {
    fn check_limit(&self, limit: usize) -> Result<(), MarketDataError> {
        let (min, max) = (self.config.min_limit, self.config.max_limit);
        if (min..=max).contains(&limit) {
            Ok(())
        } else {
            Err(MarketDataError::invalid_limit(limit, min, max))
        }
    }

    async fn fetch(&self, limit: usize, use_cache: bool) -> Result<MarketSnapshot, MarketDataError> {
        self.check_limit(limit)?;

        if use_cache {
            if let Some(entry) = self.cache.fresh(self.clock.now(), self.config.cache_ttl).await {
                tracing::debug!(limit, cached = entry.coins.len(), "Serving markets from cache");
                self.metrics.record_cache_hit().await;
                return Ok(MarketSnapshot::from_entry(
                    &entry.coins,
                    limit,
                    entry.fetched_at,
                    DataFreshness::Cached,
                ));
            }
        }

        let captured_at = self.clock.now();
        let fetched_at = self.clock.wall_clock();
        *lock(&self.last_fetch_started) = Some(captured_at);
        let start = std::time::Instant::now();

        match self.provider.fetch_markets(limit).await {
            Ok(coins) => {
                self.metrics.record_request(start.elapsed(), true).await;
                let filtered = self.filter.apply(&coins);
                tracing::debug!(
                    limit,
                    received = coins.len(),
                    kept = filtered.len(),
                    provider = self.provider.provider_name(),
                    latency_ms = start.elapsed().as_millis() as u64,
                    "Fetched markets"
                );

                let current = self
                    .cache
                    .replace_if_newer(CacheEntry::new(filtered, captured_at, fetched_at))
                    .await;
                let freshness = if current.captured_at == captured_at {
                    DataFreshness::Live
                } else {
                    DataFreshness::Cached
                };
                Ok(MarketSnapshot::from_entry(
                    &current.coins,
                    limit,
                    current.fetched_at,
                    freshness,
                ))
            }
            Err(e) => {
                self.metrics.record_request(start.elapsed(), false).await;
                match self.cache.latest().await {
                    Some(entry) => {
                        tracing::warn!(
                            error = %e,
                            age_secs = entry.age(self.clock.now()).as_secs(),
                            "Failed to fetch markets, serving stale snapshot"
                        );
                        self.metrics.record_stale_fallback().await;
                        Ok(MarketSnapshot::from_entry(
                            &entry.coins,
                            limit,
                            entry.fetched_at,
                            DataFreshness::Stale {
                                reason: e.to_string(),
                            },
                        ))
                    }
                    None => {
                        tracing::warn!(error = %e, "Failed to fetch markets and no snapshot is cached");
                        Err(MarketDataError::unavailable(e.to_string()))
                    }
                }
            }
        }
    }

    /// Serves `key` from `cache` while fresh, otherwise awaits `request`
    ///
    /// Lookups have no stale fallback; a failed request is `DataUnavailable`.
    async fn lookup<V, Fut>(
        &self,
        cache: &KeyedCache<V>,
        key: String,
        request: Fut,
    ) -> Result<V, MarketDataError>
    where
        V: Clone,
        Fut: Future<Output = Result<V, ProviderError>>,
    {
        let ttl = self.config.lookup_cache_ttl;
        if let Some(hit) = cache.fresh(&key, self.clock.now(), ttl).await {
            tracing::debug!(key = %key, "Serving lookup from cache");
            return Ok(V::clone(&hit));
        }

        let captured_at = self.clock.now();
        match request.await {
            Ok(value) => {
                let current = cache.insert(key, value, captured_at, self.clock.now(), ttl).await;
                Ok(V::clone(&current))
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Lookup failed");
                Err(MarketDataError::unavailable(e.to_string()))
            }
        }
    }

    fn spawn_poller(self: &Arc<Self>) -> JoinHandle<()> {
        let period = self.config.cache_ttl;
        tracing::info!(
            period_secs = period.as_secs(),
            limit = self.config.poll_limit,
            "Starting market data poller"
        );
        tokio::spawn(poll_loop(
            Arc::downgrade(self),
            self.visibility.watch(),
            period,
        ))
    }

    /// Runs one tick unless there is nobody to notify or the previous fetch
    /// started less than `min_fetch_interval` ago
    async fn poll_tick(&self, trigger: TickTrigger) {
        if lock(&self.registry).subscribers.is_empty() {
            return;
        }

        {
            let mut last = lock(&self.last_fetch_started);
            let now = self.clock.now();
            if let Some(previous) = *last {
                let elapsed = now.saturating_duration_since(previous);
                if elapsed < self.config.min_fetch_interval {
                    tracing::trace!(
                        ?trigger,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Skipping tick, previous fetch too recent"
                    );
                    return;
                }
            }
            *last = Some(now);
        }

        tracing::debug!(?trigger, "Polling markets");
        match self.fetch(self.config.poll_limit, false).await {
            Ok(snapshot) => self.notify(&snapshot),
            Err(e) => tracing::warn!(error = %e, ?trigger, "Polling tick produced no data"),
        }
    }

    fn notify(&self, snapshot: &MarketSnapshot) {
        let callbacks: Vec<Callback> = lock(&self.registry).subscribers.values().cloned().collect();
        for callback in callbacks {
            callback(snapshot);
        }
    }

    fn remove_subscriber(&self, id: u64) {
        let mut registry = lock(&self.registry);
        if registry.subscribers.remove(&id).is_some() && registry.subscribers.is_empty() {
            registry.stop_poller();
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        lock(&self.registry).stop_poller();
    }
}

/// Timer ticks every `period` while visible; a hidden→visible transition
/// ticks immediately. Ticks run inline, so poll fetches never overlap.
async fn poll_loop(inner: Weak<Inner>, mut visibility: watch::Receiver<bool>, period: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut was_visible = *visibility.borrow_and_update();
    let mut watching = true;

    loop {
        let trigger = tokio::select! {
            _ = ticker.tick() => {
                if !*visibility.borrow() {
                    tracing::trace!("Skipping tick while hidden");
                    continue;
                }
                TickTrigger::Timer
            }
            changed = visibility.changed(), if watching => {
                if changed.is_err() {
                    watching = false;
                    continue;
                }
                let visible = *visibility.borrow_and_update();
                let became_visible = visible && !was_visible;
                was_visible = visible;
                if !became_visible {
                    continue;
                }
                TickTrigger::BecameVisible
            }
        };

        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.poll_tick(trigger).await;
    }
}

/// Handle for a registered snapshot callback
///
/// Dropping it, or calling [`unsubscribe`](Self::unsubscribe), removes the
/// callback. Removing the last one stops the poller.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    inner: Weak<Inner>,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.remove_subscriber(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::manual::ManualClock;
    use crate::provider::mock::MockProvider;
    use crate::types::fixtures::coin;
    use std::sync::atomic::AtomicUsize;

    const TTL: Duration = Duration::from_secs(30);

    fn config() -> MarketDataConfig {
        MarketDataConfig {
            poll_limit: 10,
            ..MarketDataConfig::default()
        }
    }

    fn five_coins() -> Vec<Coin> {
        vec![
            coin("bitcoin", 1, Some(12.0)),
            coin("ethereum", 2, Some(-3.0)),
            coin("solana", 3, Some(45.0)),
            coin("ripple", 4, Some(0.0)),
            coin("cardano", 5, Some(-20.0)),
        ]
    }

    fn service_with(provider: &MockProvider) -> MarketDataService {
        MarketDataService::with_provider(config(), Arc::new(provider.clone())).unwrap()
    }

    fn manual_service(provider: &MockProvider, clock: Arc<ManualClock>) -> MarketDataService {
        MarketDataService::builder(config())
            .provider(Arc::new(provider.clone()))
            .clock(clock)
            .build()
            .unwrap()
    }

    fn counting_subscriber(service: &MarketDataService) -> (Subscription, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let subscription = service.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (subscription, count)
    }

    /// Lets the poller run everything that is due at the current paused instant
    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_limit_bounds() {
        let provider = MockProvider::with_coins(five_coins());
        let service = service_with(&provider);

        assert_eq!(
            service.fetch_top_coins(0).await.unwrap_err(),
            MarketDataError::invalid_limit(0, 1, 250)
        );
        assert!(matches!(
            service.fetch_top_coins(251).await,
            Err(MarketDataError::InvalidArgument { .. })
        ));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_fetch_requests_limit_and_filters() {
        let mut coins = five_coins();
        coins.push(coin("dogecoin", 8, Some(3.0)));
        let provider = MockProvider::with_coins(coins);
        let service = service_with(&provider);

        let snapshot = service.fetch_top_coins(6).await.unwrap();

        assert_eq!(provider.last_limit(), Some(6));
        assert_eq!(snapshot.freshness, DataFreshness::Live);
        assert_eq!(snapshot.coins.len(), 5);
        assert!(snapshot.coins.iter().all(|c| c.id != "dogecoin"));
    }

    #[tokio::test]
    async fn test_results_never_exceed_limit() {
        let coins: Vec<Coin> = (1..=100).map(|rank| coin(&format!("coin-{rank}"), rank, None)).collect();
        let provider = MockProvider::with_coins(coins);
        let clock = Arc::new(ManualClock::new());
        let service = manual_service(&provider, clock.clone());

        for limit in [1, 7, 20, 50, 100] {
            clock.advance(TTL);
            let live = service.fetch_top_coins(limit).await.unwrap();
            assert!(live.coins.len() <= limit);
            assert!(live.coins.iter().all(|c| c.market_cap_rank <= 20));

            let cached = service.fetch_top_coins(limit).await.unwrap();
            assert_eq!(cached.freshness, DataFreshness::Cached);
            assert!(cached.coins.len() <= limit);
        }
    }

    #[tokio::test]
    async fn test_two_calls_within_ttl_hit_network_once() {
        let provider = MockProvider::with_coins(five_coins());
        let clock = Arc::new(ManualClock::new());
        let service = manual_service(&provider, clock.clone());

        let first = service.fetch_top_coins(5).await.unwrap();
        clock.advance(Duration::from_secs(29));
        let second = service.fetch_top_coins(3).await.unwrap();

        assert_eq!(provider.call_count(), 1);
        assert_eq!(second.freshness, DataFreshness::Cached);
        assert_eq!(second.coins, first.coins[..3].to_vec());

        clock.advance(Duration::from_secs(1));
        service.fetch_top_coins(5).await.unwrap();
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_stale_fallback_returns_previous_entry() {
        let provider = MockProvider::with_coins(five_coins());
        let clock = Arc::new(ManualClock::new());
        let service = manual_service(&provider, clock.clone());

        let fresh = service.fetch_top_coins(5).await.unwrap();
        provider.set_error("HTTP 503");
        clock.advance(TTL * 3);

        let stale = service.fetch_top_coins(5).await.unwrap();
        assert!(stale.is_stale());
        assert_eq!(stale.coins, fresh.coins);
        assert_eq!(stale.fetched_at, fresh.fetched_at);
        assert!(matches!(stale.freshness, DataFreshness::Stale { ref reason } if reason.contains("HTTP 503")));

        let metrics = service.metrics().await;
        assert_eq!(metrics.stale_fallbacks, 1);
        assert_eq!(metrics.failed_requests, 1);
    }

    #[tokio::test]
    async fn test_first_call_without_network_is_unavailable() {
        let provider = MockProvider::new();
        provider.set_error("connection refused");
        let service = service_with(&provider);

        let err = service.fetch_top_coins(10).await.unwrap_err();
        assert!(matches!(err, MarketDataError::DataUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_refresh_bypasses_fresh_cache() {
        let provider = MockProvider::with_coins(five_coins());
        let service = service_with(&provider);

        service.fetch_top_coins(5).await.unwrap();
        let refreshed = service.refresh(5).await.unwrap();

        assert_eq!(provider.call_count(), 2);
        assert_eq!(refreshed.freshness, DataFreshness::Live);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_older_fetch_does_not_overwrite_newer() {
        let provider = MockProvider::with_coins(vec![coin("bitcoin", 1, Some(1.0))]);
        provider.set_delay(Some(Duration::from_secs(5)));
        let service = service_with(&provider);

        let slow = {
            let service = service.clone();
            tokio::spawn(async move { service.refresh(5).await })
        };
        settle().await;

        provider.set_delay(None);
        provider.set_coins(vec![coin("ethereum", 1, Some(2.0))]);
        tokio::time::advance(Duration::from_secs(1)).await;
        let fast = service.refresh(5).await.unwrap();
        assert_eq!(fast.coins[0].id, "ethereum");

        let slow = slow.await.unwrap().unwrap();
        assert_eq!(slow.coins[0].id, "ethereum");
        assert_eq!(slow.freshness, DataFreshness::Cached);
        assert_eq!(service.latest_snapshot().await.unwrap().coins[0].id, "ethereum");
    }

    #[tokio::test]
    async fn test_top_movers_scenario() {
        let provider = MockProvider::with_coins(five_coins());
        let service = service_with(&provider);

        let movers = service.top_movers(5, 2).await.unwrap();
        let gainers: Vec<&str> = movers.gainers.iter().map(|c| c.id.as_str()).collect();
        let losers: Vec<&str> = movers.losers.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(gainers, vec!["solana", "bitcoin"]);
        assert_eq!(losers, vec!["cardano", "ethereum"]);
    }

    #[tokio::test]
    async fn test_search_uses_latest_snapshot() {
        let provider = MockProvider::with_coins(five_coins());
        let service = service_with(&provider);
        assert!(service.search("sol").await.is_empty());

        service.fetch_top_coins(5).await.unwrap();
        let found = service.search("SOL").await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "solana");
    }

    #[tokio::test]
    async fn test_health_check_states() {
        let provider = MockProvider::with_coins(five_coins());
        let clock = Arc::new(ManualClock::new());
        let service = manual_service(&provider, clock.clone());

        assert_eq!(service.health_check().await.status, HealthStatus::Unhealthy);

        service.fetch_top_coins(5).await.unwrap();
        assert_eq!(service.health_check().await.status, HealthStatus::Healthy);

        provider.set_error("HTTP 500");
        clock.advance(TTL);
        service.fetch_top_coins(5).await.unwrap();
        assert_eq!(service.health_check().await.status, HealthStatus::Degraded);

        provider.set_coins(five_coins());
        service.refresh(5).await.unwrap();
        clock.advance(Duration::from_secs(301));
        let health = service.health_check().await;
        assert_eq!(health.status, HealthStatus::Degraded);
        assert_eq!(health.details["cached_coins"], serde_json::json!(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_notifies_every_ttl() {
        let provider = MockProvider::with_coins(five_coins());
        let service = service_with(&provider);
        let (subscription, notified) = counting_subscriber(&service);
        assert!(service.is_polling());

        // nothing happens before the first tick
        tokio::time::sleep(TTL - Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(provider.call_count(), 0);

        tokio::time::sleep(Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(provider.call_count(), 1);
        assert_eq!(notified.load(Ordering::SeqCst), 1);
        assert_eq!(provider.last_limit(), Some(10));

        tokio::time::sleep(TTL).await;
        settle().await;
        assert_eq!(provider.call_count(), 2);
        assert_eq!(notified.load(Ordering::SeqCst), 2);

        subscription.unsubscribe();
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_requests_after_last_unsubscribe() {
        let provider = MockProvider::with_coins(five_coins());
        let service = service_with(&provider);
        let (first, _) = counting_subscriber(&service);
        let (second, _) = counting_subscriber(&service);

        tokio::time::sleep(TTL).await;
        settle().await;
        assert_eq!(provider.call_count(), 1);

        first.unsubscribe();
        assert!(service.is_polling());
        second.unsubscribe();
        assert_eq!(service.subscriber_count(), 0);
        settle().await;
        assert!(!service.is_polling());

        tokio::time::sleep(TTL * 5).await;
        settle().await;
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hidden_ticks_do_nothing() {
        let provider = MockProvider::with_coins(five_coins());
        let visibility = Arc::new(Visibility::new(false));
        let service = MarketDataService::builder(config())
            .provider(Arc::new(provider.clone()))
            .visibility(visibility.clone())
            .build()
            .unwrap();
        let (_subscription, notified) = counting_subscriber(&service);

        tokio::time::sleep(TTL * 3).await;
        settle().await;
        assert_eq!(provider.call_count(), 0);
        assert_eq!(notified.load(Ordering::SeqCst), 0);

        // becoming visible catches up immediately
        visibility.set_visible(true);
        settle().await;
        assert_eq!(provider.call_count(), 1);
        assert_eq!(notified.load(Ordering::SeqCst), 1);

        // a quick hide/show right after is within the min fetch interval
        visibility.set_visible(false);
        settle().await;
        visibility.set_visible(true);
        settle().await;
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_tick_notifies_nobody() {
        let provider = MockProvider::new();
        provider.set_error("offline");
        let service = service_with(&provider);
        let (_subscription, notified) = counting_subscriber(&service);

        tokio::time::sleep(TTL).await;
        settle().await;
        assert_eq!(provider.call_count(), 1);
        assert_eq!(notified.load(Ordering::SeqCst), 0);

        // the next tick delivers stale data once something was cached
        provider.set_coins(five_coins());
        service.refresh(5).await.unwrap();
        provider.set_error("offline");
        tokio::time::sleep(TTL).await;
        settle().await;
        assert_eq!(notified.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_and_start() {
        let provider = MockProvider::with_coins(five_coins());
        let service = service_with(&provider);
        let (subscription, _) = counting_subscriber(&service);

        service.stop();
        settle().await;
        assert!(!service.is_polling());
        assert_eq!(service.subscriber_count(), 0);
        drop(subscription);

        let (_again, notified) = counting_subscriber(&service);
        assert!(!service.is_polling());
        tokio::time::sleep(TTL * 2).await;
        settle().await;
        assert_eq!(provider.call_count(), 0);

        service.start();
        assert!(service.is_polling());
        tokio::time::sleep(TTL).await;
        settle().await;
        assert_eq!(notified.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_coin_detail_is_cached_per_coin() {
        let provider = MockProvider::with_coins(five_coins());
        let clock = Arc::new(ManualClock::new());
        let service = manual_service(&provider, clock.clone());

        let detail = service.coin_detail("solana").await.unwrap();
        assert_eq!(detail.market_cap_rank, Some(3));
        assert_eq!(detail.current_price, Some(300.0));

        clock.advance(Duration::from_secs(59));
        service.coin_detail(" Solana ").await.unwrap();
        assert_eq!(provider.lookup_count(), 1);

        service.coin_detail("bitcoin").await.unwrap();
        assert_eq!(provider.lookup_count(), 2);

        clock.advance(Duration::from_secs(1));
        service.coin_detail("solana").await.unwrap();
        assert_eq!(provider.lookup_count(), 3);
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_coin_detail_rejects_bad_ids_and_reports_failures() {
        let provider = MockProvider::with_coins(five_coins());
        let service = service_with(&provider);

        for id in ["", "../markets", "bit coin"] {
            assert!(matches!(
                service.coin_detail(id).await,
                Err(MarketDataError::InvalidRequest { .. })
            ));
        }
        assert_eq!(provider.lookup_count(), 0);

        assert!(matches!(
            service.coin_detail("delisted").await,
            Err(MarketDataError::DataUnavailable { ref reason }) if reason.contains("404")
        ));
    }

    #[tokio::test]
    async fn test_market_chart_cached_per_range() {
        let provider = MockProvider::with_coins(five_coins());
        let service = service_with(&provider);

        let week = service.market_chart("bitcoin", 7).await.unwrap();
        assert_eq!(week.prices.len(), 8);
        assert!(week.prices.windows(2).all(|w| w[0].timestamp < w[1].timestamp));

        service.market_chart("bitcoin", 30).await.unwrap();
        service.market_chart("bitcoin", 7).await.unwrap();
        assert_eq!(provider.lookup_count(), 2);

        for days in [0, 366] {
            assert!(matches!(
                service.market_chart("bitcoin", days).await,
                Err(MarketDataError::InvalidRequest { .. })
            ));
        }
    }

    #[tokio::test]
    async fn test_markets_page_is_unfiltered_and_separate() {
        let mut coins = five_coins();
        coins.insert(2, coin("dogecoin", 3, Some(8.0)));
        let provider = MockProvider::with_coins(coins);
        let service = service_with(&provider);

        let page: Vec<String> = service.markets_page(2, 2).await.unwrap().into_iter().map(|c| c.id).collect();
        assert_eq!(page, vec!["dogecoin", "solana"]);

        service.markets_page(2, 2).await.unwrap();
        assert_eq!(provider.call_count(), 1);
        assert!(service.latest_snapshot().await.is_none());

        assert!(matches!(
            service.markets_page(2, 0).await,
            Err(MarketDataError::InvalidRequest { .. })
        ));
        assert!(matches!(
            service.markets_page(0, 1).await,
            Err(MarketDataError::InvalidArgument { .. })
        ));
    }

    #[tokio::test]
    async fn test_independent_instances_share_nothing() {
        let provider = MockProvider::with_coins(five_coins());
        let a = service_with(&provider);
        let b = service_with(&provider);

        a.fetch_top_coins(5).await.unwrap();
        assert!(b.latest_snapshot().await.is_none());
        b.fetch_top_coins(5).await.unwrap();
        assert_eq!(provider.call_count(), 2);
    }
}
