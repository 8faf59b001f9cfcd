//! In-memory caches: the top-coins snapshot and keyed lookups

use crate::types::Coin;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// One filtered batch of coins from a successful fetch
///
/// Entries are immutable; a newer fetch replaces the whole entry.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Filtered coins in market cap order
    pub coins: Arc<[Coin]>,

    /// Monotonic instant the producing request was issued
    pub captured_at: Instant,

    /// Wall-clock time the producing request was issued
    pub fetched_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(coins: Vec<Coin>, captured_at: Instant, fetched_at: DateTime<Utc>) -> Self {
        Self {
            coins: coins.into(),
            captured_at,
            fetched_at,
        }
    }

    /// Whether the entry is still within `ttl` at `now`
    pub fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.captured_at) < ttl
    }

    /// Time elapsed since capture
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.captured_at)
    }
}

/// Holds the latest cache entry
#[derive(Debug, Default)]
pub struct SnapshotCache {
    entry: RwLock<Option<Arc<CacheEntry>>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The entry if it has not expired
    pub async fn fresh(&self, now: Instant, ttl: Duration) -> Option<Arc<CacheEntry>> {
        let entry = self.entry.read().await;
        entry.as_ref().filter(|e| e.is_fresh(now, ttl)).cloned()
    }

    /// The entry regardless of age
    pub async fn latest(&self) -> Option<Arc<CacheEntry>> {
        self.entry.read().await.clone()
    }

    /// Stores `candidate` unless the current entry was captured later
    ///
    /// Returns the entry that is current after the call.
    pub async fn replace_if_newer(&self, candidate: CacheEntry) -> Arc<CacheEntry> {
        let mut entry = self.entry.write().await;
        match entry.as_ref() {
            Some(current) if current.captured_at > candidate.captured_at => {
                tracing::debug!(
                    newer_by_ms = current
                        .captured_at
                        .saturating_duration_since(candidate.captured_at)
                        .as_millis() as u64,
                    "Discarding out-of-order fetch result"
                );
                current.clone()
            }
            _ => {
                let candidate = Arc::new(candidate);
                *entry = Some(candidate.clone());
                candidate
            }
        }
    }
}

struct KeyedEntry<V> {
    value: Arc<V>,
    captured_at: Instant,
}

/// TTL cache for lookups addressed by key, such as coin details and charts
///
/// Like [`SnapshotCache`], a result whose request was issued earlier than the
/// stored one does not replace it.
pub struct KeyedCache<V> {
    entries: RwLock<HashMap<String, KeyedEntry<V>>>,
}

impl<V> Default for KeyedCache<V> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<V> KeyedCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The value under `key` if it is younger than `ttl` at `now`
    pub async fn fresh(&self, key: &str, now: Instant, ttl: Duration) -> Option<Arc<V>> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|e| now.saturating_duration_since(e.captured_at) < ttl)
            .map(|e| e.value.clone())
    }

    /// Stores `value` under `key` and evicts entries that expired by `now`
    ///
    /// Returns the value that is current for `key` after the call.
    pub async fn insert(
        &self,
        key: String,
        value: V,
        captured_at: Instant,
        now: Instant,
        ttl: Duration,
    ) -> Arc<V> {
        let mut entries = self.entries.write().await;
        entries.retain(|k, e| *k == key || now.saturating_duration_since(e.captured_at) < ttl);

        if let Some(current) = entries.get(&key) {
            if current.captured_at > captured_at {
                return current.value.clone();
            }
        }
        let value = Arc::new(value);
        entries.insert(
            key,
            KeyedEntry {
                value: value.clone(),
                captured_at,
            },
        );
        value
    }
}
