//! Watched coin ids

use crate::{
    constants::WATCHLIST_STORAGE_KEY,
    error::StorageError,
    repository::{Record, Repository, StorageBackend},
    types::Coin,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchlistEntry {
    pub coin_id: String,
    pub added_at: DateTime<Utc>,
}

impl Record for WatchlistEntry {
    fn record_id(&self) -> &str {
        &self.coin_id
    }
}

/// Coins the user follows, in the order they were added
pub struct Watchlist {
    repo: Repository<WatchlistEntry>,
}

impl Watchlist {
    pub async fn open(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            repo: Repository::open(backend, WATCHLIST_STORAGE_KEY).await,
        }
    }

    /// Adds `coin_id`. Returns false if it was already watched.
    pub async fn add(&self, coin_id: &str) -> Result<bool, StorageError> {
        self.repo
            .insert_if_absent(WatchlistEntry {
                coin_id: coin_id.to_string(),
                added_at: Utc::now(),
            })
            .await
    }

    pub async fn remove(&self, coin_id: &str) -> Result<bool, StorageError> {
        self.repo.delete(coin_id).await
    }

    pub async fn contains(&self, coin_id: &str) -> bool {
        self.repo.get(coin_id).await.is_some()
    }

    pub async fn coin_ids(&self) -> Vec<String> {
        self.repo.all().await.into_iter().map(|e| e.coin_id).collect()
    }

    pub async fn entries(&self) -> Vec<WatchlistEntry> {
        self.repo.all().await
    }

    /// The watched coins present in `coins`, keeping snapshot order
    pub async fn select(&self, coins: &[Coin]) -> Vec<Coin> {
        let watched: HashSet<String> = self.coin_ids().await.into_iter().collect();
        coins
            .iter()
            .filter(|c| watched.contains(&c.id))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{FileBackend, MemoryBackend};
    use crate::types::fixtures::coin;

    #[tokio::test]
    async fn test_add_deduplicates() {
        let watchlist = Watchlist::open(Arc::new(MemoryBackend::new())).await;

        assert!(watchlist.add("bitcoin").await.unwrap());
        assert!(watchlist.add("solana").await.unwrap());
        assert!(!watchlist.add("bitcoin").await.unwrap());

        assert_eq!(watchlist.coin_ids().await, vec!["bitcoin", "solana"]);
    }

    #[tokio::test]
    async fn test_concurrent_adds_report_one_insert() {
        let dir = tempfile::tempdir().unwrap();
        let watchlist = Watchlist::open(Arc::new(FileBackend::new(dir.path()))).await;

        let (a, b) = tokio::join!(watchlist.add("bitcoin"), watchlist.add("bitcoin"));
        assert_eq!([a.unwrap(), b.unwrap()].iter().filter(|added| **added).count(), 1);
        assert_eq!(watchlist.entries().await.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_and_persist() {
        let backend: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
        let watchlist = Watchlist::open(backend.clone()).await;
        watchlist.add("bitcoin").await.unwrap();
        watchlist.add("ethereum").await.unwrap();

        assert!(watchlist.remove("bitcoin").await.unwrap());
        assert!(!watchlist.remove("bitcoin").await.unwrap());

        let reopened = Watchlist::open(backend).await;
        assert!(reopened.contains("ethereum").await);
        assert!(!reopened.contains("bitcoin").await);
    }

    #[tokio::test]
    async fn test_select_keeps_snapshot_order() {
        let watchlist = Watchlist::open(Arc::new(MemoryBackend::new())).await;
        watchlist.add("solana").await.unwrap();
        watchlist.add("bitcoin").await.unwrap();
        watchlist.add("delisted").await.unwrap();

        let coins = vec![coin("bitcoin", 1, None), coin("ethereum", 2, None), coin("solana", 3, None)];
        let ids: Vec<String> = watchlist.select(&coins).await.into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["bitcoin", "solana"]);
    }
}
