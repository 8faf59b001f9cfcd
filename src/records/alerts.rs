//! Price alerts evaluated against snapshot prices

use crate::{
    constants::ALERTS_STORAGE_KEY,
    error::StorageError,
    repository::{Record, Repository, StorageBackend},
    types::Coin,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertDirection {
    /// Fires when the price reaches or exceeds the target
    Above,
    /// Fires when the price reaches or drops below the target
    Below,
}

impl AlertDirection {
    pub fn is_met(&self, price: f64, target: f64) -> bool {
        match self {
            AlertDirection::Above => price >= target,
            AlertDirection::Below => price <= target,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub coin_id: String,
    pub coin_name: String,
    pub coin_symbol: String,
    pub direction: AlertDirection,
    pub target_price: f64,
    pub created_at: DateTime<Utc>,
    pub triggered: bool,
}

impl Record for Alert {
    fn record_id(&self) -> &str {
        &self.id
    }
}

/// Input for [`Alerts::add`]
#[derive(Debug, Clone)]
pub struct NewAlert {
    pub coin_id: String,
    pub coin_name: String,
    pub coin_symbol: String,
    pub direction: AlertDirection,
    pub target_price: f64,
}

/// Alerts fire once; a triggered alert stays in the list until deleted
pub struct Alerts {
    repo: Repository<Alert>,
}

impl Alerts {
    pub async fn open(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            repo: Repository::open(backend, ALERTS_STORAGE_KEY).await,
        }
    }

    pub async fn add(&self, alert: NewAlert) -> Result<Alert, StorageError> {
        let alert = Alert {
            id: Uuid::new_v4().to_string(),
            coin_id: alert.coin_id,
            coin_name: alert.coin_name,
            coin_symbol: alert.coin_symbol,
            direction: alert.direction,
            target_price: alert.target_price,
            created_at: Utc::now(),
            triggered: false,
        };
        self.repo.upsert(alert.clone()).await?;
        Ok(alert)
    }

    pub async fn delete(&self, id: &str) -> Result<bool, StorageError> {
        self.repo.delete(id).await
    }

    /// Marks an alert as triggered
    pub async fn trigger(&self, id: &str) -> Result<Option<Alert>, StorageError> {
        self.repo.update(id, |alert| alert.triggered = true).await
    }

    pub async fn alerts(&self) -> Vec<Alert> {
        self.repo.all().await
    }

    /// Triggers the pending alerts for `coin_id` whose condition `price` meets
    ///
    /// Returns the alerts that fired on this call.
    pub async fn check(&self, coin_id: &str, price: f64) -> Result<Vec<Alert>, StorageError> {
        self.fire(&HashMap::from([(coin_id, price)])).await
    }

    /// Checks every coin in a snapshot in one pass
    pub async fn check_snapshot(&self, coins: &[Coin]) -> Result<Vec<Alert>, StorageError> {
        let prices: HashMap<&str, f64> = coins
            .iter()
            .map(|c| (c.id.as_str(), c.current_price))
            .collect();
        self.fire(&prices).await
    }

    /// Marks every pending alert met by `prices` as triggered
    ///
    /// Selection and marking share one repository write, so an alert is
    /// returned by exactly one call.
    async fn fire(&self, prices: &HashMap<&str, f64>) -> Result<Vec<Alert>, StorageError> {
        let fired = self
            .repo
            .update_where(
                |a| {
                    !a.triggered
                        && prices
                            .get(a.coin_id.as_str())
                            .is_some_and(|price| a.direction.is_met(*price, a.target_price))
                },
                |a| a.triggered = true,
            )
            .await?;

        for alert in &fired {
            tracing::info!(
                coin = %alert.coin_id,
                target = alert.target_price,
                price = prices.get(alert.coin_id.as_str()).copied(),
                direction = ?alert.direction,
                "Price alert triggered"
            );
        }
        Ok(fired)
    }
}
