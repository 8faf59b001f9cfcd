//! Portfolio positions and their valuation against a snapshot

use crate::{
    constants::PORTFOLIO_STORAGE_KEY,
    error::StorageError,
    repository::{Record, Repository, StorageBackend},
    types::Coin,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// A holding bought at a known price
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub coin_id: String,
    pub coin_name: String,
    pub coin_symbol: String,
    pub amount: f64,
    pub purchase_price: f64,
    pub purchase_date: DateTime<Utc>,
}

impl Position {
    /// Amount times purchase price
    pub fn cost_basis(&self) -> f64 {
        self.amount * self.purchase_price
    }
}

impl Record for Position {
    fn record_id(&self) -> &str {
        &self.id
    }
}

/// Input for [`Portfolio::add`]
#[derive(Debug, Clone)]
pub struct NewPosition {
    pub coin_id: String,
    pub coin_name: String,
    pub coin_symbol: String,
    pub amount: f64,
    pub purchase_price: f64,
    pub purchase_date: DateTime<Utc>,
}

/// Fields to change in [`Portfolio::update`]; `None` leaves a field as is
#[derive(Debug, Clone, Default)]
pub struct PositionUpdate {
    pub amount: Option<f64>,
    pub purchase_price: Option<f64>,
    pub purchase_date: Option<DateTime<Utc>>,
}

/// Portfolio value at snapshot prices
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioValuation {
    pub total_invested: f64,
    pub current_value: f64,
    pub profit_loss: f64,
    /// Profit/loss relative to the amount invested, 0 when nothing was invested
    pub profit_loss_percent: f64,
    /// Coin ids that had no price in the snapshot
    pub unpriced: Vec<String>,
}

pub struct Portfolio {
    repo: Repository<Position>,
}

impl Portfolio {
    pub async fn open(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            repo: Repository::open(backend, PORTFOLIO_STORAGE_KEY).await,
        }
    }

    pub async fn add(&self, position: NewPosition) -> Result<Position, StorageError> {
        let position = Position {
            id: Uuid::new_v4().to_string(),
            coin_id: position.coin_id,
            coin_name: position.coin_name,
            coin_symbol: position.coin_symbol,
            amount: position.amount,
            purchase_price: position.purchase_price,
            purchase_date: position.purchase_date,
        };
        self.repo.upsert(position.clone()).await?;
        Ok(position)
    }

    pub async fn update(&self, id: &str, update: PositionUpdate) -> Result<Option<Position>, StorageError> {
        self.repo
            .update(id, |position| {
                if let Some(amount) = update.amount {
                    position.amount = amount;
                }
                if let Some(price) = update.purchase_price {
                    position.purchase_price = price;
                }
                if let Some(date) = update.purchase_date {
                    position.purchase_date = date;
                }
            })
            .await
    }

    pub async fn delete(&self, id: &str) -> Result<bool, StorageError> {
        self.repo.delete(id).await
    }

    pub async fn positions(&self) -> Vec<Position> {
        self.repo.all().await
    }

    pub async fn total_invested(&self) -> f64 {
        self.repo.all().await.iter().map(Position::cost_basis).sum()
    }

    /// Values every position at the matching coin's current price
    pub async fn valuation(&self, coins: &[Coin]) -> PortfolioValuation {
        let prices: HashMap<&str, f64> = coins
            .iter()
            .map(|c| (c.id.as_str(), c.current_price))
            .collect();

        let positions = self.repo.all().await;
        let total_invested: f64 = positions.iter().map(Position::cost_basis).sum();
        let mut current_value = 0.0;
        let mut unpriced = Vec::new();

        for position in &positions {
            match prices.get(position.coin_id.as_str()) {
                Some(price) => current_value += position.amount * price,
                None => {
                    if !unpriced.contains(&position.coin_id) {
                        unpriced.push(position.coin_id.clone());
                    }
                }
            }
        }

        let profit_loss = current_value - total_invested;
        let profit_loss_percent = if total_invested > 0.0 {
            profit_loss / total_invested * 100.0
        } else {
            0.0
        };

        PortfolioValuation {
            total_invested,
            current_value,
            profit_loss,
            profit_loss_percent,
            unpriced,
        }
    }
}
