//! Persisted dashboard collections built on [`Repository`](crate::repository::Repository)

pub mod alerts;
pub mod portfolio;
pub mod watchlist;

pub use alerts::{Alert, AlertDirection, Alerts, NewAlert};
pub use portfolio::{NewPosition, Portfolio, PortfolioValuation, Position, PositionUpdate};
pub use watchlist::{Watchlist, WatchlistEntry};
