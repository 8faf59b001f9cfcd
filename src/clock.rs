//! Time source used for cache expiry and fetch ordering

use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Monotonic and wall-clock time
///
/// The monotonic side drives TTL checks and newest-wins cache replacement; the
/// wall clock only stamps snapshots for display.
pub trait Clock: Send + Sync {
    /// Monotonic now
    fn now(&self) -> Instant;

    /// Wall-clock now
    fn wall_clock(&self) -> DateTime<Utc>;
}

/// Clock backed by the Tokio timer, so paused test time applies to it
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
pub mod manual {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Clock that only moves when told to
    pub struct ManualClock {
        base: Instant,
        base_wall: DateTime<Utc>,
        offset: Mutex<Duration>,
    }

    impl ManualClock {
        pub fn new() -> Self {
            Self {
                base: Instant::now(),
                base_wall: Utc::now(),
                offset: Mutex::new(Duration::ZERO),
            }
        }

        pub fn advance(&self, by: Duration) {
            *self.offset.lock().unwrap() += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            self.base + *self.offset.lock().unwrap()
        }

        fn wall_clock(&self) -> DateTime<Utc> {
            let offset = *self.offset.lock().unwrap();
            self.base_wall + chrono::Duration::from_std(offset).unwrap_or_default()
        }
    }
}
