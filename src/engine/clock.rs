//! Injectable wall-clock so cooldown expiry and scheduling are
//! deterministic under test.

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
pub mod test_clock {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Manually-advanced clock for tests.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        now: Arc<Mutex<DateTime<Utc>>>,
    }

    impl ManualClock {
        pub fn at(now: DateTime<Utc>) -> Self {
            Self { now: Arc::new(Mutex::new(now)) }
        }

        pub fn advance(&self, d: chrono::Duration) {
            let mut now = self.now.lock().unwrap();
            *now += d;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }
    }
}
