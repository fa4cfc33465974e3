//! Per-key exponential backoff

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::Duration;

pub struct Backoff<T> {
    base: Duration,
    max: Duration,
    failures: Mutex<HashMap<T, u32>>,
}

impl<T: Eq + Hash> Backoff<T> {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Records a failure of `item` and returns how long to wait before retrying
    ///
    /// The n-th consecutive failure waits `base * 2^(n-1)`, capped at `max`.
    pub fn next_delay(&self, item: T) -> Duration {
        let mut failures = self
            .failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let count = failures.entry(item).or_insert(0);
        let exponent = (*count).min(31);
        *count = count.saturating_add(1);

        self.base
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max)
    }

    /// Clears the failure history of `item`
    pub fn forget(&self, item: &T) {
        self.failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(item);
    }

    pub fn failures(&self, item: &T) -> u32 {
        self.failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(item)
            .copied()
            .unwrap_or(0)
    }
}
