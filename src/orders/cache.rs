//! Processed-order cache
//!
//! Remembers when each order id was last processed so a redelivered order
//! is skipped for `PROCESSED_WINDOW`. Expired entries are dropped whenever
//! `evict_expired` runs, which the pipeline does after every processed
//! order.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

pub const PROCESSED_WINDOW: Duration = Duration::from_secs(5 * 60);

#[derive(Debug)]
pub struct ProcessedOrders {
    entries: Mutex<HashMap<String, DateTime<Utc>>>,
    window: TimeDelta,
}

impl ProcessedOrders {
    pub fn new() -> Self {
        Self::with_window(PROCESSED_WINDOW)
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            window: TimeDelta::from_std(window).unwrap_or(TimeDelta::MAX),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, DateTime<Utc>>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// How long ago `order_id` was processed, if that is within the window.
    pub fn recently_processed(&self, order_id: &str, now: DateTime<Utc>) -> Option<TimeDelta> {
        let processed_at = *self.entries().get(order_id)?;
        let age = now - processed_at;
        (age < self.window).then_some(age)
    }

    pub fn record(&self, order_id: &str, at: DateTime<Utc>) {
        self.entries().insert(order_id.to_string(), at);
    }

    /// Drop entries older than the window. Returns how many were dropped.
    pub fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, processed_at| now - *processed_at <= self.window);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ProcessedOrders {
    fn default() -> Self {
        Self::new()
    }
}
