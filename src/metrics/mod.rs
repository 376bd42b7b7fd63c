//! The `metrics` module defines the sink the core reports observable side
//! effects to.
//!
//! Every component works unchanged against `NoopMetrics`; `CounterMetrics`
//! keeps in-process counters that the CLI summarizes on shutdown. Exporting
//! these numbers to an external system is left to whoever wires the crate up.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

pub trait Metrics: Send + Sync {
    fn record_processing_time(&self, key: &str, duration: Duration);
    fn increment_processed(&self);
    fn increment_failed(&self);
    fn record_queue_length(&self, length: usize);
    fn increment_orders_created(&self);
    fn increment_retry_attempt(&self, operation: &str);
    fn record_retry_delay(&self, operation: &str, delay: Duration);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl Metrics for NoopMetrics {
    fn record_processing_time(&self, _key: &str, _duration: Duration) {}
    fn increment_processed(&self) {}
    fn increment_failed(&self) {}
    fn record_queue_length(&self, _length: usize) {}
    fn increment_orders_created(&self) {}
    fn increment_retry_attempt(&self, _operation: &str) {}
    fn record_retry_delay(&self, _operation: &str, _delay: Duration) {}
}

/// In-process counters.
#[derive(Debug, Default)]
pub struct CounterMetrics {
    processed: AtomicU64,
    failed: AtomicU64,
    orders_created: AtomicU64,
    queue_length: AtomicUsize,
    processing_times: Mutex<HashMap<String, ProcessingStats>>,
    retries: Mutex<HashMap<String, RetryStats>>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct RetryStats {
    attempts: u64,
    total_delay: Duration,
}

/// Running summary of the processing times recorded under one key.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProcessingStats {
    pub count: u64,
    pub total: Duration,
    pub last: Duration,
}

impl ProcessingStats {
    fn record(&mut self, duration: Duration) {
        self.count += 1;
        self.total = self.total.saturating_add(duration);
        self.last = duration;
    }

    pub fn average(&self) -> Duration {
        match u32::try_from(self.count) {
            Ok(0) => Duration::ZERO,
            Ok(count) => self.total / count,
            Err(_) => self.total.div_f64(self.count as f64),
        }
    }
}

/// Point-in-time copy of `CounterMetrics`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub processed: u64,
    pub failed: u64,
    pub orders_created: u64,
    pub queue_length: usize,
    pub processing_times: HashMap<String, ProcessingStats>,
    pub retry_attempts: HashMap<String, u64>,
    pub retry_delay: HashMap<String, Duration>,
}

impl CounterMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let processing_times = self
            .processing_times
            .lock()
            .map(|times| times.clone())
            .unwrap_or_default();
        let retries = self
            .retries
            .lock()
            .map(|retries| retries.clone())
            .unwrap_or_default();

        MetricsSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            orders_created: self.orders_created.load(Ordering::Relaxed),
            queue_length: self.queue_length.load(Ordering::Relaxed),
            processing_times,
            retry_attempts: retries
                .iter()
                .map(|(op, stats)| (op.clone(), stats.attempts))
                .collect(),
            retry_delay: retries
                .iter()
                .map(|(op, stats)| (op.clone(), stats.total_delay))
                .collect(),
        }
    }
}

impl Metrics for CounterMetrics {
    fn record_processing_time(&self, key: &str, duration: Duration) {
        if let Ok(mut times) = self.processing_times.lock() {
            times.entry(key.to_string()).or_default().record(duration);
        }
    }

    fn increment_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_queue_length(&self, length: usize) {
        self.queue_length.store(length, Ordering::Relaxed);
    }

    fn increment_orders_created(&self) {
        self.orders_created.fetch_add(1, Ordering::Relaxed);
    }

    fn increment_retry_attempt(&self, operation: &str) {
        if let Ok(mut retries) = self.retries.lock() {
            retries.entry(operation.to_string()).or_default().attempts += 1;
        }
    }

    fn record_retry_delay(&self, operation: &str, delay: Duration) {
        if let Ok(mut retries) = self.retries.lock() {
            let stats = retries.entry(operation.to_string()).or_default();
            stats.total_delay = stats.total_delay.saturating_add(delay);
        }
    }
}

#[cfg(test)]
mod tests;
