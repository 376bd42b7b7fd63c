use super::{CounterMetrics, Metrics, NoopMetrics, ProcessingStats};
use std::time::Duration;

#[test]
fn test_counter_metrics_accumulate() {
    let metrics = CounterMetrics::new();
    metrics.increment_processed();
    metrics.increment_processed();
    metrics.increment_failed();
    metrics.increment_orders_created();
    metrics.record_queue_length(3);
    metrics.record_processing_time("order-1", Duration::from_millis(20));
    metrics.increment_retry_attempt("connect");
    metrics.record_retry_delay("connect", Duration::from_secs(5));
    metrics.record_retry_delay("connect", Duration::from_secs(10));

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.processed, 2);
    assert_eq!(snapshot.failed, 1);
    assert_eq!(snapshot.orders_created, 1);
    assert_eq!(snapshot.queue_length, 3);
    assert_eq!(
        snapshot.processing_times.get("order-1"),
        Some(&ProcessingStats {
            count: 1,
            total: Duration::from_millis(20),
            last: Duration::from_millis(20),
        })
    );
    assert_eq!(snapshot.retry_attempts.get("connect"), Some(&1));
    assert_eq!(snapshot.retry_delay.get("connect"), Some(&Duration::from_secs(15)));
}

#[test]
fn test_processing_times_stay_summarized() {
    let metrics = CounterMetrics::new();
    for i in 0..100_000u64 {
        metrics.record_processing_time("orders/new", Duration::from_micros(i % 10));
    }
    metrics.record_processing_time("orders/new", Duration::from_millis(4));

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.processing_times.len(), 1);
    let stats = snapshot.processing_times["orders/new"];
    assert_eq!(stats.count, 100_001);
    assert_eq!(stats.last, Duration::from_millis(4));
    // 10_000 rounds of 0..10us plus the final 4ms sample.
    assert_eq!(stats.total, Duration::from_micros(450_000 + 4_000));
    assert_eq!(stats.average(), Duration::from_nanos(454_000_000 / 100_001));
}

#[test]
fn test_processing_stats_average_of_nothing_is_zero() {
    assert_eq!(ProcessingStats::default().average(), Duration::ZERO);
}

#[test]
fn test_noop_metrics_accepts_everything() {
    let metrics: &dyn Metrics = &NoopMetrics;
    metrics.increment_processed();
    metrics.record_retry_delay("publish", Duration::from_secs(1));
}
