use super::BackoffPolicy;
use crate::metrics::CounterMetrics;
use crate::utils::BusError;
use std::time::Duration;

#[test]
fn test_exponential_delays() {
    let policy = BackoffPolicy::new(5, Duration::from_millis(100));
    assert_eq!(policy.delay_for(1), Duration::from_millis(100));
    assert_eq!(policy.delay_for(2), Duration::from_millis(200));
    assert_eq!(policy.delay_for(3), Duration::from_millis(400));
    assert_eq!(policy.delay_for(4), Duration::from_millis(800));
}

#[test]
fn test_huge_attempt_does_not_overflow() {
    let policy = BackoffPolicy::new(u32::MAX, Duration::from_secs(1));
    assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(1 << 16));
}

#[test]
fn test_max_attempts_is_at_least_one() {
    assert_eq!(BackoffPolicy::new(0, Duration::ZERO).max_attempts(), 1);
    assert_eq!(BackoffPolicy::no_retry().max_attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_run_retries_until_success() {
    let policy = BackoffPolicy::new(4, Duration::from_millis(100));
    let metrics = CounterMetrics::new();
    let mut calls = 0u32;
    let started = tokio::time::Instant::now();

    let result = policy
        .run("connect", &metrics, &mut calls, |calls| {
            Box::pin(async move {
                *calls += 1;
                if *calls < 3 {
                    Err(BusError::Transport("refused".into()))
                } else {
                    Ok(*calls)
                }
            })
        })
        .await;

    assert_eq!(result.unwrap(), 3);
    assert_eq!(calls, 3);
    // 100ms + 200ms of backoff
    assert!(started.elapsed() >= Duration::from_millis(300));
    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.retry_attempts.get("connect"), Some(&2));
}

#[tokio::test(start_paused = true)]
async fn test_run_returns_last_error_when_exhausted() {
    let policy = BackoffPolicy::new(3, Duration::from_millis(10));
    let metrics = CounterMetrics::new();
    let mut calls = 0u32;

    let result: Result<(), BusError> = policy
        .run("publish", &metrics, &mut calls, |calls| {
            Box::pin(async move {
                *calls += 1;
                Err(BusError::Transport(format!("failure {calls}")))
            })
        })
        .await;

    assert_eq!(calls, 3);
    match result {
        Err(BusError::Transport(msg)) => assert_eq!(msg, "failure 3"),
        other => panic!("expected transport error, got {other:?}"),
    }
    assert_eq!(metrics.snapshot().retry_attempts.get("publish"), Some(&2));
}

#[tokio::test]
async fn test_no_retry_runs_once() {
    let metrics = CounterMetrics::new();
    let mut calls = 0u32;
    let result: Result<(), BusError> = BackoffPolicy::no_retry()
        .run("subscribe", &metrics, &mut calls, |calls| {
            Box::pin(async move {
                *calls += 1;
                Err(BusError::timeout(Duration::from_secs(1), "sub_ack"))
            })
        })
        .await;
    assert!(matches!(result, Err(BusError::Timeout { .. })));
    assert_eq!(calls, 1);
    assert!(metrics.snapshot().retry_attempts.is_empty());
}
