use super::{DEFAULT_CAPACITY, DedupCache, Fingerprint};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[test]
fn test_fingerprint_is_deterministic() {
    let a = Fingerprint::of(b"{\"orderId\":\"1\"}");
    let b = Fingerprint::of(b"{\"orderId\":\"1\"}");
    let c = Fingerprint::of(b"{\"orderId\":\"2\"}");
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(a.as_str().len(), 64);
}

#[test]
fn test_duplicate_is_rejected() {
    let cache = DedupCache::new();
    let fp = Fingerprint::of(b"payload");
    assert!(cache.should_process(&fp));
    assert!(!cache.should_process(&fp));
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_cache_clears_past_capacity() {
    let cache = DedupCache::new();
    let first = Fingerprint::of(b"message-0");
    assert!(cache.should_process(&first));

    for i in 1..=DEFAULT_CAPACITY {
        assert!(cache.should_process(&Fingerprint::of(format!("message-{i}").as_bytes())));
    }

    // 1001 distinct entries pushed the set over its cap and reset it.
    assert!(cache.is_empty());
    assert!(cache.should_process(&first));
}

#[test]
fn test_cache_keeps_history_up_to_capacity() {
    let cache = DedupCache::with_capacity(3);
    for i in 0..3 {
        assert!(cache.should_process(&Fingerprint::of(&[i])));
    }
    assert_eq!(cache.len(), 3);
    assert!(!cache.should_process(&Fingerprint::of(&[0])));
}

#[test]
fn test_concurrent_duplicates_pass_once() {
    let cache = Arc::new(DedupCache::new());
    let passed = Arc::new(AtomicUsize::new(0));
    let fp = Fingerprint::of(b"same payload");

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = cache.clone();
            let passed = passed.clone();
            let fp = fp.clone();
            std::thread::spawn(move || {
                if cache.should_process(&fp) {
                    passed.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(passed.load(Ordering::SeqCst), 1);
}
