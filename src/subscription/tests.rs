use super::{MessageHandler, Subscription, SubscriptionRegistry, handler_fn};
use crate::client::InboundMessage;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn counting_handler() -> (Arc<dyn MessageHandler>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let handler = handler_fn(move |_msg: InboundMessage| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, anyhow::Error>(())
        }
    });
    (handler, calls)
}

#[test]
fn test_new_registry_is_empty() {
    let registry = SubscriptionRegistry::new();
    assert!(registry.current().is_none());
    assert!(!registry.is_armed());
    assert!(registry.reader().handler_for("orders/new").is_none());
}

#[test]
fn test_replace_keeps_a_single_record() {
    let mut registry = SubscriptionRegistry::new();
    let (first, _) = counting_handler();
    let (second, _) = counting_handler();

    assert!(registry.replace(Subscription::new("orders/new", first)).is_none());
    let previous = registry.replace(Subscription::new("orders/error", second));

    assert_eq!(previous.map(|sub| sub.topic), Some("orders/new".to_string()));
    assert_eq!(registry.topic().as_deref(), Some("orders/error"));
    assert!(registry.is_armed_for("orders/error"));
    assert!(!registry.is_armed_for("orders/new"));
}

#[test]
fn test_disarm_keeps_record_for_resubscription() {
    let mut registry = SubscriptionRegistry::new();
    let (handler, _) = counting_handler();
    registry.replace(Subscription::new("orders/new", handler));

    registry.disarm();
    assert!(!registry.is_armed_for("orders/new"));
    assert_eq!(registry.topic().as_deref(), Some("orders/new"));

    registry.mark_armed();
    assert!(registry.is_armed_for("orders/new"));
}

#[test]
fn test_clear_removes_record() {
    let mut registry = SubscriptionRegistry::new();
    let (handler, _) = counting_handler();
    registry.replace(Subscription::new("orders/new", handler));
    let reader = registry.reader();

    registry.clear();
    assert!(reader.topic().is_none());
    registry.mark_armed();
    assert!(!registry.is_armed());
}

#[tokio::test]
async fn test_reader_sees_handler_for_matching_topic_only() {
    let mut registry = SubscriptionRegistry::new();
    let reader = registry.reader();
    let (handler, calls) = counting_handler();
    registry.replace(Subscription::new("orders/new", handler));

    assert!(reader.handler_for("orders/error").is_none());
    let handler = reader.handler_for("orders/new").expect("handler");
    handler
        .handle(InboundMessage::new("orders/new", b"{}".to_vec()))
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
