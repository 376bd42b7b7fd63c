use std::sync::Arc;
use std::time::Duration;

use orderflow::client::MemoryBroker;
use orderflow::config::Settings;
use orderflow::connection::ConnectionState;
use orderflow::metrics::CounterMetrics;
use orderflow::orders::{NEW_ORDERS_TOPIC, Order, OrderProcessor, OrderStatus};

fn settings() -> Settings {
    let mut settings = Settings::default();
    settings.retry.base_delay_ms = 100;
    settings.connection.reconnect_cooldown_ms = 1000;
    settings
}

async fn wait_for_processed(broker: &MemoryBroker, order: &Order) -> Order {
    for _ in 0..200 {
        if let Some(payload) = broker.published_to(&order.processed_topic()).first() {
            return Order::from_json(payload).expect("processed order");
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("order {} was never processed", order.order_id);
}

#[tokio::test(start_paused = true)]
async fn processing_survives_a_dropped_connection() {
    let broker = MemoryBroker::new();
    let metrics = Arc::new(CounterMetrics::new());
    let processor = OrderProcessor::from_settings(&settings(), Arc::new(broker.clone()), metrics.clone());
    processor.start_processing().await.unwrap();

    let mut subscriber_state = processor.subscriber().connection().watch_state();
    assert_eq!(broker.drop_connections("broker restarted"), 2);
    subscriber_state
        .wait_for(|state| *state == ConnectionState::Disconnected)
        .await
        .unwrap();
    subscriber_state
        .wait_for(|state| *state == ConnectionState::Connected)
        .await
        .unwrap();
    assert!(broker.is_subscribed(NEW_ORDERS_TOPIC));

    let order = Order::new("Grace", "Compiler");
    broker.inject(NEW_ORDERS_TOPIC, serde_json::to_vec(&order).unwrap());

    let processed = wait_for_processed(&broker, &order).await;
    assert_eq!(processed.status, OrderStatus::Processed);
    assert_eq!(metrics.snapshot().processed, 1);
    assert_eq!(broker.clients_created(), 2);

    processor.stop_processing().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn publisher_recovers_when_the_broker_comes_back() {
    let broker = MemoryBroker::new();
    let metrics = Arc::new(CounterMetrics::new());
    let processor = OrderProcessor::from_settings(&settings(), Arc::new(broker.clone()), metrics.clone());
    processor.start_processing().await.unwrap();

    // The autonomous reconnect of both roles gives up while the broker is down.
    broker.set_offline(true);
    broker.drop_connections("broker down");
    let mut publisher_state = processor.publisher().connection().watch_state();
    publisher_state
        .wait_for(|state| *state == ConnectionState::Reconnecting)
        .await
        .unwrap();
    publisher_state
        .wait_for(|state| *state == ConnectionState::Disconnected)
        .await
        .unwrap();
    assert!(metrics.snapshot().retry_attempts["reconnect"] >= 3);

    // The next publish reconnects on demand.
    broker.set_offline(false);
    processor
        .publisher()
        .publish("orders/audit", "back online")
        .await
        .unwrap();
    assert_eq!(broker.published_to("orders/audit").len(), 1);
}
