use std::sync::{Arc, Mutex};
use std::time::Duration;

use orderflow::broker::Broker;
use orderflow::client::{InboundMessage, WsClientFactory};
use orderflow::config::Settings;
use orderflow::metrics::{CounterMetrics, NoopMetrics};
use orderflow::orders::{ERROR_TOPIC, NEW_ORDERS_TOPIC, OrderProcessor, OrderService, OrderStatus};
use orderflow::pubsub::{Publisher, Subscriber};
use orderflow::subscription::handler_fn;
use orderflow::transport::serve;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

async fn start_broker() -> Settings {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(serve(listener, Arc::new(Mutex::new(Broker::new()))));

    let mut settings = Settings::default();
    settings.broker.host = addr.ip().to_string();
    settings.broker.port = addr.port();
    settings.retry.base_delay_ms = 50;
    settings.connection.reconnect_cooldown_ms = 100;
    settings.processing.delay_ms = 100;
    settings
}

#[tokio::test]
async fn order_round_trip_over_websocket() {
    let settings = start_broker().await;
    let metrics = Arc::new(CounterMetrics::new());
    let processor = OrderProcessor::from_settings(&settings, Arc::new(WsClientFactory), metrics.clone());
    processor.start_processing().await.expect("start processing");

    let publisher = Publisher::new(&settings, Arc::new(WsClientFactory), Arc::new(NoopMetrics));
    let results = Subscriber::new(&settings, Arc::new(WsClientFactory), Arc::new(NoopMetrics));
    let service = OrderService::new(publisher.clone(), Arc::new(NoopMetrics));

    let order = service
        .submit_and_wait(&results, "Ada", "Lamp", Duration::from_secs(10))
        .await
        .expect("order processed");
    assert_eq!(order.status, OrderStatus::Processed);
    assert_eq!(order.product_name, "Lamp");
    assert_eq!(metrics.snapshot().processed, 1);

    results.disconnect().await.unwrap();
    publisher.disconnect().await.unwrap();
    processor.stop_processing().await.unwrap();
}

#[tokio::test]
async fn malformed_order_reaches_error_topic() {
    let settings = start_broker().await;
    let metrics = Arc::new(CounterMetrics::new());
    let processor = OrderProcessor::from_settings(&settings, Arc::new(WsClientFactory), metrics.clone());
    processor.start_processing().await.expect("start processing");

    let (tx, mut rx) = mpsc::unbounded_channel();
    let errors = Subscriber::new(&settings, Arc::new(WsClientFactory), Arc::new(NoopMetrics));
    errors
        .subscribe(
            ERROR_TOPIC,
            handler_fn(move |msg: InboundMessage| {
                let tx = tx.clone();
                async move {
                    tx.send(msg.payload_str().into_owned())?;
                    Ok::<_, anyhow::Error>(())
                }
            }),
        )
        .await
        .unwrap();

    let publisher = Publisher::new(&settings, Arc::new(WsClientFactory), Arc::new(NoopMetrics));
    publisher.publish(NEW_ORDERS_TOPIC, "this is not an order").await.unwrap();

    let diagnostic = tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("no diagnostic")
        .expect("channel closed");
    assert!(diagnostic.contains("Error processing order"));
    assert_eq!(metrics.snapshot().failed, 1);

    processor.stop_processing().await.unwrap();
}
