use super::memory::MemoryBroker;
use super::websocket::WsBrokerClient;
use super::{BrokerClient, BrokerEvent, ClientFactory, ClientOptions, InboundMessage, QoS};
use crate::broker::Broker;
use crate::config::Settings;
use crate::transport::serve;
use crate::utils::BusError;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

fn options(client_id: &str) -> ClientOptions {
    ClientOptions::new(&Settings::default().broker, client_id)
}

async fn next_event(events: &mut super::EventReceiver) -> BrokerEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

#[test]
fn test_options_url_follows_tls_flag() {
    let mut endpoint = Settings::default().broker;
    endpoint.host = "broker.local".into();
    endpoint.port = 1884;
    assert_eq!(ClientOptions::new(&endpoint, "c").url(), "ws://broker.local:1884");

    endpoint.use_tls = true;
    assert_eq!(ClientOptions::new(&endpoint, "c").url(), "wss://broker.local:1884");
}

#[test]
fn test_qos_wire_values() {
    assert_eq!(QoS::AtMostOnce.as_u8(), 0);
    assert_eq!(QoS::AtLeastOnce.as_u8(), 1);
}

#[tokio::test]
async fn test_memory_client_routes_to_subscribers() {
    let broker = MemoryBroker::new();
    let subscriber = broker.create("sub");
    let publisher = broker.create("pub");
    assert_eq!(broker.clients_created(), 2);

    let mut sub_events = subscriber.connect(&options("sub")).await.unwrap();
    assert_eq!(next_event(&mut sub_events).await, BrokerEvent::Connected);
    publisher.connect(&options("pub")).await.unwrap();

    subscriber.subscribe("orders/new", QoS::AtLeastOnce).await.unwrap();
    assert!(broker.is_subscribed("orders/new"));

    publisher
        .publish("orders/new", b"hello", QoS::AtLeastOnce, false)
        .await
        .unwrap();
    assert_eq!(
        next_event(&mut sub_events).await,
        BrokerEvent::Message(InboundMessage::new("orders/new", b"hello".to_vec()))
    );
    assert_eq!(broker.published_to("orders/new"), vec![b"hello".to_vec()]);
}

#[tokio::test]
async fn test_memory_client_requires_connection() {
    let broker = MemoryBroker::new();
    let client = broker.create("c");
    assert!(!client.is_connected());
    let err = client
        .publish("t", b"x", QoS::AtLeastOnce, false)
        .await
        .unwrap_err();
    assert!(matches!(err, BusError::Transport(_)));
    assert!(client.subscribe("t", QoS::AtLeastOnce).await.is_err());
}

#[tokio::test]
async fn test_memory_broker_failure_injection() {
    let broker = MemoryBroker::new();
    let client = broker.create("c");

    broker.set_offline(true);
    assert!(matches!(
        client.connect(&options("c")).await,
        Err(BusError::Transport(_))
    ));
    broker.set_offline(false);

    let mut events = client.connect(&options("c")).await.unwrap();
    assert_eq!(broker.connect_calls(), 2);
    let _ = next_event(&mut events).await;

    broker.fail_next_publishes(1);
    assert!(client.publish("t", b"1", QoS::AtLeastOnce, false).await.is_err());
    assert!(client.publish("t", b"2", QoS::AtLeastOnce, false).await.is_ok());

    assert_eq!(broker.drop_connections("network unreachable"), 1);
    assert_eq!(
        next_event(&mut events).await,
        BrokerEvent::Disconnected {
            reason: "network unreachable".into()
        }
    );
    assert!(!client.is_connected());
}

async fn start_ws_broker() -> (Settings, Arc<Mutex<Broker>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let broker = Arc::new(Mutex::new(Broker::new()));
    tokio::spawn(serve(listener, broker.clone()));

    let mut settings = Settings::default();
    settings.broker.host = addr.ip().to_string();
    settings.broker.port = addr.port();
    (settings, broker)
}

#[tokio::test]
async fn test_ws_client_publish_and_receive() {
    let (settings, _broker) = start_ws_broker().await;
    let subscriber = WsBrokerClient::new("ws-sub");
    let publisher = WsBrokerClient::new("ws-pub");

    let mut sub_events = subscriber
        .connect(&ClientOptions::new(&settings.broker, "ws-sub"))
        .await
        .expect("subscriber connect");
    assert_eq!(next_event(&mut sub_events).await, BrokerEvent::Connected);
    assert!(subscriber.is_connected());

    publisher
        .connect(&ClientOptions::new(&settings.broker, "ws-pub"))
        .await
        .expect("publisher connect");

    subscriber
        .subscribe("orders/error", QoS::AtLeastOnce)
        .await
        .expect("subscribe");
    publisher
        .publish("orders/error", b"diagnostic", QoS::AtLeastOnce, false)
        .await
        .expect("publish");

    assert_eq!(
        next_event(&mut sub_events).await,
        BrokerEvent::Message(InboundMessage::new("orders/error", b"diagnostic".to_vec()))
    );

    subscriber.unsubscribe("orders/error").await.expect("unsubscribe");
    subscriber.disconnect().await.expect("disconnect");
    assert!(!subscriber.is_connected());
}

#[tokio::test]
async fn test_ws_client_connect_refused_is_transport_error() {
    // Bind and immediately drop to get a port nothing listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut endpoint = Settings::default().broker;
    endpoint.host = addr.ip().to_string();
    endpoint.port = addr.port();

    let client = WsBrokerClient::new("nobody");
    let err = client
        .connect(&ClientOptions::new(&endpoint, "nobody"))
        .await
        .unwrap_err();
    assert!(matches!(err, BusError::Transport(_)));
}

#[tokio::test]
async fn test_ws_client_rejects_non_utf8_payload() {
    let (settings, _broker) = start_ws_broker().await;
    let client = WsBrokerClient::new("bytes");
    client
        .connect(&ClientOptions::new(&settings.broker, "bytes"))
        .await
        .unwrap();
    let err = client
        .publish("t", &[0xff, 0xfe], QoS::AtLeastOnce, false)
        .await
        .unwrap_err();
    assert!(matches!(err, BusError::Validation(_)));
}
