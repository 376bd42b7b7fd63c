use std::sync::Arc;

use crate::client::ClientFactory;
use crate::config::Settings;
use crate::connection::{ConnectionConfig, ConnectionManager, ConnectionState, Role};
use crate::dedup::DedupCache;
use crate::metrics::Metrics;
use crate::pubsub::Dispatcher;
use crate::subscription::{MessageHandler, SubscriptionRegistry};
use crate::utils::BusError;

/// Receives messages on a single topic.
///
/// The subscription outlives a dropped connection and is re-armed when the
/// connection comes back. It is cleared by `unsubscribe` and `disconnect`.
#[derive(Clone)]
pub struct Subscriber {
    connection: ConnectionManager,
    dispatcher: Arc<Dispatcher>,
}

impl Subscriber {
    pub fn new(settings: &Settings, factory: Arc<dyn ClientFactory>, metrics: Arc<dyn Metrics>) -> Self {
        Self::with_config(ConnectionConfig::from_settings(Role::Subscriber, settings), factory, metrics)
    }

    pub fn with_config(config: ConnectionConfig, factory: Arc<dyn ClientFactory>, metrics: Arc<dyn Metrics>) -> Self {
        let subscriptions = SubscriptionRegistry::new();
        let dispatcher = Arc::new(Dispatcher::new(
            subscriptions.reader(),
            DedupCache::new(),
            metrics.clone(),
        ));
        let connection = ConnectionManager::with_sink(config, factory, metrics, subscriptions, dispatcher.clone());
        Self {
            connection,
            dispatcher,
        }
    }

    pub async fn connect(&self) -> Result<(), BusError> {
        self.connection.connect().await
    }

    pub async fn subscribe(&self, topic: &str, handler: Arc<dyn MessageHandler>) -> Result<(), BusError> {
        self.connection.lock().await.subscribe(topic, handler).await
    }

    pub async fn unsubscribe(&self, topic: &str) -> Result<(), BusError> {
        self.connection.lock().await.unsubscribe(topic).await
    }

    /// Disconnect and forget the subscription.
    pub async fn disconnect(&self) -> Result<(), BusError> {
        let mut connection = self.connection.lock().await;
        let result = connection.disconnect().await;
        connection.subscriptions_mut().clear();
        result
    }

    pub fn current_topic(&self) -> Option<String> {
        self.dispatcher.topic()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.state() == ConnectionState::Connected
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}
