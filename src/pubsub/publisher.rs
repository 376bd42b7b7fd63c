use std::sync::Arc;

use serde::Serialize;

use crate::client::ClientFactory;
use crate::config::Settings;
use crate::connection::{ConnectionConfig, ConnectionManager, ConnectionState, Role};
use crate::metrics::Metrics;
use crate::utils::BusError;

/// Sends messages to the broker, connecting on demand.
#[derive(Clone)]
pub struct Publisher {
    connection: ConnectionManager,
}

impl Publisher {
    pub fn new(settings: &Settings, factory: Arc<dyn ClientFactory>, metrics: Arc<dyn Metrics>) -> Self {
        Self::with_config(ConnectionConfig::from_settings(Role::Publisher, settings), factory, metrics)
    }

    pub fn with_config(config: ConnectionConfig, factory: Arc<dyn ClientFactory>, metrics: Arc<dyn Metrics>) -> Self {
        Self {
            connection: ConnectionManager::new(config, factory, metrics),
        }
    }

    pub async fn connect(&self) -> Result<(), BusError> {
        self.connection.connect().await
    }

    pub async fn disconnect(&self) -> Result<(), BusError> {
        self.connection.disconnect().await
    }

    pub async fn publish(&self, topic: &str, payload: impl AsRef<[u8]>) -> Result<(), BusError> {
        self.connection.publish(topic, payload.as_ref()).await
    }

    /// Serialize `value` as JSON and publish it.
    pub async fn publish_json<T: Serialize>(&self, topic: &str, value: &T) -> Result<(), BusError> {
        let payload = serde_json::to_vec(value)?;
        self.publish(topic, payload).await
    }

    pub fn is_connected(&self) -> bool {
        self.connection.state() == ConnectionState::Connected
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }
}
