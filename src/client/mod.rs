//! The `client` module defines the seam between this crate and a broker.
//!
//! `BrokerClient` is the narrow interface the connection layer drives:
//! connect, disconnect, publish, subscribe and unsubscribe, with connection
//! and message events delivered over a channel returned from `connect`.
//! Two implementations ship with the crate:
//!
//! - `websocket::WsBrokerClient` talks to the bundled broker over WebSockets.
//! - `memory::MemoryBroker` routes messages in-process, for embedding and
//!   tests.

pub mod memory;
pub mod websocket;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::config::BrokerSettings;
use crate::utils::BusError;

pub use memory::MemoryBroker;
pub use websocket::{WsBrokerClient, WsClientFactory};

/// Delivery guarantee requested for a publish or subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QoS {
    AtMostOnce,
    AtLeastOnce,
}

impl QoS {
    pub fn as_u8(self) -> u8 {
        match self {
            QoS::AtMostOnce => 0,
            QoS::AtLeastOnce => 1,
        }
    }
}

/// Everything a client needs to open one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: String,
    pub password: String,
    pub use_tls: bool,
}

impl ClientOptions {
    pub fn new(endpoint: &BrokerSettings, client_id: impl Into<String>) -> Self {
        Self {
            host: endpoint.host.clone(),
            port: endpoint.port,
            client_id: client_id.into(),
            username: endpoint.username.clone(),
            password: endpoint.password.clone(),
            use_tls: endpoint.use_tls,
        }
    }

    pub fn url(&self) -> String {
        let scheme = if self.use_tls { "wss" } else { "ws" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Payload as text, replacing invalid UTF-8 sequences.
    pub fn payload_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// Events a client reports for one connection session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerEvent {
    Connected,
    Disconnected { reason: String },
    Message(InboundMessage),
}

pub type EventReceiver = UnboundedReceiver<BrokerEvent>;

#[async_trait]
pub trait BrokerClient: Send + Sync {
    fn client_id(&self) -> &str;

    /// Open a connection and resolve once the broker has accepted it.
    ///
    /// The returned receiver yields the events of this session and closes
    /// when the session ends.
    async fn connect(&self, options: &ClientOptions) -> Result<EventReceiver, BusError>;

    async fn disconnect(&self) -> Result<(), BusError>;

    async fn publish(&self, topic: &str, payload: &[u8], qos: QoS, retain: bool) -> Result<(), BusError>;

    async fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), BusError>;

    async fn unsubscribe(&self, topic: &str) -> Result<(), BusError>;

    fn is_connected(&self) -> bool;
}

/// Creates client handles. A connection manager asks for exactly one handle
/// over its lifetime.
pub trait ClientFactory: Send + Sync {
    fn create(&self, client_id: &str) -> Arc<dyn BrokerClient>;
}

#[cfg(test)]
mod tests;
