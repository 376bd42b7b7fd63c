//! In-process broker
//!
//! `MemoryBroker` routes publishes to subscribed sessions without any network
//! and implements `ClientFactory`, handing out `MemoryClient` handles bound
//! to it. Besides routing it records every publish and counts client
//! creation, connect and subscribe calls, and can simulate the failures a
//! real network produces: dropped connections, an unreachable broker,
//! handshakes that never complete and failing publishes.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::debug;

use crate::client::{
    BrokerClient, BrokerEvent, ClientFactory, ClientOptions, EventReceiver, InboundMessage, QoS,
};
use crate::utils::BusError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub client_id: String,
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

#[derive(Debug)]
struct Session {
    events: UnboundedSender<BrokerEvent>,
    topics: HashSet<String>,
}

#[derive(Debug, Default)]
struct HubState {
    sessions: HashMap<String, Session>,
    published: Vec<PublishedMessage>,
}

#[derive(Debug, Default)]
struct Hub {
    state: Mutex<HubState>,
    clients_created: AtomicUsize,
    connect_calls: AtomicUsize,
    subscribe_calls: AtomicUsize,
    failing_publishes: AtomicUsize,
    offline: AtomicBool,
    stall_connects: AtomicBool,
}

impl Hub {
    fn state(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue `payload` for every session subscribed to `topic`.
    fn route(state: &HubState, topic: &str, payload: &[u8]) -> usize {
        state
            .sessions
            .values()
            .filter(|session| session.topics.contains(topic))
            .filter(|session| {
                session
                    .events
                    .send(BrokerEvent::Message(InboundMessage::new(topic, payload)))
                    .is_ok()
            })
            .count()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    hub: Arc<Hub>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clients_created(&self) -> usize {
        self.hub.clients_created.load(Ordering::SeqCst)
    }

    pub fn connect_calls(&self) -> usize {
        self.hub.connect_calls.load(Ordering::SeqCst)
    }

    pub fn subscribe_calls(&self) -> usize {
        self.hub.subscribe_calls.load(Ordering::SeqCst)
    }

    /// While offline every connect attempt fails with a transport error.
    pub fn set_offline(&self, offline: bool) {
        self.hub.offline.store(offline, Ordering::SeqCst);
    }

    /// While stalled, connect attempts never complete.
    pub fn stall_connects(&self, stall: bool) {
        self.hub.stall_connects.store(stall, Ordering::SeqCst);
    }

    /// Make the next `count` publishes fail with a transport error.
    pub fn fail_next_publishes(&self, count: usize) {
        self.hub.failing_publishes.store(count, Ordering::SeqCst);
    }

    /// Drop every live session as if the network went away. Each client sees
    /// a `Disconnected` event. Returns the number of sessions dropped.
    pub fn drop_connections(&self, reason: &str) -> usize {
        let sessions: Vec<Session> = self.hub.state().sessions.drain().map(|(_, s)| s).collect();
        for session in &sessions {
            let _ = session.events.send(BrokerEvent::Disconnected {
                reason: reason.to_string(),
            });
        }
        sessions.len()
    }

    /// Deliver a message as if an external publisher sent it. Returns how
    /// many sessions it reached.
    pub fn inject(&self, topic: &str, payload: impl AsRef<[u8]>) -> usize {
        Hub::route(&self.hub.state(), topic, payload.as_ref())
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.hub.state().published.clone()
    }

    /// Payloads published to exactly `topic`, oldest first.
    pub fn published_to(&self, topic: &str) -> Vec<Vec<u8>> {
        self.hub
            .state()
            .published
            .iter()
            .filter(|msg| msg.topic == topic)
            .map(|msg| msg.payload.clone())
            .collect()
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.hub
            .state()
            .sessions
            .values()
            .any(|session| session.topics.contains(topic))
    }

    pub fn session_count(&self) -> usize {
        self.hub.state().sessions.len()
    }
}

impl ClientFactory for MemoryBroker {
    fn create(&self, client_id: &str) -> Arc<dyn BrokerClient> {
        self.hub.clients_created.fetch_add(1, Ordering::SeqCst);
        Arc::new(MemoryClient {
            client_id: client_id.to_string(),
            hub: self.hub.clone(),
        })
    }
}

#[derive(Debug)]
pub struct MemoryClient {
    client_id: String,
    hub: Arc<Hub>,
}

impl MemoryClient {
    fn not_connected(&self) -> BusError {
        BusError::Transport(format!("client {} is not connected", self.client_id))
    }
}

#[async_trait]
impl BrokerClient for MemoryClient {
    fn client_id(&self) -> &str {
        &self.client_id
    }

    async fn connect(&self, options: &ClientOptions) -> Result<EventReceiver, BusError> {
        self.hub.connect_calls.fetch_add(1, Ordering::SeqCst);
        if self.hub.stall_connects.load(Ordering::SeqCst) {
            futures::future::pending::<()>().await;
        }
        if self.hub.offline.load(Ordering::SeqCst) {
            return Err(BusError::Transport(format!(
                "broker {} is unreachable",
                options.url()
            )));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(BrokerEvent::Connected);
        self.hub.state().sessions.insert(
            self.client_id.clone(),
            Session {
                events: tx,
                topics: HashSet::new(),
            },
        );
        debug!(client_id = %self.client_id, "memory client connected");
        Ok(rx)
    }

    async fn disconnect(&self) -> Result<(), BusError> {
        self.hub.state().sessions.remove(&self.client_id);
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &[u8], qos: QoS, retain: bool) -> Result<(), BusError> {
        let mut state = self.hub.state();
        if !state.sessions.contains_key(&self.client_id) {
            return Err(self.not_connected());
        }
        let failing = self
            .hub
            .failing_publishes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(BusError::Transport(format!("publish to {topic} rejected")));
        }

        state.published.push(PublishedMessage {
            client_id: self.client_id.clone(),
            topic: topic.to_string(),
            payload: payload.to_vec(),
            qos,
            retain,
        });
        Hub::route(&state, topic, payload);
        Ok(())
    }

    async fn subscribe(&self, topic: &str, _qos: QoS) -> Result<(), BusError> {
        let mut state = self.hub.state();
        let session = state
            .sessions
            .get_mut(&self.client_id)
            .ok_or_else(|| self.not_connected())?;
        session.topics.insert(topic.to_string());
        self.hub.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), BusError> {
        let mut state = self.hub.state();
        let session = state
            .sessions
            .get_mut(&self.client_id)
            .ok_or_else(|| self.not_connected())?;
        session.topics.remove(topic);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.hub.state().sessions.contains_key(&self.client_id)
    }
}
