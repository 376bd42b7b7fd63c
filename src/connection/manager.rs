//! Connection manager
//!
//! A `ConnectionManager` owns the single broker client handle of one role
//! together with everything that must change atomically with it: the
//! connected flag, a session generation and the subscription registry. All
//! of it lives behind one `tokio::sync::Mutex`, so connects, the autonomous
//! reconnect, subscription changes, publishes and disconnects on the same
//! manager never interleave.
//!
//! Each successful connect spawns a session task that drains the client's
//! event channel. Inbound messages go to the manager's `InboundSink`; a
//! `Disconnected` event for the current generation starts the reconnect
//! sequence: report `Disconnected`, wait out the cool-down, then run the
//! backoff-wrapped connect and re-arm the stored subscription before
//! `Connected` is reported again. Any explicit `disconnect` bumps the
//! generation, which makes a pending reconnect give up.

use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::{Mutex, MutexGuard, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::client::{
    BrokerClient, BrokerEvent, ClientFactory, ClientOptions, EventReceiver, InboundMessage, QoS,
};
use crate::config::{BrokerSettings, Settings};
use crate::connection::{ConnectionState, Role};
use crate::metrics::Metrics;
use crate::retry::BackoffPolicy;
use crate::subscription::{MessageHandler, Subscription, SubscriptionRegistry};
use crate::utils::BusError;

/// Receives every message the broker delivers on a managed connection.
///
/// `deliver` is called from the session task in delivery order and must not
/// block.
pub trait InboundSink: Send + Sync {
    fn deliver(&self, message: InboundMessage);
}

/// Everything a manager needs to know before its first connect.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    pub role: Role,
    pub endpoint: BrokerSettings,
    pub policy: BackoffPolicy,
    pub connect_timeout: Duration,
    pub reconnect_cooldown: Duration,
}

impl ConnectionConfig {
    pub fn from_settings(role: Role, settings: &Settings) -> Self {
        Self {
            role,
            endpoint: settings.broker.clone(),
            policy: settings.retry.policy(),
            connect_timeout: settings.connection.connect_timeout(),
            reconnect_cooldown: settings.connection.reconnect_cooldown(),
        }
    }
}

struct Inner {
    client: Option<Arc<dyn BrokerClient>>,
    connected: bool,
    /// Bumped on every successful connect and every explicit disconnect.
    generation: u64,
    subscriptions: SubscriptionRegistry,
}

impl Inner {
    fn client(&self) -> Result<Arc<dyn BrokerClient>, BusError> {
        self.client.clone().ok_or_else(|| {
            BusError::InvalidClientState("no broker client has been created yet".into())
        })
    }
}

struct Shared {
    config: ConnectionConfig,
    factory: Arc<dyn ClientFactory>,
    metrics: Arc<dyn Metrics>,
    sink: Option<Arc<dyn InboundSink>>,
    inner: Mutex<Inner>,
    state: watch::Sender<ConnectionState>,
}

impl Shared {
    fn role(&self) -> Role {
        self.config.role
    }

    fn set_state(&self, next: ConnectionState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
        if changed {
            debug!(role = %self.role(), state = %next, "connection state changed");
        }
    }

    /// Report the state that matches `inner` after a failed operation.
    fn settle(&self, inner: &Inner) {
        self.set_state(if inner.connected {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        });
    }

    async fn connection_lost(self: &Arc<Self>, generation: u64, reason: String) {
        {
            let mut inner = self.inner.lock().await;
            if inner.generation != generation || !inner.connected {
                debug!(role = %self.role(), %reason, "ignoring end of a stale session");
                return;
            }
            inner.connected = false;
            inner.subscriptions.disarm();
            self.set_state(ConnectionState::Disconnected);
        }

        let cooldown = self.config.reconnect_cooldown;
        warn!(
            role = %self.role(),
            %reason,
            cooldown_ms = cooldown.as_millis() as u64,
            "connection lost, reconnecting after cool-down"
        );
        tokio::time::sleep(cooldown).await;

        let mut inner = self.inner.lock().await;
        if inner.generation != generation || inner.connected {
            debug!(role = %self.role(), "reconnect superseded");
            return;
        }

        let shared = self.clone();
        let result = self
            .config
            .policy
            .run("reconnect", self.metrics.as_ref(), &mut *inner, move |inner| {
                Box::pin(ensure_connected(shared.clone(), inner, true))
            })
            .await;

        match result {
            Ok(_) => info!(role = %self.role(), "connection re-established"),
            Err(err) => {
                self.settle(&inner);
                error!(
                    role = %self.role(),
                    error = %err,
                    "reconnect failed, staying disconnected until the next explicit connect"
                );
            }
        }
    }
}

/// Open the connection if it is not already up.
///
/// Creates the client handle on first use. The handshake is bounded by the
/// configured connect timeout. On success the generation is bumped and a
/// session task is started for the new event channel.
async fn establish(shared: Arc<Shared>, inner: &mut Inner, reconnecting: bool) -> Result<(), BusError> {
    if inner.connected {
        match &inner.client {
            Some(client) if client.is_connected() => return Ok(()),
            _ => {
                debug!(role = %shared.role(), "client reports a dead session");
                inner.connected = false;
                inner.subscriptions.disarm();
            }
        }
    }

    let client = match &inner.client {
        Some(client) => client.clone(),
        None => {
            let client_id = format!(
                "{}-{}-{}",
                shared.config.endpoint.client_id,
                shared.role(),
                Uuid::new_v4().simple()
            );
            let client = shared.factory.create(&client_id);
            inner.client = Some(client.clone());
            client
        }
    };

    shared.set_state(if reconnecting {
        ConnectionState::Reconnecting
    } else {
        ConnectionState::Connecting
    });

    let options = ClientOptions::new(&shared.config.endpoint, client.client_id());
    let timeout = shared.config.connect_timeout;
    let events = match tokio::time::timeout(timeout, client.connect(&options)).await {
        Ok(result) => result?,
        Err(_) => {
            // Abandon the half-open attempt before the next one starts.
            let _ = client.disconnect().await;
            return Err(BusError::timeout(timeout, "broker handshake"));
        }
    };

    inner.generation += 1;
    inner.connected = true;
    tokio::spawn(watch_session(
        Arc::downgrade(&shared),
        events,
        inner.generation,
    ));
    info!(
        role = %shared.role(),
        client_id = client.client_id(),
        url = %options.url(),
        "connected"
    );
    Ok(())
}

/// Connect if needed, re-arm a stored subscription, then report `Connected`.
async fn ensure_connected(
    shared: Arc<Shared>,
    inner: &mut Inner,
    reconnecting: bool,
) -> Result<Arc<dyn BrokerClient>, BusError> {
    establish(shared.clone(), inner, reconnecting).await?;
    let client = inner.client()?;

    if !inner.subscriptions.is_armed() {
        if let Some(topic) = inner.subscriptions.topic() {
            client.subscribe(&topic, QoS::AtLeastOnce).await?;
            inner.subscriptions.mark_armed();
            info!(role = %shared.role(), %topic, "subscription re-armed");
        }
    }

    shared.set_state(ConnectionState::Connected);
    Ok(client)
}

fn watch_session(shared: Weak<Shared>, mut events: EventReceiver, generation: u64) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        let reason = loop {
            let Some(event) = events.recv().await else {
                break "event stream ended".to_string();
            };
            let Some(shared) = shared.upgrade() else {
                return;
            };
            match event {
                BrokerEvent::Connected => debug!(role = %shared.role(), generation, "session open"),
                BrokerEvent::Message(message) => match &shared.sink {
                    Some(sink) => sink.deliver(message),
                    None => debug!(role = %shared.role(), topic = %message.topic, "no sink, dropping message"),
                },
                BrokerEvent::Disconnected { reason } => break reason,
            }
        };

        if let Some(shared) = shared.upgrade() {
            shared.connection_lost(generation, reason).await;
        }
    })
}

/// Shares one broker connection of a given role.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig, factory: Arc<dyn ClientFactory>, metrics: Arc<dyn Metrics>) -> Self {
        Self::build(config, factory, metrics, SubscriptionRegistry::new(), None)
    }

    /// A manager that hands inbound messages to `sink` and keeps its
    /// subscription in `subscriptions`.
    pub fn with_sink(
        config: ConnectionConfig,
        factory: Arc<dyn ClientFactory>,
        metrics: Arc<dyn Metrics>,
        subscriptions: SubscriptionRegistry,
        sink: Arc<dyn InboundSink>,
    ) -> Self {
        Self::build(config, factory, metrics, subscriptions, Some(sink))
    }

    fn build(
        config: ConnectionConfig,
        factory: Arc<dyn ClientFactory>,
        metrics: Arc<dyn Metrics>,
        subscriptions: SubscriptionRegistry,
        sink: Option<Arc<dyn InboundSink>>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                config,
                factory,
                metrics,
                sink,
                inner: Mutex::new(Inner {
                    client: None,
                    connected: false,
                    generation: 0,
                    subscriptions,
                }),
                state,
            }),
        }
    }

    pub fn role(&self) -> Role {
        self.shared.role()
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Identity of the client handle, once one has been created.
    pub async fn client_id(&self) -> Option<String> {
        let inner = self.shared.inner.lock().await;
        inner.client.as_ref().map(|client| client.client_id().to_string())
    }

    /// Take exclusive control of the connection.
    pub async fn lock(&self) -> ConnectionGuard<'_> {
        ConnectionGuard {
            shared: &self.shared,
            inner: self.shared.inner.lock().await,
        }
    }

    pub async fn connect(&self) -> Result<(), BusError> {
        self.lock().await.connect().await
    }

    pub async fn disconnect(&self) -> Result<(), BusError> {
        self.lock().await.disconnect().await
    }

    pub async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), BusError> {
        self.lock().await.publish(topic, payload).await
    }
}

/// Exclusive access to a manager's connection, held for one or more
/// operations.
pub struct ConnectionGuard<'a> {
    shared: &'a Arc<Shared>,
    inner: MutexGuard<'a, Inner>,
}

impl ConnectionGuard<'_> {
    pub fn is_connected(&self) -> bool {
        self.inner.connected
    }

    /// The client handle. Fails with `InvalidClientState` before the first
    /// connect attempt.
    pub fn client(&self) -> Result<Arc<dyn BrokerClient>, BusError> {
        self.inner.client()
    }

    pub fn subscriptions(&self) -> &SubscriptionRegistry {
        &self.inner.subscriptions
    }

    pub fn subscriptions_mut(&mut self) -> &mut SubscriptionRegistry {
        &mut self.inner.subscriptions
    }

    /// Connect under the backoff policy. Returns at once when connected.
    pub async fn connect(&mut self) -> Result<(), BusError> {
        if self.inner.connected {
            return Ok(());
        }
        let shared = self.shared.clone();
        let result = self
            .shared
            .config
            .policy
            .run("connect", self.shared.metrics.as_ref(), &mut *self.inner, move |inner| {
                Box::pin(ensure_connected(shared.clone(), inner, false))
            })
            .await;

        if let Err(err) = &result {
            self.shared.settle(&self.inner);
            error!(role = %self.shared.role(), error = %err, "connect failed");
        }
        result.map(|_| ())
    }

    /// Close the connection. Also cancels a reconnect waiting for its turn.
    pub async fn disconnect(&mut self) -> Result<(), BusError> {
        self.inner.generation += 1;
        if !self.inner.connected {
            return Ok(());
        }
        self.inner.connected = false;
        self.inner.subscriptions.disarm();

        let result = match &self.inner.client {
            Some(client) => client.disconnect().await,
            None => Ok(()),
        };
        self.shared.set_state(ConnectionState::Disconnected);
        info!(role = %self.shared.role(), "disconnected");
        result
    }

    /// Publish at at-least-once QoS, connecting first if needed. Every
    /// attempt, including the reconnect, runs under the backoff policy.
    pub async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), BusError> {
        let shared = self.shared.clone();
        let owned_topic = topic.to_string();
        let bytes = payload.len();
        let payload = payload.to_vec();

        let result = self
            .shared
            .config
            .policy
            .run("publish", self.shared.metrics.as_ref(), &mut *self.inner, move |inner| {
                let shared = shared.clone();
                let topic = owned_topic.clone();
                let payload = payload.clone();
                Box::pin(async move {
                    // A drop event may still be queued behind this lock, so
                    // the handle itself is asked whether it is alive.
                    let alive = inner.connected
                        && inner.client.as_ref().is_some_and(|client| client.is_connected());
                    if !alive {
                        warn!(role = %shared.role(), %topic, "not connected, connecting before publish");
                    }
                    let client = ensure_connected(shared, inner, false).await?;
                    client.publish(&topic, &payload, QoS::AtLeastOnce, false).await
                })
            })
            .await;

        match &result {
            Ok(()) => debug!(role = %self.shared.role(), topic, bytes, "published"),
            Err(err) => {
                self.shared.settle(&self.inner);
                error!(role = %self.shared.role(), topic, error = %err, "publish failed");
            }
        }
        result
    }

    /// Bind the connection to `topic`, replacing any other subscription.
    ///
    /// Subscribing again to the topic that is already live is a no-op and
    /// keeps the existing handler.
    pub async fn subscribe(&mut self, topic: &str, handler: Arc<dyn MessageHandler>) -> Result<(), BusError> {
        let shared = self.shared.clone();
        let owned_topic = topic.to_string();

        let result = self
            .shared
            .config
            .policy
            .run("subscribe", self.shared.metrics.as_ref(), &mut *self.inner, move |inner| {
                let shared = shared.clone();
                let topic = owned_topic.clone();
                let handler = handler.clone();
                Box::pin(async move {
                    establish(shared.clone(), inner, false).await?;
                    shared.set_state(ConnectionState::Connected);

                    if inner.subscriptions.is_armed_for(&topic) {
                        info!(role = %shared.role(), %topic, "already subscribed");
                        return Ok(());
                    }
                    let client = inner.client()?;
                    if inner.subscriptions.is_armed() {
                        if let Some(previous) = inner.subscriptions.topic() {
                            client.unsubscribe(&previous).await?;
                            inner.subscriptions.disarm();
                            info!(role = %shared.role(), topic = %previous, "replaced subscription");
                        }
                    }
                    client.subscribe(&topic, QoS::AtLeastOnce).await?;
                    inner.subscriptions.replace(Subscription::new(topic.as_str(), handler));
                    info!(role = %shared.role(), %topic, "subscribed");
                    Ok(())
                })
            })
            .await;

        if let Err(err) = &result {
            self.shared.settle(&self.inner);
            error!(role = %self.shared.role(), topic, error = %err, "subscribe failed");
        }
        result
    }

    /// Drop the subscription to `topic`. Does nothing while disconnected.
    pub async fn unsubscribe(&mut self, topic: &str) -> Result<(), BusError> {
        if !self.inner.connected {
            debug!(role = %self.shared.role(), topic, "not connected, nothing to unsubscribe");
            return Ok(());
        }
        if self.inner.subscriptions.topic().as_deref() == Some(topic) {
            self.inner.subscriptions.clear();
        }
        self.inner.client()?.unsubscribe(topic).await?;
        info!(role = %self.shared.role(), topic, "unsubscribed");
        Ok(())
    }
}
