//! WebSocket broker client
//!
//! `WsBrokerClient` speaks the bundled broker's JSON protocol over
//! `tokio-tungstenite`. Each `connect` opens a socket and spawns two tasks:
//! a writer draining an outbound channel into the socket, and a reader that
//! resolves pending acknowledgements and forwards messages and the final
//! disconnect as `BrokerEvent`s.
//!
//! Requests that the broker acknowledges (`connect`, `subscribe`,
//! `unsubscribe` and at-least-once `publish`) wait for their ack for at most
//! `ACK_TIMEOUT`. A `wss` endpoint needs the crate's `tls` feature.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::spawn;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::sync::oneshot;
use tokio_tungstenite::connect_async;
use tracing::{debug, info, warn};
use tungstenite::protocol::Message as WsMessage;
use uuid::Uuid;

use crate::client::{
    BrokerClient, BrokerEvent, ClientFactory, ClientOptions, EventReceiver, InboundMessage, QoS,
};
use crate::transport::{ClientMessage, ServerMessage};
use crate::utils::BusError;

/// Upper bound on waiting for any broker acknowledgement.
pub const ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared state of one open socket.
#[derive(Debug)]
struct Link {
    outbound: UnboundedSender<WsMessage>,
    pending: Mutex<HashMap<String, oneshot::Sender<()>>>,
    connected: AtomicBool,
}

impl Link {
    fn pending(&self) -> MutexGuard<'_, HashMap<String, oneshot::Sender<()>>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn expect_ack(&self, key: &str) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.pending().insert(key.to_string(), tx);
        rx
    }

    fn resolve(&self, key: &str) {
        if let Some(waiter) = self.pending().remove(key) {
            let _ = waiter.send(());
        } else {
            debug!(key, "ack without a waiter");
        }
    }

    fn send(&self, frame: &ClientMessage) -> Result<(), BusError> {
        let json = serde_json::to_string(frame)?;
        self.outbound
            .send(WsMessage::text(json))
            .map_err(|_| BusError::Transport("connection writer has stopped".into()))
    }

    /// Mark the link dead and fail every outstanding request.
    fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.pending().clear();
    }
}

#[derive(Debug)]
pub struct WsBrokerClient {
    client_id: String,
    link: Mutex<Option<Arc<Link>>>,
}

impl WsBrokerClient {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            link: Mutex::new(None),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<Arc<Link>>> {
        self.link.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn live_link(&self) -> Result<Arc<Link>, BusError> {
        match self.slot().as_ref() {
            Some(link) if link.connected.load(Ordering::SeqCst) => Ok(link.clone()),
            _ => Err(BusError::Transport(format!(
                "client {} is not connected",
                self.client_id
            ))),
        }
    }

    /// Send `frame` and wait for the ack registered under `key`.
    async fn request(&self, key: String, frame: ClientMessage, waiting_for: &str) -> Result<(), BusError> {
        let link = self.live_link()?;
        let ack = link.expect_ack(&key);
        link.send(&frame)?;

        match tokio::time::timeout(ACK_TIMEOUT, ack).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(BusError::Transport(format!(
                "connection closed while waiting for {waiting_for}"
            ))),
            Err(_) => {
                link.pending().remove(&key);
                Err(BusError::timeout(ACK_TIMEOUT, waiting_for))
            }
        }
    }
}

/// Read frames until the socket ends, then report why.
async fn read_loop<S>(
    mut stream: S,
    link: Arc<Link>,
    events: UnboundedSender<BrokerEvent>,
    mut conn_ack: Option<oneshot::Sender<()>>,
) where
    S: futures_util::Stream<Item = Result<WsMessage, tungstenite::Error>> + Unpin,
{
    let reason = loop {
        let msg = match stream.next().await {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => break e.to_string(),
            None => break "connection closed".to_string(),
        };
        if msg.is_close() {
            break "connection closed by broker".to_string();
        }
        let Ok(text) = msg.to_text() else {
            continue;
        };
        if text.is_empty() {
            continue;
        }

        match serde_json::from_str::<ServerMessage>(text) {
            Ok(ServerMessage::ConnAck { session_id }) => {
                debug!(%session_id, "conn_ack received");
                link.connected.store(true, Ordering::SeqCst);
                if let Some(ack) = conn_ack.take() {
                    let _ = ack.send(());
                }
                let _ = events.send(BrokerEvent::Connected);
            }
            Ok(ServerMessage::SubAck { topic }) => link.resolve(&format!("sub:{topic}")),
            Ok(ServerMessage::UnsubAck { topic }) => link.resolve(&format!("unsub:{topic}")),
            Ok(ServerMessage::PubAck { message_id }) => link.resolve(&format!("pub:{message_id}")),
            Ok(ServerMessage::Message { topic, payload, .. }) => {
                let _ = events.send(BrokerEvent::Message(InboundMessage::new(
                    topic,
                    payload.into_bytes(),
                )));
            }
            Ok(ServerMessage::Error { message }) => warn!("broker reported an error: {message}"),
            Err(e) => warn!("invalid broker frame: {e}"),
        }
    };

    link.close();
    let _ = events.send(BrokerEvent::Disconnected { reason });
}

#[async_trait]
impl BrokerClient for WsBrokerClient {
    fn client_id(&self) -> &str {
        &self.client_id
    }

    async fn connect(&self, options: &ClientOptions) -> Result<EventReceiver, BusError> {
        if let Some(stale) = self.slot().take() {
            stale.close();
        }

        let url = options.url();
        let (ws_stream, _) = connect_async(url.as_str()).await?;
        let (mut ws_sender, ws_receiver) = ws_stream.split();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<WsMessage>();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (ack_tx, ack_rx) = oneshot::channel();
        let link = Arc::new(Link {
            outbound: out_tx,
            pending: Mutex::new(HashMap::new()),
            connected: AtomicBool::new(false),
        });

        {
            let client_id = self.client_id.clone();
            spawn(async move {
                while let Some(msg) = out_rx.recv().await {
                    if let Err(e) = ws_sender.send(msg).await {
                        warn!(%client_id, "failed to send frame: {e}");
                        break;
                    }
                }
                let _ = ws_sender.close().await;
                debug!(%client_id, "writer closed");
            });
        }
        spawn(read_loop(ws_receiver, link.clone(), event_tx, Some(ack_tx)));

        *self.slot() = Some(link.clone());
        link.send(&ClientMessage::Connect {
            client_id: options.client_id.clone(),
            username: options.username.clone(),
            password: options.password.clone(),
        })?;

        if ack_rx.await.is_err() {
            self.slot().take();
            return Err(BusError::Transport(format!(
                "{url} closed the connection before conn_ack"
            )));
        }

        info!(client_id = %self.client_id, %url, "connected to broker");
        Ok(event_rx)
    }

    async fn disconnect(&self) -> Result<(), BusError> {
        let Some(link) = self.slot().take() else {
            return Ok(());
        };
        link.connected.store(false, Ordering::SeqCst);
        // The socket may already be gone; closing is best effort.
        let _ = link.send(&ClientMessage::Disconnect);
        let _ = link.outbound.send(WsMessage::Close(None));
        link.close();
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &[u8], qos: QoS, retain: bool) -> Result<(), BusError> {
        let payload = std::str::from_utf8(payload)
            .map_err(|e| BusError::Validation(format!("payload is not valid UTF-8: {e}")))?
            .to_string();
        let message_id = Uuid::new_v4().to_string();
        let frame = ClientMessage::Publish {
            topic: topic.to_string(),
            payload,
            qos: qos.as_u8(),
            retain,
            message_id: Some(message_id.clone()),
        };

        match qos {
            QoS::AtMostOnce => self.live_link()?.send(&frame),
            QoS::AtLeastOnce => {
                self.request(format!("pub:{message_id}"), frame, "pub_ack")
                    .await
            }
        }
    }

    async fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), BusError> {
        let frame = ClientMessage::Subscribe {
            topic: topic.to_string(),
            qos: qos.as_u8(),
        };
        self.request(format!("sub:{topic}"), frame, "sub_ack").await
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), BusError> {
        let frame = ClientMessage::Unsubscribe {
            topic: topic.to_string(),
        };
        self.request(format!("unsub:{topic}"), frame, "unsub_ack")
            .await
    }

    fn is_connected(&self) -> bool {
        self.live_link().is_ok()
    }
}

/// Hands out `WsBrokerClient`s.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsClientFactory;

impl ClientFactory for WsClientFactory {
    fn create(&self, client_id: &str) -> Arc<dyn BrokerClient> {
        Arc::new(WsBrokerClient::new(client_id))
    }
}
