//! Peer representation
//!
//! `Peer` models one WebSocket connection to the broker and holds the sending
//! side of a per-connection channel used to push frames to it. The
//! `client_id` is whatever identity the peer announced in its `connect`
//! frame.

use tokio::sync::mpsc::UnboundedSender;
use tungstenite::protocol::Message as WsMessage;
use uuid::Uuid;

use crate::transport::ServerMessage;

#[derive(Debug)]
pub struct Peer {
    pub id: String,
    pub client_id: Option<String>,
    pub sender: UnboundedSender<WsMessage>,
}

impl Peer {
    /// Create a new peer with a sender channel. The `id` is a UUID used to
    /// identify the connection across broker operations.
    pub fn new(sender: UnboundedSender<WsMessage>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            client_id: None,
            sender,
        }
    }

    /// Serialize and queue a frame for this peer. Returns `false` when the
    /// connection's send loop has already gone away.
    pub fn send(&self, frame: &ServerMessage) -> bool {
        match serde_json::to_string(frame) {
            Ok(json) => self.sender.send(WsMessage::text(json)).is_ok(),
            Err(e) => {
                tracing::error!(peer = %self.id, "failed to serialize frame: {e}");
                false
            }
        }
    }
}
