//! WebSocket transport
//!
//! This file implements the bundled broker's WebSocket server, translating
//! protocol JSON frames into broker operations. Responsibilities:
//! - Accept TCP/WebSocket connections
//! - Create a `Peer` for each connection and register it with the `Broker`
//! - Acknowledge `connect`, `subscribe`, `unsubscribe` and at-least-once
//!   `publish` frames so clients can wait for the broker to act on them
//! - Unsubscribe a peer from everything once its connection closes
//!
//! Credentials sent in `connect` frames are recorded in the logs only; the
//! bundled broker does not authenticate.

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::spawn;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_tungstenite::accept_async;
use tracing::{debug, info, warn};
use tungstenite::protocol::Message as WsMessage;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::broker::{Broker, Peer, message::Message};
use crate::transport::message::{ClientMessage, ServerMessage};

/// Bind `addr` and serve connections until the listener fails.
pub async fn start_websocket_server(addr: &str, broker: Arc<Mutex<Broker>>) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve(listener, broker).await;
    Ok(())
}

/// Serve connections on an already bound listener.
pub async fn serve(listener: TcpListener, broker: Arc<Mutex<Broker>>) {
    match listener.local_addr() {
        Ok(addr) => info!("WebSocket broker listening on ws://{addr}"),
        Err(e) => warn!("WebSocket broker listening on an unknown address: {e}"),
    }

    loop {
        match listener.accept().await {
            Ok((stream, remote)) => {
                debug!(%remote, "accepted connection");
                spawn(handle_connection(stream, broker.clone()));
            }
            Err(e) => {
                warn!("failed to accept connection: {e}");
                break;
            }
        }
    }
}

fn lock(broker: &Mutex<Broker>) -> MutexGuard<'_, Broker> {
    broker.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn reply(sender: &UnboundedSender<WsMessage>, frame: &ServerMessage) {
    match serde_json::to_string(frame) {
        Ok(json) => {
            let _ = sender.send(WsMessage::text(json));
        }
        Err(e) => warn!("failed to serialize reply: {e}"),
    }
}

async fn handle_connection(stream: TcpStream, broker: Arc<Mutex<Broker>>) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake error: {e}");
            return;
        }
    };
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();
    let peer = Peer::new(tx.clone());
    let peer_id = peer.id.clone();
    lock(&broker).register_peer(peer);

    let cleanup_called = Arc::new(AtomicBool::new(false));

    let do_cleanup = {
        let broker = broker.clone();
        let peer_id = peer_id.clone();
        let cleanup_called = cleanup_called.clone();

        move || {
            if !cleanup_called.swap(true, Ordering::SeqCst) {
                lock(&broker).cleanup_peer(&peer_id);
            }
        }
    };

    {
        let peer_id = peer_id.clone();
        let do_cleanup = do_cleanup.clone();

        spawn(async move {
            while let Some(msg) = rx.recv().await {
                if let Err(e) = ws_sender.send(msg).await {
                    warn!(peer = %peer_id, "failed to send frame: {e}");
                    break;
                }
            }
            let _ = ws_sender.close().await;

            do_cleanup();
            debug!(peer = %peer_id, "send loop closed");
        });
    }

    while let Some(Ok(msg)) = ws_receiver.next().await {
        if msg.is_close() {
            break;
        }
        let Ok(text) = msg.to_text() else {
            continue;
        };
        if text.is_empty() {
            continue;
        }

        match serde_json::from_str::<ClientMessage>(text) {
            Ok(ClientMessage::Connect {
                client_id,
                username,
                ..
            }) => {
                lock(&broker).identify(&peer_id, &client_id);
                info!(peer = %peer_id, %client_id, %username, "client connected");
                reply(&tx, &ServerMessage::ConnAck {
                    session_id: peer_id.clone(),
                });
            }
            Ok(ClientMessage::Subscribe { topic, .. }) => {
                lock(&broker).subscribe(&topic, peer_id.clone());
                debug!(peer = %peer_id, %topic, "subscribed");
                reply(&tx, &ServerMessage::SubAck { topic });
            }
            Ok(ClientMessage::Unsubscribe { topic }) => {
                lock(&broker).unsubscribe(&topic, &peer_id);
                debug!(peer = %peer_id, %topic, "unsubscribed");
                reply(&tx, &ServerMessage::UnsubAck { topic });
            }
            Ok(ClientMessage::Publish {
                topic,
                payload,
                qos,
                message_id,
                ..
            }) => {
                let message_id = message_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
                let delivered = lock(&broker).publish(Message {
                    topic: topic.clone(),
                    payload,
                    timestamp: 0,
                    message_id: message_id.clone(),
                    qos,
                });
                debug!(peer = %peer_id, %topic, delivered, "published");
                if qos > 0 {
                    reply(&tx, &ServerMessage::PubAck { message_id });
                }
            }
            Ok(ClientMessage::Disconnect) => {
                debug!(peer = %peer_id, "client requested disconnect");
                break;
            }
            Err(err) => {
                warn!(
                    peer = %peer_id,
                    "invalid client frame: {err} | {}",
                    text.chars().take(100).collect::<String>()
                );
                reply(&tx, &ServerMessage::Error {
                    message: format!("invalid frame: {err}"),
                });
            }
        }
    }

    info!(peer = %peer_id, "connection closed");
    do_cleanup();
    // Dropping the last sender ends the send loop, which closes the socket.
    drop(tx);
}
