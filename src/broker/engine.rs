//! Broker engine
//!
//! This module contains the in-memory broker implementation responsible for:
//! - managing topics and subscriber lists
//! - publishing messages to subscribers
//! - removing every trace of a peer once its connection closes
//!
//! Concurrency and usage notes:
//! - The public API here is synchronous and designed to be held behind a
//!   lock (for example `Arc<Mutex<Broker>>`) by the transport layer. Frames
//!   are queued on per-peer channels, so no network I/O happens while the
//!   lock is held.

use std::collections::HashMap;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::broker::message::Message;
use crate::broker::peer::Peer;
use crate::broker::topic::{SubscriberId, Topic};
use crate::transport::ServerMessage;

#[derive(Debug, Default)]
pub struct Broker {
    pub topics: HashMap<String, Topic>,
    pub peers: HashMap<SubscriberId, Peer>,
}

impl Broker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_peer(&mut self, peer: Peer) {
        self.peers.insert(peer.id.clone(), peer);
    }

    pub fn remove_peer(&mut self, peer_id: &SubscriberId) {
        self.peers.remove(peer_id);
    }

    /// Record the identity a peer announced in its `connect` frame.
    pub fn identify(&mut self, peer_id: &SubscriberId, client_id: &str) {
        if let Some(peer) = self.peers.get_mut(peer_id) {
            peer.client_id = Some(client_id.to_string());
        }
    }

    /// Subscribes a peer to a topic. Automatically creates the topic if it doesn't exist.
    pub fn subscribe(&mut self, topic: &str, subscriber: SubscriberId) {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| Topic::new(topic))
            .subscribe(subscriber);
    }

    /// Unsubscribes a peer from a topic; unknown topics are ignored.
    pub fn unsubscribe(&mut self, topic: &str, subscriber: &SubscriberId) {
        if let Some(t) = self.topics.get_mut(topic) {
            t.unsubscribe(subscriber);
            if t.is_empty() {
                self.topics.remove(topic);
            }
        }
    }

    /// Publishes a message to every subscriber of its topic and returns how
    /// many peers it was queued for.
    ///
    /// The broker stamps the timestamp and fills in a message id when the
    /// publisher did not supply one.
    pub fn publish(&self, mut msg: Message) -> usize {
        msg.timestamp = chrono::Utc::now().timestamp_millis();
        if msg.message_id.is_empty() {
            msg.message_id = Uuid::new_v4().to_string();
        }

        let Some(topic) = self.topics.get(&msg.topic) else {
            debug!(topic = %msg.topic, "no subscribers for topic");
            return 0;
        };

        let frame: ServerMessage = msg.into();
        let mut delivered = 0;
        for sub_id in &topic.subscribers {
            match self.peers.get(sub_id) {
                Some(peer) if peer.send(&frame) => delivered += 1,
                Some(_) => warn!(peer = %sub_id, "failed to queue message for peer"),
                None => warn!(peer = %sub_id, "no peer registered with id"),
            }
        }
        delivered
    }

    /// Cleans up a peer by removing it and unsubscribing it from all topics.
    pub fn cleanup_peer(&mut self, peer_id: &SubscriberId) {
        self.remove_peer(peer_id);

        for topic in self.topics.values_mut() {
            topic.unsubscribe(peer_id);
        }
        self.topics.retain(|_, topic| !topic.is_empty());

        info!(peer = %peer_id, "cleaned up peer");
    }
}
