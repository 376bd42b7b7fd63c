use serde::{Deserialize, Serialize};

use crate::transport::ServerMessage;

/// Represents a published message in the bundled broker.
///
/// A message consists of a topic identifier, the payload content, a
/// timestamp indicating when the broker accepted it, a unique id and the
/// delivery mode requested by the publisher.
///
/// # Fields
///
/// - `topic` - The name of the topic this message belongs to.
/// - `payload` - The message content, usually a JSON-encoded string.
/// - `timestamp` - Milliseconds since the UNIX epoch, set by the broker.
/// - `message_id` - Opaque id; generated by the broker when the publisher
///   did not supply one.
/// - `qos` - `0` = at-most-once, `1` = at-least-once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub topic: String,
    pub payload: String,
    pub timestamp: i64,
    pub message_id: String,
    pub qos: u8,
}

impl From<Message> for ServerMessage {
    fn from(msg: Message) -> Self {
        ServerMessage::Message {
            topic: msg.topic,
            payload: msg.payload,
            timestamp: msg.timestamp,
            message_id: msg.message_id,
            qos: msg.qos,
        }
    }
}
