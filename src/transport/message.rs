//! Frames exchanged between broker clients and the bundled WebSocket broker.
//!
//! Every frame is a JSON object tagged by `type`. Payloads travel as UTF-8
//! strings; `qos` is `0` (at-most-once) or `1` (at-least-once).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "connect")]
    Connect {
        client_id: String,
        #[serde(default)]
        username: String,
        #[serde(default)]
        password: String,
    },
    #[serde(rename = "subscribe")]
    Subscribe {
        topic: String,
        #[serde(default)]
        qos: u8,
    },
    #[serde(rename = "unsubscribe")]
    Unsubscribe { topic: String },
    #[serde(rename = "publish")]
    Publish {
        topic: String,
        payload: String,
        #[serde(default)]
        qos: u8,
        #[serde(default)]
        retain: bool,
        message_id: Option<String>,
    },
    #[serde(rename = "disconnect")]
    Disconnect,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "conn_ack")]
    ConnAck { session_id: String },
    #[serde(rename = "sub_ack")]
    SubAck { topic: String },
    #[serde(rename = "unsub_ack")]
    UnsubAck { topic: String },
    #[serde(rename = "pub_ack")]
    PubAck { message_id: String },
    #[serde(rename = "error")]
    Error { message: String },
    #[serde(rename = "message")]
    Message {
        topic: String,
        payload: String,
        timestamp: i64,
        message_id: String,
        qos: u8,
    },
}
