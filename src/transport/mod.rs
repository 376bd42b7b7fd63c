//! The `transport` module is responsible for network communication between
//! broker clients and the bundled broker over WebSockets.
//!
//! It defines the JSON framing used on the wire and implements the WebSocket
//! server, managing connections, parsing frames and forwarding requests to
//! the broker engine.

pub mod message;
pub mod websocket;

pub use message::{ClientMessage, ServerMessage};
pub use websocket::{serve, start_websocket_server};
