//! The `broker` module is the bundled development broker: an in-memory
//! engine that tracks connected peers and their topic subscriptions and
//! fans published messages out to them.
//!
//! The engine is synchronous and meant to sit behind `Arc<Mutex<Broker>>`;
//! the `transport` module drives it from WebSocket connections.

pub mod engine;
pub mod message;
pub mod peer;
pub mod topic;

pub use engine::Broker;
pub use peer::Peer;
