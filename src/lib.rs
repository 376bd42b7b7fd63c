//! # orderflow
//!
//! `orderflow` is a resilient publish/subscribe layer with an order-processing
//! pipeline built on top of it. Connections are retried with exponential
//! backoff, re-established after unexpected drops with their subscription
//! re-armed, and inbound messages are deduplicated before they reach a
//! handler.
//!
//! ## Core Modules
//!
//! - `retry`: the backoff policy every retried operation runs under.
//! - `client`: the `BrokerClient` seam, with WebSocket and in-memory clients.
//! - `connection`: one managed connection per role, with autonomous reconnect.
//! - `subscription`: the single topic and handler a subscriber is bound to.
//! - `dedup`: the payload fingerprint gate in front of every handler.
//! - `pubsub`: publisher and subscriber facades composing the above.
//! - `orders`: the order model, processing pipeline and submission service.
//! - `metrics`: the sink observable side effects are reported to.
//! - `config`: layered configuration loading.
//! - `broker` and `transport`: a small WebSocket broker for development.
//! - `utils`: the error type and logging setup.

pub mod broker;
pub mod client;
pub mod config;
pub mod connection;
pub mod dedup;
pub mod metrics;
pub mod orders;
pub mod pubsub;
pub mod retry;
pub mod subscription;
pub mod transport;
pub mod utils;
