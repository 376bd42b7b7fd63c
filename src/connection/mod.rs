//! The `connection` module keeps one broker connection per role alive.
//!
//! `ConnectionManager` serializes every mutation of a connection behind a
//! single async mutex, reconnects autonomously after an unrequested drop and
//! re-arms the stored subscription before reporting the connection ready.
//! `HealthMonitor` periodically logs the state of a set of managers.

pub mod health;
pub mod manager;
pub mod state;

pub use health::{HealthMonitor, HealthReport};
pub use manager::{ConnectionConfig, ConnectionGuard, ConnectionManager, InboundSink};
pub use state::{ConnectionState, Role};
