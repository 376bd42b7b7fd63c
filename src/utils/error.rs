//! The `error` module defines the error taxonomy used within `orderflow`.
//!
//! Transport and timeout failures are what the backoff policy normally sees;
//! the remaining variants describe contract violations or bad input.

use std::time::Duration;

use thiserror::Error;

use crate::orders::OrderStatus;

#[derive(Debug, Error)]
pub enum BusError {
    /// Network or broker failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// A connection handshake or acknowledgement did not arrive in time.
    #[error("timed out after {}ms waiting for {waiting_for}", after.as_millis())]
    Timeout {
        after: Duration,
        waiting_for: String,
    },

    /// An operation needed a client handle that was never created.
    #[error("invalid client state: {0}")]
    InvalidClientState(String),

    #[error("failed to deserialize payload: {0}")]
    Deserialization(#[from] serde_json::Error),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("order {order_id} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        order_id: String,
        from: OrderStatus,
        to: OrderStatus,
    },

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl BusError {
    pub fn timeout(after: Duration, waiting_for: impl Into<String>) -> Self {
        Self::Timeout {
            after,
            waiting_for: waiting_for.into(),
        }
    }
}

impl From<tungstenite::Error> for BusError {
    fn from(err: tungstenite::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
