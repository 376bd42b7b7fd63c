//! The `subscription` module tracks what a subscriber is bound to.
//!
//! A subscriber holds at most one `Subscription`: a topic and the handler
//! inbound messages on that topic are given to. The record survives a
//! dropped connection so the connection layer can re-arm it after
//! reconnecting.

pub mod registry;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::client::InboundMessage;

pub use registry::{Subscription, SubscriptionReader, SubscriptionRegistry};

/// Receives messages that passed the dedup gate.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: InboundMessage) -> anyhow::Result<()>;
}

/// Adapts an async closure into a `MessageHandler`.
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(InboundMessage) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn handle(&self, message: InboundMessage) -> anyhow::Result<()> {
        (self.0)(message).await
    }
}

pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn MessageHandler>
where
    F: Fn(InboundMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

#[cfg(test)]
mod tests;
