//! Subscription registry
//!
//! `SubscriptionRegistry` is mutated only through `&mut self`, which in
//! practice means while the owning connection's mutex is held, so a
//! resubscription after reconnect can never race a fresh `subscribe`.
//! Message dispatch reads the current handler through a
//! `SubscriptionReader` without touching that mutex.

use std::fmt;
use std::sync::{Arc, RwLock};

use crate::subscription::MessageHandler;

#[derive(Clone)]
pub struct Subscription {
    pub topic: String,
    pub handler: Arc<dyn MessageHandler>,
}

impl Subscription {
    pub fn new(topic: impl Into<String>, handler: Arc<dyn MessageHandler>) -> Self {
        Self {
            topic: topic.into(),
            handler,
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    active: Arc<RwLock<Option<Subscription>>>,
    /// Whether the broker knows about `active` on the current connection.
    armed: bool,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reader(&self) -> SubscriptionReader {
        SubscriptionReader {
            active: self.active.clone(),
        }
    }

    pub fn current(&self) -> Option<Subscription> {
        self.active.read().ok().and_then(|active| active.clone())
    }

    pub fn topic(&self) -> Option<String> {
        self.current().map(|sub| sub.topic)
    }

    /// True when `topic` is registered and live on the broker.
    pub fn is_armed_for(&self, topic: &str) -> bool {
        self.armed && self.topic().as_deref() == Some(topic)
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Install `subscription`, replacing any previous one, and mark it armed.
    pub fn replace(&mut self, subscription: Subscription) -> Option<Subscription> {
        self.armed = true;
        self.write(Some(subscription))
    }

    pub fn mark_armed(&mut self) {
        self.armed = self.current().is_some();
    }

    /// Keep the record but note that the broker no longer has it.
    pub fn disarm(&mut self) {
        self.armed = false;
    }

    pub fn clear(&mut self) -> Option<Subscription> {
        self.armed = false;
        self.write(None)
    }

    fn write(&mut self, next: Option<Subscription>) -> Option<Subscription> {
        let mut active = self.active.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::replace(&mut *active, next)
    }
}

/// Read-only view of a registry for the message path.
#[derive(Debug, Clone)]
pub struct SubscriptionReader {
    active: Arc<RwLock<Option<Subscription>>>,
}

impl SubscriptionReader {
    /// Handler registered for exactly `topic`, if any.
    pub fn handler_for(&self, topic: &str) -> Option<Arc<dyn MessageHandler>> {
        let active = self.active.read().ok()?;
        active
            .as_ref()
            .filter(|sub| sub.topic == topic)
            .map(|sub| sub.handler.clone())
    }

    pub fn topic(&self) -> Option<String> {
        let active = self.active.read().ok()?;
        active.as_ref().map(|sub| sub.topic.clone())
    }
}
