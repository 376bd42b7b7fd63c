use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::time::Instant;
use tracing::{debug, error};

use crate::client::InboundMessage;
use crate::connection::InboundSink;
use crate::dedup::{DedupCache, Fingerprint};
use crate::metrics::Metrics;
use crate::subscription::SubscriptionReader;

/// Routes inbound messages to the subscribed handler through the dedup
/// gate.
///
/// Each accepted message runs on its own task, so a slow handler never
/// holds up delivery. Handlers start in delivery order but may overlap.
pub struct Dispatcher {
    subscriptions: SubscriptionReader,
    dedup: DedupCache,
    metrics: Arc<dyn Metrics>,
    in_flight: Arc<AtomicUsize>,
}

impl Dispatcher {
    pub fn new(subscriptions: SubscriptionReader, dedup: DedupCache, metrics: Arc<dyn Metrics>) -> Self {
        Self {
            subscriptions,
            dedup,
            metrics,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Topic of the current subscription, if any.
    pub fn topic(&self) -> Option<String> {
        self.subscriptions.topic()
    }

    /// Handlers started but not yet finished.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

impl InboundSink for Dispatcher {
    fn deliver(&self, message: InboundMessage) {
        let Some(handler) = self.subscriptions.handler_for(&message.topic) else {
            debug!(topic = %message.topic, "no handler for topic, dropping message");
            return;
        };

        let fingerprint = Fingerprint::of(&message.payload);
        if !self.dedup.should_process(&fingerprint) {
            debug!(topic = %message.topic, %fingerprint, "duplicate message suppressed");
            return;
        }

        let depth = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.metrics.record_queue_length(depth);

        let metrics = self.metrics.clone();
        let in_flight = self.in_flight.clone();
        tokio::spawn(async move {
            let started = Instant::now();
            let topic = message.topic.clone();
            if let Err(err) = handler.handle(message).await {
                error!(%topic, error = %err, "message handler failed");
            }
            metrics.record_processing_time(&topic, started.elapsed());

            let depth = in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
            metrics.record_queue_length(depth);
        });
    }
}
