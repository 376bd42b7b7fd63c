//! Order processing
//!
//! `Pipeline` turns one inbound `orders/new` payload into either a processed
//! order on `orders/processed/{orderId}` or a single diagnostic on
//! `orders/error`. It never returns an error to its caller, so one bad
//! message cannot stop the consumer.
//!
//! `OrderProcessor` owns the lifecycle: it connects both roles and binds the
//! pipeline to `orders/new`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::client::{ClientFactory, InboundMessage};
use crate::config::Settings;
use crate::metrics::Metrics;
use crate::orders::{ERROR_TOPIC, NEW_ORDERS_TOPIC, Order, OrderStatus, PROCESSING_TIME_KEY, ProcessedOrders};
use crate::pubsub::{Publisher, Subscriber};
use crate::subscription::MessageHandler;
use crate::utils::BusError;

/// The domain work done for each order.
#[async_trait]
pub trait OrderWork: Send + Sync {
    async fn process(&self, order: &Order) -> anyhow::Result<()>;
}

/// Stands in for real work by waiting a fixed time.
#[derive(Debug, Clone, Copy)]
pub struct SimulatedWork {
    delay: Duration,
}

impl SimulatedWork {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl OrderWork for SimulatedWork {
    async fn process(&self, _order: &Order) -> anyhow::Result<()> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}

pub struct Pipeline {
    publisher: Publisher,
    metrics: Arc<dyn Metrics>,
    work: Arc<dyn OrderWork>,
    processed: ProcessedOrders,
}

impl Pipeline {
    pub fn new(publisher: Publisher, metrics: Arc<dyn Metrics>, work: Arc<dyn OrderWork>) -> Self {
        Self {
            publisher,
            metrics,
            work,
            processed: ProcessedOrders::new(),
        }
    }

    pub fn processed_orders(&self) -> &ProcessedOrders {
        &self.processed
    }

    pub async fn handle_incoming(&self, payload: &[u8]) {
        let mut order = match Order::from_json(payload) {
            Ok(order) => order,
            Err(err) => {
                error!(error = %err, payload = %String::from_utf8_lossy(payload), "invalid order");
                self.report_failure(format!("Error processing order: {err}")).await;
                return;
            }
        };

        if let Some(age) = self.processed.recently_processed(&order.order_id, Utc::now()) {
            warn!(
                order_id = %order.order_id,
                age_secs = age.num_seconds(),
                "order already processed, skipping"
            );
            return;
        }

        if let Err(err) = self.process(&mut order).await {
            if order.status == OrderStatus::Processing {
                order.status = OrderStatus::Failed;
            }
            error!(order_id = %order.order_id, status = %order.status, error = %err, "order processing failed");
            self.report_failure(format!("Error processing order {}: {err}", order.order_id))
                .await;
        }
    }

    async fn process(&self, order: &mut Order) -> anyhow::Result<()> {
        let started = Instant::now();
        // Redelivered orders may already carry Processing.
        if order.status != OrderStatus::Processing {
            order.transition(OrderStatus::Processing)?;
        }
        info!(order_id = %order.order_id, "processing order");

        self.work.process(order).await?;

        let mut result = order.clone();
        result.transition(OrderStatus::Processed)?;
        self.publisher
            .publish_json(&result.processed_topic(), &result)
            .await?;
        *order = result;

        let now = Utc::now();
        self.processed.record(&order.order_id, now);
        self.metrics.increment_processed();
        let elapsed = started.elapsed();
        self.metrics.record_processing_time(PROCESSING_TIME_KEY, elapsed);
        let evicted = self.processed.evict_expired(now);

        info!(
            order_id = %order.order_id,
            elapsed_ms = elapsed.as_millis() as u64,
            evicted,
            "order processed"
        );
        Ok(())
    }

    /// Publish one diagnostic to the error topic and count the failure.
    async fn report_failure(&self, diagnostic: String) {
        self.metrics.increment_failed();
        if let Err(err) = self.publisher.publish(ERROR_TOPIC, diagnostic).await {
            error!(error = %err, "could not publish to {ERROR_TOPIC}");
        }
    }
}

#[async_trait]
impl MessageHandler for Pipeline {
    async fn handle(&self, message: InboundMessage) -> anyhow::Result<()> {
        self.handle_incoming(&message.payload).await;
        Ok(())
    }
}

/// Runs the pipeline against `orders/new`.
pub struct OrderProcessor {
    subscriber: Subscriber,
    publisher: Publisher,
    pipeline: Arc<Pipeline>,
    running: Mutex<bool>,
}

impl OrderProcessor {
    pub fn new(subscriber: Subscriber, publisher: Publisher, pipeline: Arc<Pipeline>) -> Self {
        Self {
            subscriber,
            publisher,
            pipeline,
            running: Mutex::new(false),
        }
    }

    /// Wire both roles and a `SimulatedWork` pipeline from `settings`.
    pub fn from_settings(settings: &Settings, factory: Arc<dyn ClientFactory>, metrics: Arc<dyn Metrics>) -> Self {
        let subscriber = Subscriber::new(settings, factory.clone(), metrics.clone());
        let publisher = Publisher::new(settings, factory, metrics.clone());
        let work = Arc::new(SimulatedWork::new(settings.processing.delay()));
        let pipeline = Arc::new(Pipeline::new(publisher.clone(), metrics, work));
        Self::new(subscriber, publisher, pipeline)
    }

    pub async fn start_processing(&self) -> Result<(), BusError> {
        let mut running = self.running.lock().await;
        if *running {
            return Err(BusError::InvalidClientState(
                "order processing is already running".into(),
            ));
        }

        if !self.subscriber.is_connected() {
            self.subscriber.connect().await?;
        }
        if !self.publisher.is_connected() {
            self.publisher.connect().await?;
        }
        self.subscriber
            .subscribe(NEW_ORDERS_TOPIC, self.pipeline.clone())
            .await?;

        *running = true;
        info!("order processing started");
        Ok(())
    }

    pub async fn stop_processing(&self) -> Result<(), BusError> {
        let mut running = self.running.lock().await;
        if !*running {
            return Ok(());
        }

        self.subscriber.disconnect().await?;
        self.publisher.disconnect().await?;
        *running = false;
        info!("order processing stopped");
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        *self.running.lock().await
    }

    pub fn subscriber(&self) -> &Subscriber {
        &self.subscriber
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }
}
