use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::client::InboundMessage;
use crate::metrics::Metrics;
use crate::orders::{NEW_ORDERS_TOPIC, Order};
use crate::pubsub::{Publisher, Subscriber};
use crate::subscription::handler_fn;
use crate::utils::BusError;

/// Creates orders and hands them to the processing side.
#[derive(Clone)]
pub struct OrderService {
    publisher: Publisher,
    metrics: Arc<dyn Metrics>,
}

impl OrderService {
    pub fn new(publisher: Publisher, metrics: Arc<dyn Metrics>) -> Self {
        Self { publisher, metrics }
    }

    /// Validate and publish a new order. Nothing is published when
    /// validation fails.
    pub async fn create_order(&self, customer_name: &str, product_name: &str) -> Result<Order, BusError> {
        let order = Order::new(customer_name, product_name);
        self.submit(&order).await?;
        Ok(order)
    }

    async fn submit(&self, order: &Order) -> Result<(), BusError> {
        order.validate()?;
        if let Err(err) = self.publisher.publish_json(NEW_ORDERS_TOPIC, order).await {
            error!(order_id = %order.order_id, error = %err, "failed to publish order");
            return Err(err);
        }
        self.metrics.increment_orders_created();
        info!(
            order_id = %order.order_id,
            customer = %order.customer_name,
            "order created"
        );
        Ok(())
    }

    /// Submit an order and wait up to `timeout` for its processed result.
    ///
    /// `subscriber` is bound to the order's result topic before the order is
    /// published. On timeout the order stays published.
    pub async fn submit_and_wait(
        &self,
        subscriber: &Subscriber,
        customer_name: &str,
        product_name: &str,
        timeout: Duration,
    ) -> Result<Order, BusError> {
        let order = Order::new(customer_name, product_name);
        order.validate()?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let tx = Mutex::new(Some(tx));
        let handler = handler_fn(move |message: InboundMessage| {
            let result = Order::from_json(&message.payload);
            let sender = match result {
                Ok(processed) => tx
                    .lock()
                    .ok()
                    .and_then(|mut slot| slot.take())
                    .map(|sender| (sender, processed)),
                Err(err) => {
                    warn!(topic = %message.topic, error = %err, "unreadable result");
                    None
                }
            };
            async move {
                if let Some((sender, processed)) = sender {
                    let _ = sender.send(processed);
                }
                Ok::<_, anyhow::Error>(())
            }
        });
        subscriber.subscribe(&order.processed_topic(), handler).await?;

        self.submit(&order).await?;
        info!(order_id = %order.order_id, "waiting for the order to be processed");

        let outcome = tokio::time::timeout(timeout, rx.recv()).await;
        if let Err(err) = subscriber.unsubscribe(&order.processed_topic()).await {
            warn!(error = %err, "failed to unsubscribe from result topic");
        }
        match outcome {
            Ok(Some(processed)) => {
                info!(order_id = %processed.order_id, status = %processed.status, "order completed");
                Ok(processed)
            }
            Ok(None) => Err(BusError::Transport("result subscription closed".into())),
            Err(_) => {
                error!(order_id = %order.order_id, "order processing timed out");
                Err(BusError::timeout(timeout, format!("order {}", order.order_id)))
            }
        }
    }
}
