//! The `orders` module is the order workflow built on the pub/sub layer.
//!
//! - `order`: the `Order` record and its status state machine.
//! - `cache`: the time-windowed record of recently processed order ids.
//! - `processor`: the consuming pipeline and its start/stop lifecycle.
//! - `submission`: creating orders and waiting for their results.

pub mod cache;
pub mod order;
pub mod processor;
pub mod submission;

pub use cache::{PROCESSED_WINDOW, ProcessedOrders};
pub use order::{Order, OrderStatus};
pub use processor::{OrderProcessor, OrderWork, Pipeline, SimulatedWork};
pub use submission::OrderService;

pub const NEW_ORDERS_TOPIC: &str = "orders/new";
pub const PROCESSED_TOPIC_PREFIX: &str = "orders/processed";
pub const ERROR_TOPIC: &str = "orders/error";
/// Metrics key every processed order's duration is recorded under.
pub const PROCESSING_TIME_KEY: &str = "orders/processing";

pub fn processed_topic(order_id: &str) -> String {
    format!("{PROCESSED_TOPIC_PREFIX}/{order_id}")
}
