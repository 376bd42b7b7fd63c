use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::orders::processed_topic;
use crate::utils::BusError;

/// Where an order is in its lifecycle. Encoded on the wire as an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum OrderStatus {
    New,
    Processing,
    Processed,
    Failed,
}

impl OrderStatus {
    /// Status only moves forward: `New -> Processing -> Processed | Failed`.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::New, OrderStatus::Processing)
                | (OrderStatus::Processing, OrderStatus::Processed)
                | (OrderStatus::Processing, OrderStatus::Failed)
        )
    }
}

impl From<OrderStatus> for u8 {
    fn from(status: OrderStatus) -> Self {
        match status {
            OrderStatus::New => 0,
            OrderStatus::Processing => 1,
            OrderStatus::Processed => 2,
            OrderStatus::Failed => 3,
        }
    }
}

impl TryFrom<u8> for OrderStatus {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(OrderStatus::New),
            1 => Ok(OrderStatus::Processing),
            2 => Ok(OrderStatus::Processed),
            3 => Ok(OrderStatus::Failed),
            other => Err(format!("unknown order status {other}")),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub order_id: String,
    pub customer_name: String,
    pub product_name: String,
    pub timestamp: DateTime<Utc>,
    pub status: OrderStatus,
}

impl Order {
    /// A fresh `New` order with a random id, stamped now.
    pub fn new(customer_name: impl Into<String>, product_name: impl Into<String>) -> Self {
        Self {
            order_id: Uuid::new_v4().to_string(),
            customer_name: customer_name.into(),
            product_name: product_name.into(),
            timestamp: Utc::now(),
            status: OrderStatus::New,
        }
    }

    pub fn from_json(payload: &[u8]) -> Result<Self, BusError> {
        Ok(serde_json::from_slice(payload)?)
    }

    /// Reject blank customer or product names.
    pub fn validate(&self) -> Result<(), BusError> {
        if self.customer_name.trim().is_empty() {
            return Err(BusError::Validation("customer name must not be empty".into()));
        }
        if self.product_name.trim().is_empty() {
            return Err(BusError::Validation("product name must not be empty".into()));
        }
        Ok(())
    }

    pub fn transition(&mut self, next: OrderStatus) -> Result<(), BusError> {
        if !self.status.can_transition_to(next) {
            return Err(BusError::InvalidTransition {
                order_id: self.order_id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Topic the processed result of this order is published to.
    pub fn processed_topic(&self) -> String {
        processed_topic(&self.order_id)
    }
}
