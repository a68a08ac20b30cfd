//! Order state machine.
//!
//! `pending → submitted → {filled, partial, failed, cancelled}`; a failed
//! order re-enters `pending` while it has attempts left. Only pending and
//! submitted orders are cancellable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::TradeAction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Submitted,
    Filled,
    Partial,
    Failed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Submitted => "submitted",
            OrderStatus::Filled => "filled",
            OrderStatus::Partial => "partial",
            OrderStatus::Failed => "failed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "submitted" => Some(Self::Submitted),
            "filled" => Some(Self::Filled),
            "partial" => Some(Self::Partial),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub signal_id: String,
    pub market_id: String,
    pub side: TradeAction,
    pub requested_size: f64,
    pub requested_price: f64,
    pub external_id: Option<String>,
    pub status: OrderStatus,
    pub filled_size: f64,
    pub filled_price: Option<f64>,
    pub attempts: u32,
    pub max_attempts: u32,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(
        signal_id: &str,
        market_id: &str,
        side: TradeAction,
        requested_size: f64,
        requested_price: f64,
        max_attempts: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            signal_id: signal_id.to_string(),
            market_id: market_id.to_string(),
            side,
            requested_size,
            requested_price,
            external_id: None,
            status: OrderStatus::Pending,
            filled_size: 0.0,
            filled_price: None,
            attempts: 0,
            max_attempts,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn remaining_size(&self) -> f64 {
        self.requested_size - self.filled_size
    }

    pub fn can_retry(&self) -> bool {
        self.status == OrderStatus::Failed && self.attempts < self.max_attempts
    }

    pub fn is_cancellable(&self) -> bool {
        matches!(self.status, OrderStatus::Pending | OrderStatus::Submitted)
    }

    pub fn mark_submitted(&mut self, external_id: &str) {
        self.external_id = Some(external_id.to_string());
        self.status = OrderStatus::Submitted;
        self.attempts += 1;
        self.touch();
    }

    pub fn mark_filled(&mut self, filled_size: f64, filled_price: f64) {
        self.filled_size = filled_size;
        self.filled_price = Some(filled_price);
        self.status = OrderStatus::Filled;
        self.touch();
    }

    pub fn mark_partial(&mut self, filled_size: f64, filled_price: f64) {
        self.filled_size = filled_size;
        self.filled_price = Some(filled_price);
        self.status = OrderStatus::Partial;
        self.touch();
    }

    pub fn mark_failed(&mut self, reason: &str) {
        self.failure_reason = Some(reason.to_string());
        self.status = OrderStatus::Failed;
        self.touch();
    }

    pub fn mark_cancelled(&mut self) {
        self.status = OrderStatus::Cancelled;
        self.touch();
    }

    /// Failed orders with attempts left go back to pending for the retry.
    pub fn reset_for_retry(&mut self) {
        self.status = OrderStatus::Pending;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
