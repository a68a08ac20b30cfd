//! Order manager: drives an order through its state machine with bounded
//! retries and exponential backoff, persisting every transition.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::order::{Order, OrderStatus};
use crate::models::TradeAction;
use crate::storage::Store;
use crate::venues::polymarket::{OrderSubmission, PolymarketClient};
use crate::venues::VenueResult;

/// Order endpoints of the primary venue.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    async fn submit_order(
        &self,
        market_id: &str,
        side: TradeAction,
        size: f64,
        price: f64,
    ) -> VenueResult<OrderSubmission>;

    async fn order_status(&self, external_id: &str) -> VenueResult<OrderSubmission>;

    async fn cancel_order(&self, external_id: &str) -> VenueResult<bool>;
}

#[async_trait]
impl OrderGateway for PolymarketClient {
    async fn submit_order(
        &self,
        market_id: &str,
        side: TradeAction,
        size: f64,
        price: f64,
    ) -> VenueResult<OrderSubmission> {
        self.create_order(market_id, side.as_str(), size, price).await
    }

    async fn order_status(&self, external_id: &str) -> VenueResult<OrderSubmission> {
        self.get_order(external_id).await
    }

    async fn cancel_order(&self, external_id: &str) -> VenueResult<bool> {
        PolymarketClient::cancel_order(self, external_id).await
    }
}

pub struct OrderManager {
    store: Store,
    gateway: Arc<dyn OrderGateway>,
    retry_delay: Duration,
    backoff_multiplier: f64,
    pub max_attempts: u32,
}

impl OrderManager {
    pub fn new(store: Store, gateway: Arc<dyn OrderGateway>) -> Self {
        Self {
            store,
            gateway,
            retry_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            max_attempts: 3,
        }
    }

    pub fn with_retry_policy(mut self, delay: Duration, multiplier: f64, attempts: u32) -> Self {
        self.retry_delay = delay;
        self.backoff_multiplier = multiplier;
        self.max_attempts = attempts;
        self
    }

    pub async fn create_order(
        &self,
        signal_id: &str,
        market_id: &str,
        side: TradeAction,
        size: f64,
        price: f64,
    ) -> anyhow::Result<Order> {
        let order = Order::new(signal_id, market_id, side, size, price, self.max_attempts);
        self.store.insert_order(&order).await?;
        Ok(order)
    }

    /// Submit with retries. A partial fill followed by a retry submits only
    /// the remaining size; the final state is persisted on every transition.
    pub async fn execute_with_retry(&self, mut order: Order) -> anyhow::Result<Order> {
        let mut delay = self.retry_delay;

        while order.attempts < order.max_attempts {
            info!(
                order_id = %order.id,
                attempt = order.attempts + 1,
                max = order.max_attempts,
                "submitting order"
            );

            let submit_size = if order.filled_size > 0.0 {
                order.remaining_size()
            } else {
                order.requested_size
            };

            match self
                .gateway
                .submit_order(&order.market_id, order.side, submit_size, order.requested_price)
                .await
            {
                Ok(result) => {
                    order.mark_submitted(&result.order_id);
                    self.store.update_order(&order).await?;

                    match result.status.as_str() {
                        "filled" => {
                            let price = result.filled_price.unwrap_or(order.requested_price);
                            order.mark_filled(order.requested_size, price);
                            self.store.update_order(&order).await?;
                            info!(order_id = %order.id, price, "order filled");
                            break;
                        }
                        "partial" => {
                            let price = result.filled_price.unwrap_or(order.requested_price);
                            let filled = order.filled_size + result.filled_size;
                            order.mark_partial(filled.min(order.requested_size), price);
                            self.store.update_order(&order).await?;
                            info!(
                                order_id = %order.id,
                                filled = order.filled_size,
                                requested = order.requested_size,
                                "order partially filled"
                            );
                            break;
                        }
                        other => {
                            order.mark_failed(&format!("Unexpected status: {}", other));
                            self.store.update_order(&order).await?;
                        }
                    }
                }
                Err(e) => {
                    order.attempts += 1;
                    warn!(order_id = %order.id, error = %e, "order submission failed");
                    order.mark_failed(&e.to_string());
                    self.store.update_order(&order).await?;

                    if order.can_retry() {
                        info!(order_id = %order.id, delay_ms = delay.as_millis() as u64, "retrying");
                        tokio::time::sleep(delay).await;
                        delay = Duration::from_secs_f64(
                            delay.as_secs_f64() * self.backoff_multiplier,
                        );
                        order.reset_for_retry();
                        self.store.update_order(&order).await?;
                    }
                }
            }
        }

        self.store.update_order(&order).await?;
        Ok(order)
    }

    /// Cancel a resting order. Errors when the order is in a terminal state.
    pub async fn cancel(&self, order_id: &str) -> anyhow::Result<Order> {
        let Some(mut order) = self.store.get_order(order_id).await? else {
            anyhow::bail!("order {} not found", order_id);
        };
        if !order.is_cancellable() {
            anyhow::bail!(
                "order {} is {} and cannot be cancelled",
                order_id,
                order.status.as_str()
            );
        }

        if order.status == OrderStatus::Submitted {
            if let Some(external_id) = &order.external_id {
                match self.gateway.cancel_order(external_id).await {
                    Ok(true) => {}
                    Ok(false) => warn!(order_id, "venue refused cancellation"),
                    Err(e) => warn!(order_id, error = %e, "cancellation request failed"),
                }
            }
        }

        order.mark_cancelled();
        self.store.update_order(&order).await?;
        Ok(order)
    }
}
