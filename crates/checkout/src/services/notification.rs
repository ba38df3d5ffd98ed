//! Order receipt notifier trait and implementations.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::OrderId;
use store::Order;
use thiserror::Error;
use tokio::sync::{Mutex, Notify};

use crate::receipt::Receipt;

/// Failure reported by a notification channel.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// The transport refused or failed to deliver the message.
    #[error("Delivery to {recipient} failed: {reason}")]
    DeliveryFailed { recipient: String, reason: String },
}

/// Channel that sends order receipts.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends the receipt for `order` to `recipient`.
    async fn send_order_receipt(
        &self,
        recipient: &str,
        order: &Order,
    ) -> Result<(), NotificationError>;
}

#[async_trait]
impl<T: Notifier + ?Sized> Notifier for Arc<T> {
    async fn send_order_receipt(
        &self,
        recipient: &str,
        order: &Order,
    ) -> Result<(), NotificationError> {
        (**self).send_order_receipt(recipient, order).await
    }
}

/// Notifier used when no mail transport is configured: logs the receipt.
#[derive(Debug, Clone)]
pub struct LogNotifier {
    from_address: String,
}

impl LogNotifier {
    pub fn new(from_address: impl Into<String>) -> Self {
        Self {
            from_address: from_address.into(),
        }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_order_receipt(
        &self,
        recipient: &str,
        order: &Order,
    ) -> Result<(), NotificationError> {
        let receipt = Receipt::for_order(order);
        tracing::info!(
            from = %self.from_address,
            to = recipient,
            order_id = %order.id,
            subject = %receipt.subject,
            body_bytes = receipt.html.len(),
            "mail transport not configured, receipt logged only"
        );
        Ok(())
    }
}

/// A receipt recorded by [`InMemoryNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub recipient: String,
    pub order_id: OrderId,
    pub receipt: Receipt,
}

#[derive(Debug, Default)]
struct InMemoryNotifierState {
    deliveries: Vec<Delivery>,
    attempts: usize,
    fail: bool,
}

/// In-memory notifier for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    state: Arc<Mutex<InMemoryNotifierState>>,
    attempted: Arc<Notify>,
}

impl InMemoryNotifier {
    /// Creates a new in-memory notifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the notifier to fail every send.
    pub async fn set_fail(&self, fail: bool) {
        self.state.lock().await.fail = fail;
    }

    /// Returns the receipts delivered so far.
    pub async fn deliveries(&self) -> Vec<Delivery> {
        self.state.lock().await.deliveries.clone()
    }

    /// Returns how many sends were attempted, failed ones included.
    pub async fn attempts(&self) -> usize {
        self.state.lock().await.attempts
    }

    /// Waits until at least `count` sends were attempted.
    ///
    /// Returns false if that does not happen within `timeout`.
    pub async fn wait_for_attempts(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.attempts().await >= count {
                return true;
            }
            if tokio::time::timeout_at(deadline, self.attempted.notified())
                .await
                .is_err()
            {
                return self.attempts().await >= count;
            }
        }
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn send_order_receipt(
        &self,
        recipient: &str,
        order: &Order,
    ) -> Result<(), NotificationError> {
        let result = {
            let mut state = self.state.lock().await;
            state.attempts += 1;

            if state.fail {
                Err(NotificationError::DeliveryFailed {
                    recipient: recipient.to_string(),
                    reason: "transport unavailable".to_string(),
                })
            } else {
                state.deliveries.push(Delivery {
                    recipient: recipient.to_string(),
                    order_id: order.id,
                    receipt: Receipt::for_order(order),
                });
                Ok(())
            }
        };

        // notify_one keeps a permit, so a waiter that checks late still wakes.
        self.attempted.notify_one();
        result
    }
}
