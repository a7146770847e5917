use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::money::Money;
use crate::domain::order::OrderError;
use crate::store::OrderStore;
use super::events::{OrderPaymentSucceeded, PaymentEventSink};
use super::value_objects::{Payment, PaymentStatus};

// ============================================================================
// Payment Ledger - records payments and raises OrderPaymentSucceeded
// ============================================================================
//
// The ledger never touches order status. A payment reaching `success` while
// linked to an order produces one event, published after the payment write
// has committed. The payment stays recorded when publishing fails; the
// failure is handed back in `Announcement::Failed`.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Announcement {
    /// No success transition, or no linked order.
    NotRequired,
    Delivered,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct RecordedPayment {
    pub payment: Payment,
    pub announcement: Announcement,
}

impl Announcement {
    pub fn label(&self) -> &'static str {
        match self {
            Announcement::NotRequired => "not_required",
            Announcement::Delivered => "delivered",
            Announcement::Failed(_) => "failed",
        }
    }
}

impl RecordedPayment {
    pub fn delivery_failed(&self) -> bool {
        matches!(self.announcement, Announcement::Failed(_))
    }
}

pub struct PaymentLedger {
    store: Arc<dyn OrderStore>,
    sink: Arc<dyn PaymentEventSink>,
}

impl PaymentLedger {
    pub fn new(store: Arc<dyn OrderStore>, sink: Arc<dyn PaymentEventSink>) -> Self {
        Self { store, sink }
    }

    /// Record a new payment, optionally linked to an order.
    pub async fn record_payment(
        &self,
        user_id: Uuid,
        order_id: Option<Uuid>,
        reference: &str,
        amount: Money,
        status: PaymentStatus,
    ) -> Result<RecordedPayment, OrderError> {
        let payment = Payment::new(user_id, order_id, reference, amount, status);

        let mut tx = self.store.begin().await?;
        if let Some(order_id) = order_id {
            if tx.load_order(order_id).await?.is_none() {
                return Err(OrderError::OrderNotFound(order_id));
            }
        }
        tx.insert_payment(&payment).await?;
        tx.commit().await?;

        tracing::info!(
            payment_id = %payment.id,
            order_id = ?order_id,
            reference = %payment.reference,
            status = %payment.status,
            "Payment recorded"
        );

        let announcement = if payment.is_success() {
            self.announce(&payment).await
        } else {
            Announcement::NotRequired
        };
        Ok(RecordedPayment { payment, announcement })
    }

    /// Move a payment to `status`. Only a change into `success` is announced.
    pub async fn record_status(&self, payment_id: Uuid, status: PaymentStatus) -> Result<RecordedPayment, OrderError> {
        let mut tx = self.store.begin().await?;
        let mut payment = tx
            .load_payment(payment_id)
            .await?
            .ok_or(OrderError::PaymentNotFound(payment_id))?;

        let previous = payment.status;
        let now = Utc::now();
        tx.update_payment_status(payment_id, status, now).await?;
        tx.commit().await?;

        payment.status = status;
        payment.updated_at = now;

        tracing::info!(
            payment_id = %payment_id,
            order_id = ?payment.order_id,
            from = %previous,
            to = %status,
            "Payment status updated"
        );

        let announcement = if status == PaymentStatus::Success && previous != PaymentStatus::Success {
            self.announce(&payment).await
        } else {
            Announcement::NotRequired
        };
        Ok(RecordedPayment { payment, announcement })
    }

    async fn announce(&self, payment: &Payment) -> Announcement {
        let Some(order_id) = payment.order_id else {
            return Announcement::NotRequired;
        };

        let event = OrderPaymentSucceeded {
            order_id,
            payment_id: payment.id,
            reference: payment.reference.clone(),
            occurred_at: payment.updated_at,
        };

        match self.sink.publish(event).await {
            Ok(()) => Announcement::Delivered,
            Err(e) => {
                tracing::error!(
                    order_id = %order_id,
                    payment_id = %payment.id,
                    error = %e,
                    "Failed to deliver payment success event"
                );
                Announcement::Failed(e.to_string())
            }
        }
    }
}
