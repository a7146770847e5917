use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::order::{
    CommandContext, OrderCommand, OrderCommandHandler, OrderError, PaymentReaction, TerminalPaymentPolicy,
};
use crate::metrics::Metrics;
use crate::store::OrderStore;
use crate::utils::{retry_on_transient, RetryConfig};
use super::events::{OrderPaymentSucceeded, PaymentEventSink};

// ============================================================================
// Order Payment Subscriber - the only consumer of OrderPaymentSucceeded
// ============================================================================
//
// Each event is handled in a transaction scoped to its one order. Version
// conflicts and serialization failures rerun the whole transaction.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentEventOutcome {
    Reacted(PaymentReaction),
    /// The payment is gone, failed, or now belongs elsewhere.
    Superseded,
}

impl PaymentEventOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            PaymentEventOutcome::Reacted(reaction) => reaction.label(),
            PaymentEventOutcome::Superseded => "superseded",
        }
    }
}

pub struct OrderPaymentSubscriber {
    store: Arc<dyn OrderStore>,
    policy: TerminalPaymentPolicy,
    retry: RetryConfig,
    metrics: Arc<Metrics>,
}

impl OrderPaymentSubscriber {
    pub fn new(
        store: Arc<dyn OrderStore>,
        policy: TerminalPaymentPolicy,
        retry: RetryConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { store, policy, retry, metrics }
    }

    pub fn policy(&self) -> TerminalPaymentPolicy {
        self.policy
    }

    pub async fn handle(&self, event: &OrderPaymentSucceeded) -> Result<PaymentEventOutcome, OrderError> {
        let result = retry_on_transient(&self.retry, |attempt| self.try_handle(event, attempt))
            .await
            .into_result();

        match &result {
            Ok(outcome) => {
                self.metrics.record_payment_event(outcome.label());
                if let PaymentEventOutcome::Reacted(reaction) = outcome {
                    self.log_reaction(event, *reaction);
                }
            }
            Err(e) => {
                self.metrics.record_payment_event("failed");
                tracing::error!(
                    order_id = %event.order_id,
                    payment_id = %event.payment_id,
                    code = e.code(),
                    error = %e,
                    "Payment success event not applied"
                );
            }
        }

        result
    }

    async fn try_handle(&self, event: &OrderPaymentSucceeded, attempt: u32) -> Result<PaymentEventOutcome, OrderError> {
        let mut tx = self.store.begin().await?;

        let snapshot = tx
            .load_order(event.order_id)
            .await?
            .ok_or(OrderError::OrderNotFound(event.order_id))?;

        let payment = tx.load_payment(event.payment_id).await?;
        let still_valid = payment
            .as_ref()
            .is_some_and(|p| p.is_success() && p.order_id == Some(event.order_id));
        if !still_valid {
            tracing::warn!(
                order_id = %event.order_id,
                payment_id = %event.payment_id,
                "Payment no longer successful for this order, ignoring event"
            );
            return Ok(PaymentEventOutcome::Superseded);
        }

        let reaction = snapshot.order.payment_reaction(self.policy);
        let command = OrderCommand::ConfirmPayment {
            payment_id: event.payment_id,
            policy: self.policy,
        };
        let ctx = CommandContext::new().caused_by(event.payment_id);

        let outcome = OrderCommandHandler::apply_in(tx.as_mut(), snapshot.order, &command, &ctx).await?;
        tx.commit().await?;

        if outcome.status_changed() {
            self.metrics
                .record_transition(outcome.previous_status.as_str(), outcome.order.status.as_str());
        }
        tracing::debug!(
            order_id = %event.order_id,
            attempt = attempt,
            written = !outcome.is_no_op(),
            "Payment event handled"
        );

        Ok(PaymentEventOutcome::Reacted(reaction))
    }

    fn log_reaction(&self, event: &OrderPaymentSucceeded, reaction: PaymentReaction) {
        match reaction {
            PaymentReaction::AlreadyPending => tracing::debug!(
                order_id = %event.order_id,
                "Order already Pending, payment event is a no-op"
            ),
            PaymentReaction::ResetToPending { from } => tracing::info!(
                order_id = %event.order_id,
                from = %from,
                "Payment success moved order back to Pending"
            ),
            PaymentReaction::IgnoredClosed { status } => tracing::warn!(
                order_id = %event.order_id,
                payment_id = %event.payment_id,
                status = %status,
                "Payment success for a closed order ignored"
            ),
            PaymentReaction::Reopened { from } => tracing::warn!(
                order_id = %event.order_id,
                payment_id = %event.payment_id,
                from = %from,
                "Closed order reopened by payment success"
            ),
        }
    }
}

/// Inline delivery: publishing handles the event before returning.
#[async_trait]
impl PaymentEventSink for OrderPaymentSubscriber {
    async fn publish(&self, event: OrderPaymentSucceeded) -> anyhow::Result<()> {
        self.handle(&event).await?;
        Ok(())
    }
}
