use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use async_trait::async_trait;

// ============================================================================
// Payment Events
// ============================================================================

/// Raised when a payment linked to an order reaches `success`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPaymentSucceeded {
    pub order_id: Uuid,
    pub payment_id: Uuid,
    pub reference: String,
    pub occurred_at: DateTime<Utc>,
}

/// Destination for payment-success events. Implemented by the subscriber
/// itself (inline delivery) and by the payment events actor (queued).
#[async_trait]
pub trait PaymentEventSink: Send + Sync {
    async fn publish(&self, event: OrderPaymentSucceeded) -> anyhow::Result<()>;
}
