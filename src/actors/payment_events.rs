use actix::prelude::*;
use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::order::OrderError;
use crate::domain::payment::{OrderPaymentSubscriber, OrderPaymentSucceeded, PaymentEventOutcome, PaymentEventSink};

// ============================================================================
// Payment Events Actor - queued delivery of payment-success events
// ============================================================================
//
// Gateway callbacks hand events to the mailbox and return. The actor feeds
// them to the subscriber one at a time, so two events for the same order
// never race each other inside this process.
//
// ============================================================================

// ============================================================================
// Messages
// ============================================================================

#[derive(Message)]
#[rtype(result = "Result<PaymentEventOutcome, OrderError>")]
pub struct DeliverPaymentEvent(pub OrderPaymentSucceeded);

#[derive(Message)]
#[rtype(result = "PaymentEventStats")]
pub struct GetPaymentEventStats;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaymentEventStats {
    pub delivered: u64,
    pub failed: u64,
}

// ============================================================================
// Payment Events Actor
// ============================================================================

pub struct PaymentEventsActor {
    subscriber: Arc<OrderPaymentSubscriber>,
    stats: PaymentEventStats,
}

impl PaymentEventsActor {
    pub fn new(subscriber: Arc<OrderPaymentSubscriber>) -> Self {
        Self {
            subscriber,
            stats: PaymentEventStats::default(),
        }
    }
}

impl Actor for PaymentEventsActor {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        tracing::info!(policy = ?self.subscriber.policy(), "PaymentEventsActor started");
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::info!(
            delivered = self.stats.delivered,
            failed = self.stats.failed,
            "PaymentEventsActor stopped"
        );
    }
}

impl Handler<DeliverPaymentEvent> for PaymentEventsActor {
    type Result = AtomicResponse<Self, Result<PaymentEventOutcome, OrderError>>;

    fn handle(&mut self, msg: DeliverPaymentEvent, _: &mut Self::Context) -> Self::Result {
        let subscriber = self.subscriber.clone();
        let event = msg.0;

        // Atomic: the next event waits until this one is finished.
        AtomicResponse::new(Box::pin(
            async move { subscriber.handle(&event).await }
                .into_actor(self)
                .map(|result, act, _ctx| {
                    match &result {
                        Ok(_) => act.stats.delivered += 1,
                        Err(_) => act.stats.failed += 1,
                    }
                    result
                }),
        ))
    }
}

impl Handler<GetPaymentEventStats> for PaymentEventsActor {
    type Result = MessageResult<GetPaymentEventStats>;

    fn handle(&mut self, _msg: GetPaymentEventStats, _: &mut Self::Context) -> Self::Result {
        MessageResult(self.stats)
    }
}

/// Queue instead of handling inline. `publish` returns once the event is in
/// the mailbox.
#[async_trait]
impl PaymentEventSink for Addr<PaymentEventsActor> {
    async fn publish(&self, event: OrderPaymentSucceeded) -> anyhow::Result<()> {
        let order_id = event.order_id;
        self.try_send(DeliverPaymentEvent(event))
            .map_err(|e| anyhow::anyhow!("payment event for order {} not queued: {}", order_id, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::Money;
    use crate::domain::order::{
        ContactPhone, DeliveryAddress, Fees, OrderAggregate, OrderStatus, PaymentReaction, TerminalPaymentPolicy,
    };
    use crate::domain::payment::{Payment, PaymentStatus};
    use crate::metrics::Metrics;
    use crate::store::InMemoryStore;
    use crate::utils::RetryConfig;
    use chrono::Utc;
    use uuid::Uuid;

    async fn paid_order(store: &InMemoryStore, status: OrderStatus) -> OrderPaymentSucceeded {
        let (mut order, _) = OrderAggregate::place(
            Uuid::new_v4(),
            Uuid::new_v4(),
            vec![Uuid::new_v4()],
            DeliveryAddress::parse("15 Broad Street, Lagos").unwrap(),
            ContactPhone::parse("08031234567").unwrap(),
            Fees::default(),
            Money::ZERO,
        )
        .unwrap();
        order.status = status;
        let payment = Payment::new(order.user_id, Some(order.id), "PAY_A", Money::from_major(700), PaymentStatus::Success);
        let event = OrderPaymentSucceeded {
            order_id: order.id,
            payment_id: payment.id,
            reference: payment.reference.clone(),
            occurred_at: Utc::now(),
        };
        store.put_order(order, vec![]).await;
        store.put_payment(payment).await;
        event
    }

    fn actor(store: &InMemoryStore) -> Addr<PaymentEventsActor> {
        let subscriber = OrderPaymentSubscriber::new(
            Arc::new(store.clone()),
            TerminalPaymentPolicy::Ignore,
            RetryConfig::default(),
            Arc::new(Metrics::new().unwrap()),
        );
        PaymentEventsActor::new(Arc::new(subscriber)).start()
    }

    #[actix::test]
    async fn test_delivered_event_moves_order_back_to_pending() {
        let store = InMemoryStore::new();
        let event = paid_order(&store, OrderStatus::OnTheWay).await;
        let addr = actor(&store);

        let outcome = addr.send(DeliverPaymentEvent(event.clone())).await.unwrap().unwrap();
        assert_eq!(
            outcome,
            PaymentEventOutcome::Reacted(PaymentReaction::ResetToPending { from: OrderStatus::OnTheWay })
        );
        assert_eq!(store.order(event.order_id).await.unwrap().order.status, OrderStatus::Pending);

        let stats = addr.send(GetPaymentEventStats).await.unwrap();
        assert_eq!(stats, PaymentEventStats { delivered: 1, failed: 0 });
    }

    #[actix::test]
    async fn test_sink_queues_without_waiting() {
        let store = InMemoryStore::new();
        let event = paid_order(&store, OrderStatus::Pending).await;
        let addr = actor(&store);

        addr.publish(event.clone()).await.unwrap();

        // Mailbox is FIFO, so the stats request is answered after delivery.
        let stats = addr.send(GetPaymentEventStats).await.unwrap();
        assert_eq!(stats.delivered, 1);
    }

    #[actix::test]
    async fn test_unknown_order_counts_as_failure() {
        let store = InMemoryStore::new();
        let addr = actor(&store);
        let event = OrderPaymentSucceeded {
            order_id: Uuid::new_v4(),
            payment_id: Uuid::new_v4(),
            reference: "PAY_X".into(),
            occurred_at: Utc::now(),
        };

        let result = addr.send(DeliverPaymentEvent(event)).await.unwrap();
        assert!(result.is_err());
        assert_eq!(addr.send(GetPaymentEventStats).await.unwrap().failed, 1);
    }
}
