// ============================================================================
// Dashboard - counts and lists for the operator views
// ============================================================================

mod filters;

pub use filters::DashboardFilter;

use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;

use crate::domain::order::OrderAggregate;
use crate::store::{OrderStore, StoreResult};

/// Header figures shown on every dashboard page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DashboardCounts {
    pub active: u64,
    pub pending: u64,
    pub on_the_way: u64,
    pub delivered_today: u64,
}

pub struct Dashboard {
    store: Arc<dyn OrderStore>,
}

impl Dashboard {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }

    pub async fn counts(&self, today: NaiveDate) -> StoreResult<DashboardCounts> {
        Ok(DashboardCounts {
            active: self.store.count_orders(&DashboardFilter::Active).await?,
            pending: self.store.count_orders(&DashboardFilter::PendingPaid).await?,
            on_the_way: self.store.count_orders(&DashboardFilter::OnTheWayPaid).await?,
            delivered_today: self.store.count_orders(&DashboardFilter::DeliveredOn(today)).await?,
        })
    }

    pub async fn orders(&self, filter: DashboardFilter) -> StoreResult<Vec<OrderAggregate>> {
        self.store.list_orders(&filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    use crate::domain::money::Money;
    use crate::domain::order::{ContactPhone, DeliveryAddress, Fees, OrderStatus};
    use crate::domain::payment::{Payment, PaymentStatus};
    use crate::store::InMemoryStore;

    async fn add(store: &InMemoryStore, status: OrderStatus, payment: Option<PaymentStatus>) {
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
        if status == OrderStatus::Delivered {
            order.delivered_at = Some(Utc::now());
        }
        if let Some(payment_status) = payment {
            let reference = format!("PAY_{}", order.id);
            store
                .put_payment(Payment::new(order.user_id, Some(order.id), reference, Money::from_major(700), payment_status))
                .await;
        }
        store.put_order(order, vec![]).await;
    }

    #[tokio::test]
    async fn test_counts_use_shared_filters() {
        let store = InMemoryStore::new();
        add(&store, OrderStatus::Pending, Some(PaymentStatus::Success)).await;
        add(&store, OrderStatus::Pending, Some(PaymentStatus::Pending)).await;
        add(&store, OrderStatus::Pending, None).await;
        add(&store, OrderStatus::OnTheWay, Some(PaymentStatus::Success)).await;
        add(&store, OrderStatus::Delivered, Some(PaymentStatus::Success)).await;
        add(&store, OrderStatus::Cancelled, Some(PaymentStatus::Success)).await;

        let dashboard = Dashboard::new(Arc::new(store));
        let counts = dashboard.counts(Utc::now().date_naive()).await.unwrap();

        assert_eq!(
            counts,
            DashboardCounts { active: 2, pending: 1, on_the_way: 1, delivered_today: 1 }
        );
        assert_eq!(dashboard.orders(DashboardFilter::Active).await.unwrap().len(), 2);
    }
}
