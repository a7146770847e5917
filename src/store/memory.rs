use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::dashboard::DashboardFilter;
use crate::domain::bag::{Bag, FoodItem};
use crate::domain::money::Money;
use crate::domain::order::{OrderAggregate, OrderEvent, OrderSnapshot, MAX_DELIVERY_FEE, MAX_SERVICE_CHARGE};
use crate::domain::payment::{Payment, PaymentStatus};
use crate::event_sourcing::EventEnvelope;
use super::{OrderStore, StoreError, StoreResult, StoreTransaction};

// ============================================================================
// In-Memory Store
// ============================================================================
//
// A transaction takes the state lock for its whole lifetime and writes to a
// private copy. Commit swaps the copy in; drop throws it away.
//
// ============================================================================

#[derive(Debug, Clone, Default)]
struct MemoryState {
    food_items: HashMap<Uuid, FoodItem>,
    bags: HashMap<Uuid, Bag>,
    orders: HashMap<Uuid, OrderAggregate>,
    order_bags: HashMap<Uuid, Vec<Uuid>>,
    payments: HashMap<Uuid, Payment>,
    events: Vec<EventEnvelope<OrderEvent>>,
}

impl MemoryState {
    fn payment_for_order(&self, order_id: Uuid) -> Option<&Payment> {
        self.payments.values().find(|p| p.order_id == Some(order_id))
    }

    fn snapshot(&self, order_id: Uuid) -> Option<OrderSnapshot> {
        let mut order = self.orders.get(&order_id)?.clone();
        let bag_ids = self.order_bags.get(&order_id).cloned().unwrap_or_default();
        let bags = bag_ids.iter().filter_map(|id| self.bags.get(id).cloned()).collect();
        order.bag_ids = bag_ids;

        Some(OrderSnapshot {
            order,
            bags,
            payment: self.payment_for_order(order_id).cloned(),
        })
    }

    fn matching_orders(&self, filter: &DashboardFilter) -> Vec<&OrderAggregate> {
        let mut orders: Vec<&OrderAggregate> = self
            .orders
            .values()
            .filter(|order| {
                let payment_status = self.payment_for_order(order.id).map(|p| p.status);
                filter.matches(order.status, order.delivered_at, payment_status)
            })
            .collect();
        orders.sort_by_key(|o| (o.created_at, o.id));
        orders
    }
}

/// Same CHECK constraints the orders table carries.
fn check_order_constraints(order: &OrderAggregate) -> StoreResult<()> {
    if !order.delivery_fee.within(Money::ZERO, MAX_DELIVERY_FEE) {
        return Err(StoreError::Constraint("valid_delivery_fee".to_string()));
    }
    if !order.service_charge.within(Money::ZERO, MAX_SERVICE_CHARGE) {
        return Err(StoreError::Constraint("valid_service_charge".to_string()));
    }
    Ok(())
}

/// Failures a test can switch on to exercise rollback and retry paths.
#[derive(Debug, Default)]
struct Faults {
    lose_bag_links: AtomicBool,
    version_conflicts: AtomicU32,
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<MemoryState>>,
    faults: Arc<Faults>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Seeding
    // ========================================================================

    pub async fn add_food_item(&self, item: FoodItem) {
        self.state.lock().await.food_items.insert(item.id, item);
    }

    pub async fn add_bag(&self, bag: Bag) {
        self.state.lock().await.bags.insert(bag.id, bag);
    }

    /// Store an order row as-is, with no validation and no event history.
    /// Used to stand in for rows written before the current rules existed.
    pub async fn put_order(&self, order: OrderAggregate, bag_ids: Vec<Uuid>) {
        let mut state = self.state.lock().await;
        state.order_bags.insert(order.id, bag_ids);
        state.orders.insert(order.id, order);
    }

    pub async fn put_payment(&self, payment: Payment) {
        self.state.lock().await.payments.insert(payment.id, payment);
    }

    /// Change a stored order outside of any transaction.
    pub async fn edit_order<F>(&self, order_id: Uuid, edit: F) -> bool
    where
        F: FnOnce(&mut OrderAggregate),
    {
        match self.state.lock().await.orders.get_mut(&order_id) {
            Some(order) => {
                edit(order);
                true
            }
            None => false,
        }
    }

    // ========================================================================
    // Fault injection
    // ========================================================================

    /// `set_order_bags` succeeds but links nothing.
    pub fn lose_bag_links(&self, enabled: bool) {
        self.faults.lose_bag_links.store(enabled, Ordering::SeqCst);
    }

    /// The next `count` calls to `update_order` fail with a version conflict.
    pub fn inject_version_conflicts(&self, count: u32) {
        self.faults.version_conflicts.store(count, Ordering::SeqCst);
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    pub async fn order_count(&self) -> usize {
        self.state.lock().await.orders.len()
    }

    pub async fn order(&self, order_id: Uuid) -> Option<OrderSnapshot> {
        self.state.lock().await.snapshot(order_id)
    }

    pub async fn linked_bag_count(&self) -> usize {
        self.state.lock().await.order_bags.values().map(Vec::len).sum()
    }

    pub async fn food_item(&self, id: Uuid) -> Option<FoodItem> {
        self.state.lock().await.food_items.get(&id).cloned()
    }

    pub async fn payment(&self, id: Uuid) -> Option<Payment> {
        self.state.lock().await.payments.get(&id).cloned()
    }

    pub async fn payment_count(&self) -> usize {
        self.state.lock().await.payments.len()
    }

    pub async fn events_for(&self, order_id: Uuid) -> Vec<EventEnvelope<OrderEvent>> {
        let state = self.state.lock().await;
        let mut events: Vec<_> = state
            .events
            .iter()
            .filter(|e| e.aggregate_id == order_id)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.sequence_number);
        events
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTransaction {
            guard,
            working,
            faults: self.faults.clone(),
        }))
    }

    async fn order_ids(&self) -> StoreResult<Vec<Uuid>> {
        let state = self.state.lock().await;
        let mut orders: Vec<&OrderAggregate> = state.orders.values().collect();
        orders.sort_by_key(|o| (o.created_at, o.id));
        Ok(orders.into_iter().map(|o| o.id).collect())
    }

    async fn count_orders(&self, filter: &DashboardFilter) -> StoreResult<u64> {
        let state = self.state.lock().await;
        Ok(state.matching_orders(filter).len() as u64)
    }

    async fn list_orders(&self, filter: &DashboardFilter) -> StoreResult<Vec<OrderAggregate>> {
        let state = self.state.lock().await;
        Ok(state.matching_orders(filter).into_iter().cloned().collect())
    }
}

struct MemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    faults: Arc<Faults>,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn bags_owned_by(&mut self, user_id: Uuid, bag_ids: &[Uuid]) -> StoreResult<Vec<Bag>> {
        Ok(bag_ids
            .iter()
            .filter_map(|id| self.working.bags.get(id))
            .filter(|bag| bag.owner_id == user_id)
            .cloned()
            .collect())
    }

    async fn lock_food_item(&mut self, id: Uuid) -> StoreResult<Option<FoodItem>> {
        Ok(self.working.food_items.get(&id).cloned())
    }

    async fn set_food_item_portions(&mut self, id: Uuid, portions: u32) -> StoreResult<()> {
        let item = self
            .working
            .food_items
            .get_mut(&id)
            .ok_or_else(|| StoreError::Missing(format!("food item {}", id)))?;
        item.portions = portions;
        Ok(())
    }

    async fn insert_order(&mut self, order: &OrderAggregate) -> StoreResult<()> {
        if self.working.orders.contains_key(&order.id) {
            return Err(StoreError::Duplicate(format!("order {}", order.id)));
        }
        check_order_constraints(order)?;
        self.working.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn set_order_bags(&mut self, order_id: Uuid, bag_ids: &[Uuid]) -> StoreResult<()> {
        if !self.working.orders.contains_key(&order_id) {
            return Err(StoreError::Missing(format!("order {}", order_id)));
        }
        if let Some(missing) = bag_ids.iter().find(|id| !self.working.bags.contains_key(id)) {
            return Err(StoreError::Constraint(format!("order_bags_bag_id_fkey ({})", missing)));
        }

        let links = if self.faults.lose_bag_links.load(Ordering::SeqCst) {
            Vec::new()
        } else {
            let mut links = bag_ids.to_vec();
            links.dedup();
            links
        };
        self.working.order_bags.insert(order_id, links);
        Ok(())
    }

    async fn load_order(&mut self, order_id: Uuid) -> StoreResult<Option<OrderSnapshot>> {
        Ok(self.working.snapshot(order_id))
    }

    async fn update_order(&mut self, order: &OrderAggregate, expected_version: i64) -> StoreResult<()> {
        let conflicts = &self.faults.version_conflicts;
        if conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StoreError::VersionConflict(order.id, expected_version));
        }

        check_order_constraints(order)?;
        let stored = self
            .working
            .orders
            .get_mut(&order.id)
            .ok_or_else(|| StoreError::Missing(format!("order {}", order.id)))?;
        if stored.version != expected_version {
            return Err(StoreError::VersionConflict(order.id, expected_version));
        }

        let bag_ids = std::mem::take(&mut stored.bag_ids);
        *stored = order.clone();
        stored.bag_ids = bag_ids;
        Ok(())
    }

    async fn delete_order(&mut self, order_id: Uuid) -> StoreResult<()> {
        if self.working.orders.remove(&order_id).is_none() {
            return Err(StoreError::Missing(format!("order {}", order_id)));
        }
        self.working.order_bags.remove(&order_id);
        for payment in self.working.payments.values_mut() {
            if payment.order_id == Some(order_id) {
                payment.order_id = None;
            }
        }
        Ok(())
    }

    async fn append_events(&mut self, events: &[EventEnvelope<OrderEvent>]) -> StoreResult<()> {
        for envelope in events {
            let taken = self.working.events.iter().any(|e| {
                e.aggregate_id == envelope.aggregate_id && e.sequence_number == envelope.sequence_number
            });
            if taken {
                return Err(StoreError::Duplicate(format!(
                    "event {}#{}",
                    envelope.aggregate_id, envelope.sequence_number
                )));
            }
            self.working.events.push(envelope.clone());
        }
        Ok(())
    }

    async fn load_events(&mut self, order_id: Uuid) -> StoreResult<Vec<EventEnvelope<OrderEvent>>> {
        let mut events: Vec<_> = self
            .working
            .events
            .iter()
            .filter(|e| e.aggregate_id == order_id)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.sequence_number);
        Ok(events)
    }

    async fn insert_payment(&mut self, payment: &Payment) -> StoreResult<()> {
        let clash = self.working.payments.values().any(|p| {
            p.id == payment.id
                || p.reference == payment.reference
                || (payment.order_id.is_some() && p.order_id == payment.order_id)
        });
        if clash {
            return Err(StoreError::Duplicate(format!("payment {}", payment.reference)));
        }
        if let Some(order_id) = payment.order_id {
            if !self.working.orders.contains_key(&order_id) {
                return Err(StoreError::Constraint("payments_order_id_fkey".to_string()));
            }
        }
        self.working.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn load_payment(&mut self, payment_id: Uuid) -> StoreResult<Option<Payment>> {
        Ok(self.working.payments.get(&payment_id).cloned())
    }

    async fn update_payment_status(
        &mut self,
        payment_id: Uuid,
        status: PaymentStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let payment = self
            .working
            .payments
            .get_mut(&payment_id)
            .ok_or_else(|| StoreError::Missing(format!("payment {}", payment_id)))?;
        payment.status = status;
        payment.updated_at = at;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTransaction { mut guard, working, .. } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bag::BagItem;
    use crate::domain::order::{ContactPhone, DeliveryAddress, Fees};

    fn order() -> OrderAggregate {
        OrderAggregate::place(
            Uuid::new_v4(),
            Uuid::new_v4(),
            vec![Uuid::new_v4()],
            DeliveryAddress::parse("15 Broad Street, Lagos").unwrap(),
            ContactPhone::parse("08031234567").unwrap(),
            Fees::default(),
            Money::ZERO,
        )
        .unwrap()
        .0
    }

    #[tokio::test]
    async fn test_dropped_transaction_discards_writes() {
        let store = InMemoryStore::new();

        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_order(&order()).await.unwrap();
        }
        assert_eq!(store.order_count().await, 0);

        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&order()).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.order_count().await, 1);
    }

    #[tokio::test]
    async fn test_fee_constraint_enforced() {
        let store = InMemoryStore::new();
        let mut bad = order();
        bad.delivery_fee = Money::from_major(20_000);

        let mut tx = store.begin().await.unwrap();
        let err = tx.insert_order(&bad).await.unwrap_err();
        assert!(matches!(err, StoreError::Constraint(name) if name == "valid_delivery_fee"));
    }

    #[tokio::test]
    async fn test_update_checks_version() {
        let store = InMemoryStore::new();
        let mut placed = order();

        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&placed).await.unwrap();
        tx.commit().await.unwrap();

        placed.version = 2;
        let mut tx = store.begin().await.unwrap();
        assert!(matches!(
            tx.update_order(&placed, 5).await,
            Err(StoreError::VersionConflict(_, 5))
        ));
        tx.update_order(&placed, 1).await.unwrap();
    }

    #[tokio::test]
    async fn test_injected_conflicts_are_consumed() {
        let store = InMemoryStore::new();
        let placed = order();
        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&placed).await.unwrap();
        tx.commit().await.unwrap();

        store.inject_version_conflicts(1);
        let mut tx = store.begin().await.unwrap();
        assert!(tx.update_order(&placed, 1).await.is_err());
        assert!(tx.update_order(&placed, 1).await.is_ok());
    }

    #[tokio::test]
    async fn test_deleting_order_detaches_payment() {
        let store = InMemoryStore::new();
        let owner = Uuid::new_v4();
        let bag = Bag::new(owner, "Drinks", vec![BagItem::other("Zobo", "drinks", Money::from_major(300), 1)]);
        store.add_bag(bag.clone()).await;

        let placed = order();
        let payment = Payment::new(owner, Some(placed.id), "PAY_1", Money::from_major(900), PaymentStatus::Success);

        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&placed).await.unwrap();
        tx.set_order_bags(placed.id, &[bag.id]).await.unwrap();
        tx.insert_payment(&payment).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.linked_bag_count().await, 1);

        let mut tx = store.begin().await.unwrap();
        tx.delete_order(placed.id).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.linked_bag_count().await, 0);
        assert_eq!(store.payment(payment.id).await.unwrap().order_id, None);
    }
}
