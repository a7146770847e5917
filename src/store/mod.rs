use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::dashboard::DashboardFilter;
use crate::domain::bag::{Bag, FoodItem};
use crate::domain::order::{OrderAggregate, OrderEvent, OrderSnapshot};
use crate::domain::payment::{Payment, PaymentStatus};
use crate::event_sourcing::EventEnvelope;
use crate::utils::IsTransient;

// ============================================================================
// Order Store - Transactional persistence for orders, bags and payments
// ============================================================================
//
// Every write happens inside a `StoreTransaction`. Dropping a transaction
// without calling `commit` discards all of its writes, so an early `?`
// return is a rollback.
//
// Two implementations:
// - `InMemoryStore`: tests and local runs
// - `PgStore`: Postgres via sqlx, schema in ./migrations
//
// ============================================================================

mod memory;
mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Concurrency conflict on order {0}: expected version {1}")]
    VersionConflict(Uuid, i64),

    #[error("Constraint violated: {0}")]
    Constraint(String),

    #[error("Duplicate key: {0}")]
    Duplicate(String),

    #[error("Transaction could not be serialized")]
    Serialization,

    #[error("Row not found: {0}")]
    Missing(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl IsTransient for StoreError {
    fn is_transient(&self) -> bool {
        matches!(self, StoreError::VersionConflict(..) | StoreError::Serialization)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>>;

    /// All order ids, oldest first.
    async fn order_ids(&self) -> StoreResult<Vec<Uuid>>;

    async fn count_orders(&self, filter: &DashboardFilter) -> StoreResult<u64>;

    async fn list_orders(&self, filter: &DashboardFilter) -> StoreResult<Vec<OrderAggregate>>;
}

#[async_trait]
pub trait StoreTransaction: Send {
    /// Bags among `bag_ids` that belong to `user_id`, items included.
    async fn bags_owned_by(&mut self, user_id: Uuid, bag_ids: &[Uuid]) -> StoreResult<Vec<Bag>>;

    /// Read a food item and hold it until the transaction ends.
    async fn lock_food_item(&mut self, id: Uuid) -> StoreResult<Option<FoodItem>>;

    async fn set_food_item_portions(&mut self, id: Uuid, portions: u32) -> StoreResult<()>;

    async fn insert_order(&mut self, order: &OrderAggregate) -> StoreResult<()>;

    /// Replace the order's bag links with exactly `bag_ids`.
    async fn set_order_bags(&mut self, order_id: Uuid, bag_ids: &[Uuid]) -> StoreResult<()>;

    /// Order row with linked bags and payment; the row stays locked.
    async fn load_order(&mut self, order_id: Uuid) -> StoreResult<Option<OrderSnapshot>>;

    /// Write `order` if the stored version still equals `expected_version`.
    async fn update_order(&mut self, order: &OrderAggregate, expected_version: i64) -> StoreResult<()>;

    async fn delete_order(&mut self, order_id: Uuid) -> StoreResult<()>;

    async fn append_events(&mut self, events: &[EventEnvelope<OrderEvent>]) -> StoreResult<()>;

    async fn load_events(&mut self, order_id: Uuid) -> StoreResult<Vec<EventEnvelope<OrderEvent>>>;

    async fn insert_payment(&mut self, payment: &Payment) -> StoreResult<()>;

    async fn load_payment(&mut self, payment_id: Uuid) -> StoreResult<Option<Payment>>;

    async fn update_payment_status(
        &mut self,
        payment_id: Uuid,
        status: PaymentStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}
