use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgConnection, PgPool, Postgres, Row, Transaction};
use std::collections::HashMap;
use uuid::Uuid;

use crate::dashboard::DashboardFilter;
use crate::domain::bag::{Bag, BagItem, FoodItem};
use crate::domain::money::Money;
use crate::domain::order::{OrderAggregate, OrderEvent, OrderSnapshot, OrderStatus};
use crate::domain::payment::{Payment, PaymentStatus};
use crate::event_sourcing::{deserialize_event, serialize_event, EventEnvelope};
use super::{OrderStore, StoreError, StoreResult, StoreTransaction};

// ============================================================================
// Postgres Store
// ============================================================================
//
// Order rows are locked with SELECT ... FOR UPDATE for the life of the
// transaction; food items are locked the same way before stock is
// decremented. Order updates also compare the version column.
//
// ============================================================================

const ORDER_COLUMNS: &str = r#"
    o.id, o.user_id, o.delivery_address, o.contact_phone,
    o.delivery_fee_minor, o.service_charge_minor, o.vat_minor,
    o.status, o.version, o.created_at, o.updated_at, o.delivered_at, o.cancelled_reason,
    array(select ob.bag_id from order_bags ob where ob.order_id = o.id order by ob.bag_id) as bag_ids
"#;

const FILTER_CLAUSE: &str = r#"
    left join payments p on p.order_id = o.id
    where o.status = any($1)
      and ($2::text is null or p.status = $2)
      and ($3::date is null or (o.delivered_at at time zone 'UTC')::date = $3)
"#;

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            let constraint = db_err.constraint().unwrap_or("unknown").to_string();
            match db_err.code().as_deref() {
                // serialization_failure, deadlock_detected
                Some("40001") | Some("40P01") => return StoreError::Serialization,
                // check_violation, foreign_key_violation, not_null_violation
                Some("23514") | Some("23503") | Some("23502") => return StoreError::Constraint(constraint),
                Some("23505") => return StoreError::Duplicate(constraint),
                _ => {}
            }
        }
        StoreError::Database(err)
    }
}

fn to_i32(value: u32, what: &str) -> StoreResult<i32> {
    i32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{} out of range: {}", what, value)))
}

fn to_u32(value: i32, what: &str) -> StoreResult<u32> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative {}: {}", what, value)))
}

fn order_from_row(row: &PgRow) -> StoreResult<OrderAggregate> {
    let status: String = row.try_get("status")?;
    let status: OrderStatus = status
        .parse()
        .map_err(|_| StoreError::Corrupt(format!("order status '{}'", status)))?;

    Ok(OrderAggregate {
        id: row.try_get("id")?,
        version: row.try_get("version")?,
        user_id: row.try_get("user_id")?,
        bag_ids: row.try_get("bag_ids")?,
        delivery_address: row.try_get("delivery_address")?,
        contact_phone: row.try_get("contact_phone")?,
        delivery_fee: Money::from_minor(row.try_get("delivery_fee_minor")?),
        service_charge: Money::from_minor(row.try_get("service_charge_minor")?),
        vat_amount: Money::from_minor(row.try_get("vat_minor")?),
        status,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        delivered_at: row.try_get("delivered_at")?,
        cancelled_reason: row.try_get("cancelled_reason")?,
    })
}

fn payment_from_row(row: &PgRow) -> StoreResult<Payment> {
    let status: String = row.try_get("status")?;
    let status: PaymentStatus = status
        .parse()
        .map_err(|_| StoreError::Corrupt(format!("payment status '{}'", status)))?;

    Ok(Payment {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        order_id: row.try_get("order_id")?,
        reference: row.try_get("reference")?,
        amount: Money::from_minor(row.try_get("amount_minor")?),
        status,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn event_from_row(row: &PgRow) -> StoreResult<EventEnvelope<OrderEvent>> {
    let event_data: String = row.try_get("event_data")?;
    let metadata: String = row.try_get("metadata")?;

    Ok(EventEnvelope {
        event_id: row.try_get("event_id")?,
        aggregate_id: row.try_get("aggregate_id")?,
        sequence_number: row.try_get("sequence_number")?,
        event_type: row.try_get("event_type")?,
        event_version: row.try_get("event_version")?,
        event_data: deserialize_event(&event_data).map_err(|e| StoreError::Corrupt(e.to_string()))?,
        causation_id: row.try_get("causation_id")?,
        correlation_id: row.try_get("correlation_id")?,
        user_id: row.try_get("user_id")?,
        timestamp: row.try_get("created_at")?,
        metadata: serde_json::from_str(&metadata).map_err(|e| StoreError::Corrupt(e.to_string()))?,
    })
}

/// Bags (with items) among `bag_ids`, optionally restricted to one owner.
async fn fetch_bags(conn: &mut PgConnection, bag_ids: &[Uuid], owner: Option<Uuid>) -> StoreResult<Vec<Bag>> {
    let bag_rows = sqlx::query(
        r#"
        select id, owner_id, name, created_at
        from bags
        where id = any($1)
          and ($2::uuid is null or owner_id = $2)
        order by created_at, id
        "#,
    )
    .bind(bag_ids)
    .bind(owner)
    .fetch_all(&mut *conn)
    .await?;

    let mut bags = Vec::with_capacity(bag_rows.len());
    for row in &bag_rows {
        bags.push(Bag {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            name: row.try_get("name")?,
            items: Vec::new(),
            created_at: row.try_get("created_at")?,
        });
    }

    let found: Vec<Uuid> = bags.iter().map(|b| b.id).collect();
    let item_rows = sqlx::query(
        r#"
        select id, bag_id, food_item_id, name, category, unit_price_minor,
               portions, plates, plate_fee_minor
        from bag_items
        where bag_id = any($1)
        order by bag_id, position, id
        "#,
    )
    .bind(&found)
    .fetch_all(&mut *conn)
    .await?;

    let mut items_by_bag: HashMap<Uuid, Vec<BagItem>> = HashMap::new();
    for row in &item_rows {
        let bag_id: Uuid = row.try_get("bag_id")?;
        items_by_bag.entry(bag_id).or_default().push(BagItem {
            id: row.try_get("id")?,
            food_item_id: row.try_get("food_item_id")?,
            name: row.try_get("name")?,
            category: row.try_get("category")?,
            unit_price: Money::from_minor(row.try_get("unit_price_minor")?),
            portions: to_u32(row.try_get("portions")?, "portions")?,
            plates: to_u32(row.try_get("plates")?, "plates")?,
            plate_fee: Money::from_minor(row.try_get("plate_fee_minor")?),
        });
    }

    for bag in &mut bags {
        bag.items = items_by_bag.remove(&bag.id).unwrap_or_default();
    }
    Ok(bags)
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("failed to connect to Postgres")?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run embedded migrations.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("db migrate failed")?;
        Ok(())
    }

    fn filter_binds(filter: &DashboardFilter) -> (Vec<String>, Option<String>, Option<chrono::NaiveDate>) {
        (
            filter.statuses().iter().map(|s| s.as_str().to_string()).collect(),
            filter.payment_status().map(|s| s.as_str().to_string()),
            filter.delivered_on(),
        )
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTransaction { tx }))
    }

    async fn order_ids(&self) -> StoreResult<Vec<Uuid>> {
        let rows = sqlx::query("select id from orders order by created_at, id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| row.try_get::<Uuid, _>("id").map_err(StoreError::from))
            .collect()
    }

    async fn count_orders(&self, filter: &DashboardFilter) -> StoreResult<u64> {
        let (statuses, payment_status, day) = Self::filter_binds(filter);
        let sql = format!("select count(*)::bigint as n from orders o {}", FILTER_CLAUSE);

        let row = sqlx::query(&sql)
            .bind(&statuses)
            .bind(payment_status)
            .bind(day)
            .fetch_one(&self.pool)
            .await?;
        let n: i64 = row.try_get("n")?;
        Ok(n.max(0) as u64)
    }

    async fn list_orders(&self, filter: &DashboardFilter) -> StoreResult<Vec<OrderAggregate>> {
        let (statuses, payment_status, day) = Self::filter_binds(filter);
        let sql = format!(
            "select {} from orders o {} order by o.created_at, o.id",
            ORDER_COLUMNS, FILTER_CLAUSE
        );

        let rows = sqlx::query(&sql)
            .bind(&statuses)
            .bind(payment_status)
            .bind(day)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(order_from_row).collect()
    }
}

struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    async fn bags_owned_by(&mut self, user_id: Uuid, bag_ids: &[Uuid]) -> StoreResult<Vec<Bag>> {
        fetch_bags(&mut *self.tx, bag_ids, Some(user_id)).await
    }

    async fn lock_food_item(&mut self, id: Uuid) -> StoreResult<Option<FoodItem>> {
        let row = sqlx::query(
            "select id, name, category, price_minor, portions from food_items where id = $1 for update",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        match row {
            Some(row) => Ok(Some(FoodItem {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                category: row.try_get("category")?,
                price: Money::from_minor(row.try_get("price_minor")?),
                portions: to_u32(row.try_get("portions")?, "portions")?,
            })),
            None => Ok(None),
        }
    }

    async fn set_food_item_portions(&mut self, id: Uuid, portions: u32) -> StoreResult<()> {
        let result = sqlx::query("update food_items set portions = $2 where id = $1")
            .bind(id)
            .bind(to_i32(portions, "portions")?)
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Missing(format!("food item {}", id)));
        }
        Ok(())
    }

    async fn insert_order(&mut self, order: &OrderAggregate) -> StoreResult<()> {
        sqlx::query(
            r#"
            insert into orders (
              id, user_id, delivery_address, contact_phone,
              delivery_fee_minor, service_charge_minor, vat_minor,
              status, version, created_at, updated_at, delivered_at, cancelled_reason
            ) values (
              $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13
            )
            "#,
        )
        .bind(order.id)
        .bind(order.user_id)
        .bind(&order.delivery_address)
        .bind(&order.contact_phone)
        .bind(order.delivery_fee.minor())
        .bind(order.service_charge.minor())
        .bind(order.vat_amount.minor())
        .bind(order.status.as_str())
        .bind(order.version)
        .bind(order.created_at)
        .bind(order.updated_at)
        .bind(order.delivered_at)
        .bind(&order.cancelled_reason)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn set_order_bags(&mut self, order_id: Uuid, bag_ids: &[Uuid]) -> StoreResult<()> {
        sqlx::query("delete from order_bags where order_id = $1")
            .bind(order_id)
            .execute(&mut *self.tx)
            .await?;

        sqlx::query(
            r#"
            insert into order_bags (order_id, bag_id)
            select $1, b from unnest($2::uuid[]) as b
            on conflict do nothing
            "#,
        )
        .bind(order_id)
        .bind(bag_ids)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn load_order(&mut self, order_id: Uuid) -> StoreResult<Option<OrderSnapshot>> {
        let sql = format!("select {} from orders o where o.id = $1 for update of o", ORDER_COLUMNS);
        let Some(row) = sqlx::query(&sql)
            .bind(order_id)
            .fetch_optional(&mut *self.tx)
            .await?
        else {
            return Ok(None);
        };
        let order = order_from_row(&row)?;

        let bags = fetch_bags(&mut *self.tx, &order.bag_ids, None).await?;

        let payment = sqlx::query(
            r#"
            select id, user_id, order_id, reference, amount_minor, status, created_at, updated_at
            from payments
            where order_id = $1
            "#,
        )
        .bind(order_id)
        .fetch_optional(&mut *self.tx)
        .await?
        .as_ref()
        .map(payment_from_row)
        .transpose()?;

        Ok(Some(OrderSnapshot { order, bags, payment }))
    }

    async fn update_order(&mut self, order: &OrderAggregate, expected_version: i64) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            update orders
            set delivery_address = $3,
                contact_phone = $4,
                delivery_fee_minor = $5,
                service_charge_minor = $6,
                vat_minor = $7,
                status = $8,
                version = $9,
                updated_at = $10,
                delivered_at = $11,
                cancelled_reason = $12
            where id = $1 and version = $2
            "#,
        )
        .bind(order.id)
        .bind(expected_version)
        .bind(&order.delivery_address)
        .bind(&order.contact_phone)
        .bind(order.delivery_fee.minor())
        .bind(order.service_charge.minor())
        .bind(order.vat_amount.minor())
        .bind(order.status.as_str())
        .bind(order.version)
        .bind(order.updated_at)
        .bind(order.delivered_at)
        .bind(&order.cancelled_reason)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::VersionConflict(order.id, expected_version));
        }
        Ok(())
    }

    async fn delete_order(&mut self, order_id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("delete from orders where id = $1")
            .bind(order_id)
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Missing(format!("order {}", order_id)));
        }
        Ok(())
    }

    async fn append_events(&mut self, events: &[EventEnvelope<OrderEvent>]) -> StoreResult<()> {
        for envelope in events {
            let event_data = serialize_event(&envelope.event_data)
                .map_err(|e| StoreError::Corrupt(e.to_string()))?;
            let metadata = serde_json::to_string(&envelope.metadata)
                .map_err(|e| StoreError::Corrupt(e.to_string()))?;

            sqlx::query(
                r#"
                insert into order_events (
                  aggregate_id, sequence_number, event_id, event_type, event_version,
                  event_data, causation_id, correlation_id, user_id, metadata, created_at
                ) values (
                  $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11
                )
                "#,
            )
            .bind(envelope.aggregate_id)
            .bind(envelope.sequence_number)
            .bind(envelope.event_id)
            .bind(&envelope.event_type)
            .bind(envelope.event_version)
            .bind(event_data)
            .bind(envelope.causation_id)
            .bind(envelope.correlation_id)
            .bind(envelope.user_id)
            .bind(metadata)
            .bind(envelope.timestamp)
            .execute(&mut *self.tx)
            .await?;
        }
        Ok(())
    }

    async fn load_events(&mut self, order_id: Uuid) -> StoreResult<Vec<EventEnvelope<OrderEvent>>> {
        let rows = sqlx::query(
            r#"
            select aggregate_id, sequence_number, event_id, event_type, event_version,
                   event_data, causation_id, correlation_id, user_id, metadata, created_at
            from order_events
            where aggregate_id = $1
            order by sequence_number asc
            "#,
        )
        .bind(order_id)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.iter().map(event_from_row).collect()
    }

    async fn insert_payment(&mut self, payment: &Payment) -> StoreResult<()> {
        sqlx::query(
            r#"
            insert into payments (
              id, user_id, order_id, reference, amount_minor, status, created_at, updated_at
            ) values (
              $1, $2, $3, $4, $5, $6, $7, $8
            )
            "#,
        )
        .bind(payment.id)
        .bind(payment.user_id)
        .bind(payment.order_id)
        .bind(&payment.reference)
        .bind(payment.amount.minor())
        .bind(payment.status.as_str())
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn load_payment(&mut self, payment_id: Uuid) -> StoreResult<Option<Payment>> {
        sqlx::query(
            r#"
            select id, user_id, order_id, reference, amount_minor, status, created_at, updated_at
            from payments
            where id = $1
            for update
            "#,
        )
        .bind(payment_id)
        .fetch_optional(&mut *self.tx)
        .await?
        .as_ref()
        .map(payment_from_row)
        .transpose()
    }

    async fn update_payment_status(
        &mut self,
        payment_id: Uuid,
        status: PaymentStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let result = sqlx::query("update payments set status = $2, updated_at = $3 where id = $1")
            .bind(payment_id)
            .bind(status.as_str())
            .bind(at)
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Missing(format!("payment {}", payment_id)));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
