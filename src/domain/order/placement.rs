use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::domain::bag::Bag;
use crate::domain::money::Money;
use crate::domain::payment::{default_reference, OrderPaymentSucceeded, Payment, PaymentEventSink, PaymentStatus};
use crate::event_sourcing::EventEnvelope;
use crate::metrics::Metrics;
use crate::store::{OrderStore, StoreTransaction};

use super::aggregate::OrderAggregate;
use super::errors::{ErrorCategory, OrderError};
use super::snapshot::OrderSnapshot;
use super::value_objects::{ContactPhone, DeliveryAddress, Fees};

// ============================================================================
// Order Placement - the all-or-nothing creation routine
// ============================================================================
//
// Steps, all inside one store transaction:
// 1. reject an empty bag list
// 2. resolve the caller's bags; any missing or foreign id rejects the lot
// 3. every bag has items, meets the plate rule, and has stock
// 4. address, phone, delivery fee and service charge
// 5. insert the order (status Pending) and its OrderPlaced event
// 6. link the bags and reserve stock
// 7. re-read the order and require it to be complete
//
// Any error returns before commit, and the dropped transaction takes every
// earlier write with it.
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct PlaceOrder {
    pub user_id: Uuid,
    pub bag_ids: Vec<Uuid>,
    pub delivery_address: String,
    pub contact_phone: String,
    /// Falls back to the configured default when `None`.
    pub delivery_fee: Option<Money>,
    pub service_charge: Option<Money>,
}

/// Payment to record together with the order.
#[derive(Debug, Clone)]
pub struct PaymentDetails {
    /// Defaults to the order total.
    pub amount: Option<Money>,
    /// Defaults to `PAY_<order id>_<timestamp>`.
    pub reference: Option<String>,
    pub status: PaymentStatus,
}

pub struct OrderPlacement {
    store: Arc<dyn OrderStore>,
    defaults: Fees,
    metrics: Arc<Metrics>,
    sink: Option<Arc<dyn PaymentEventSink>>,
}

impl OrderPlacement {
    pub fn new(store: Arc<dyn OrderStore>, defaults: Fees, metrics: Arc<Metrics>) -> Self {
        Self { store, defaults, metrics, sink: None }
    }

    /// Where payment-success events from paid placements go.
    pub fn with_payment_sink(mut self, sink: Arc<dyn PaymentEventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Create an order from the caller's bags. Returns the committed order
    /// with its bags.
    pub async fn place_order(&self, request: PlaceOrder) -> Result<OrderSnapshot, OrderError> {
        let started = Instant::now();
        let result = self.place_in_transaction(&request, None).await;
        self.observe(&request, started, &result);
        result.map(|(snapshot, _)| snapshot)
    }

    /// Create an order and its payment in one transaction. A successful
    /// payment is published after commit.
    pub async fn place_paid_order(
        &self,
        request: PlaceOrder,
        payment: PaymentDetails,
    ) -> Result<(OrderSnapshot, Payment), OrderError> {
        let started = Instant::now();
        let result = self.place_in_transaction(&request, Some(&payment)).await;
        self.observe(&request, started, &result);

        let (snapshot, payment) = result?;
        let payment = payment.ok_or(OrderError::NotInitialized)?;

        if payment.is_success() {
            if let Some(sink) = &self.sink {
                let event = OrderPaymentSucceeded {
                    order_id: snapshot.order.id,
                    payment_id: payment.id,
                    reference: payment.reference.clone(),
                    occurred_at: payment.updated_at,
                };
                // The order is already Pending; a lost event changes nothing.
                if let Err(e) = sink.publish(event).await {
                    tracing::warn!(
                        order_id = %snapshot.order.id,
                        payment_id = %payment.id,
                        error = %e,
                        "Failed to publish payment success"
                    );
                }
            }
        }

        Ok((snapshot, payment))
    }

    fn observe<T>(&self, request: &PlaceOrder, started: Instant, result: &Result<T, OrderError>) {
        let elapsed = started.elapsed().as_secs_f64();
        match result {
            Ok(_) => self.metrics.record_placement(elapsed, None),
            Err(e) => {
                self.metrics.record_placement(elapsed, Some(e.code()));
                match e.category() {
                    ErrorCategory::Integrity | ErrorCategory::Storage => tracing::error!(
                        user_id = %request.user_id,
                        code = e.code(),
                        error = %e,
                        "Order creation failed"
                    ),
                    _ => tracing::info!(
                        user_id = %request.user_id,
                        code = e.code(),
                        error = %e,
                        "Order creation rejected"
                    ),
                }
            }
        }
    }

    async fn place_in_transaction(
        &self,
        request: &PlaceOrder,
        payment: Option<&PaymentDetails>,
    ) -> Result<(OrderSnapshot, Option<Payment>), OrderError> {
        // Step 1
        if request.bag_ids.is_empty() {
            return Err(OrderError::EmptyBagList);
        }

        let mut seen = HashSet::new();
        let bag_ids: Vec<Uuid> = request
            .bag_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();

        let mut tx = self.store.begin().await?;

        // Step 2
        let bags = tx.bags_owned_by(request.user_id, &bag_ids).await?;
        if bags.len() != bag_ids.len() {
            tracing::warn!(
                user_id = %request.user_id,
                requested = bag_ids.len(),
                resolved = bags.len(),
                "Bag ownership check failed"
            );
            return Err(OrderError::InvalidBagOwnership);
        }

        // Step 3
        for bag in &bags {
            check_bag(bag)?;
        }
        let demand = check_stock(tx.as_mut(), &bags).await?;

        // Step 4
        let address = DeliveryAddress::parse(&request.delivery_address)?;
        let phone = ContactPhone::parse(&request.contact_phone)?;
        let fees = Fees {
            delivery_fee: request.delivery_fee.unwrap_or(self.defaults.delivery_fee),
            service_charge: request.service_charge.unwrap_or(self.defaults.service_charge),
        };
        fees.validate()?;

        // Step 5
        let order_id = Uuid::new_v4();
        let (order, placed) = OrderAggregate::place(
            order_id,
            request.user_id,
            bag_ids.clone(),
            address,
            phone,
            fees,
            Money::ZERO,
        )?;
        tx.insert_order(&order).await?;
        let envelope = EventEnvelope::new(order_id, order.version, placed, Uuid::new_v4())
            .with_user(Some(request.user_id));
        tx.append_events(std::slice::from_ref(&envelope)).await?;

        // Step 6
        tx.set_order_bags(order_id, &bag_ids).await?;
        reserve_stock(tx.as_mut(), &bags, &demand).await?;

        // Step 7
        let snapshot = tx
            .load_order(order_id)
            .await?
            .ok_or(OrderError::IncompleteAfterCreation { order_id })?;
        let issues = snapshot.issues();
        if !issues.is_empty() {
            tracing::error!(
                order_id = %order_id,
                issues = ?issues,
                "Order incomplete after creation, rolling back"
            );
            return Err(OrderError::IncompleteAfterCreation { order_id });
        }

        let payment = match payment {
            Some(details) => {
                let now = Utc::now();
                let mut record = Payment::new(
                    request.user_id,
                    Some(order_id),
                    details.reference.clone().unwrap_or_else(|| default_reference(order_id, now)),
                    details.amount.unwrap_or_else(|| snapshot.total()),
                    details.status,
                );
                record.created_at = now;
                record.updated_at = now;
                tx.insert_payment(&record).await?;
                Some(record)
            }
            None => None,
        };

        tx.commit().await?;

        tracing::info!(
            order_id = %order_id,
            user_id = %request.user_id,
            bags = bag_ids.len(),
            total = %snapshot.total(),
            paid = payment.as_ref().is_some_and(Payment::is_success),
            "Order placed"
        );

        let snapshot = OrderSnapshot { payment: payment.clone(), ..snapshot };
        Ok((snapshot, payment))
    }
}

fn check_bag(bag: &Bag) -> Result<(), OrderError> {
    if bag.is_empty() {
        return Err(OrderError::EmptyBag { bag_id: bag.id, bag_name: bag.name.clone() });
    }
    if !bag.satisfies_plate_requirement() {
        return Err(OrderError::PlateRequirementUnmet { bag_id: bag.id, bag_name: bag.name.clone() });
    }
    Ok(())
}

/// Lock every stock-tracked food item and check it covers the portions
/// requested across all bags. Returns the total demand per item.
async fn check_stock(
    tx: &mut dyn StoreTransaction,
    bags: &[Bag],
) -> Result<HashMap<Uuid, u32>, OrderError> {
    let mut demand: HashMap<Uuid, u32> = HashMap::new();

    for bag in bags {
        for item in &bag.items {
            let Some((food_item_id, portions)) = item.stock_demand() else {
                continue;
            };
            let total = demand.entry(food_item_id).or_insert(0);
            *total = total.saturating_add(portions);

            let Some(food) = tx.lock_food_item(food_item_id).await? else {
                continue;
            };
            if food.is_plate() {
                continue;
            }
            if food.portions == 0 {
                return Err(OrderError::OutOfStock {
                    bag_name: bag.name.clone(),
                    item: food.name.clone(),
                });
            }
            if !food.can_order_portions(*total) {
                return Err(OrderError::InsufficientStock {
                    bag_name: bag.name.clone(),
                    item: food.name.clone(),
                    available: food.portions,
                    requested: *total,
                });
            }
        }
    }

    Ok(demand)
}

async fn reserve_stock(
    tx: &mut dyn StoreTransaction,
    bags: &[Bag],
    demand: &HashMap<Uuid, u32>,
) -> Result<(), OrderError> {
    for (food_item_id, requested) in demand {
        let Some(food) = tx.lock_food_item(*food_item_id).await? else {
            continue;
        };
        if food.is_plate() {
            continue;
        }
        let Some(remaining) = food.portions.checked_sub(*requested) else {
            let bag_name = bags
                .iter()
                .find(|b| b.items.iter().any(|i| i.food_item_id == Some(*food_item_id)))
                .map(|b| b.name.clone())
                .unwrap_or_default();
            return Err(OrderError::InsufficientStock {
                bag_name,
                item: food.name,
                available: food.portions,
                requested: *requested,
            });
        };
        tx.set_food_item_portions(*food_item_id, remaining).await?;
    }
    Ok(())
}
