// ============================================================================
// Recovery - find, repair, and delete incomplete orders
// ============================================================================
//
// Repairs only ever touch contact details, write placeholders, and record
// the previous values in an OrderRepairApplied event so that
// `revert_last_repair` can put them back. Orders with any other issue are
// deleted only when asked, leaving an OrderPurged event behind.
//
// Each order is handled in its own transaction.
//
// ============================================================================

mod repair;
mod verify;

pub use repair::{last_open_repair, placeholder_address, plan_repairs, RepairPlan};
pub use verify::{verify_all, verify_order, HistoryCheck, OrderVerification};

use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::order::{
    CommandContext, CommandOutcome, ContactPhone, FieldRepair, OrderCommand, OrderCommandHandler, OrderError,
};
use crate::metrics::Metrics;
use crate::store::OrderStore;

#[derive(Debug, Clone, Copy, Default)]
pub struct RecoveryOptions {
    /// Report only; write nothing.
    pub dry_run: bool,
    /// Limit the run to one order.
    pub order_id: Option<Uuid>,
    /// Delete orders whose issues cannot be repaired.
    pub delete_unfixable: bool,
    /// Operator recorded on the events written.
    pub operator_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RecoveryAction {
    WouldRepair,
    Repaired,
    WouldDelete,
    Deleted,
    /// Unfixable and deletion not requested.
    LeftInPlace,
    Failed(String),
}

impl RecoveryAction {
    pub fn label(&self) -> &'static str {
        match self {
            RecoveryAction::WouldRepair => "would_repair",
            RecoveryAction::Repaired => "repaired",
            RecoveryAction::WouldDelete => "would_delete",
            RecoveryAction::Deleted => "deleted",
            RecoveryAction::LeftInPlace => "left_in_place",
            RecoveryAction::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderFinding {
    pub order_id: Uuid,
    pub issues: Vec<String>,
    pub repairs: Vec<FieldRepair>,
    pub action: RecoveryAction,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RecoveryReport {
    pub scanned: usize,
    pub incomplete: usize,
    pub repaired: usize,
    pub deleted: usize,
    pub findings: Vec<OrderFinding>,
}

pub struct RecoveryService {
    store: Arc<dyn OrderStore>,
    placeholder_phone: ContactPhone,
    metrics: Arc<Metrics>,
}

impl RecoveryService {
    pub fn new(store: Arc<dyn OrderStore>, placeholder_phone: ContactPhone, metrics: Arc<Metrics>) -> Self {
        Self { store, placeholder_phone, metrics }
    }

    pub async fn run(&self, options: RecoveryOptions) -> Result<RecoveryReport, OrderError> {
        let order_ids = match options.order_id {
            Some(order_id) => vec![order_id],
            None => self.store.order_ids().await?,
        };

        tracing::info!(
            orders = order_ids.len(),
            dry_run = options.dry_run,
            delete_unfixable = options.delete_unfixable,
            "Scanning orders for completeness issues"
        );

        let mut report = RecoveryReport::default();

        for order_id in order_ids {
            let finding = match self.process(order_id, &options).await {
                Ok(Some(finding)) => finding,
                Ok(None) => {
                    report.scanned += 1;
                    continue;
                }
                Err(OrderError::OrderNotFound(id)) if options.order_id.is_none() => {
                    tracing::debug!(order_id = %id, "Order vanished during scan");
                    continue;
                }
                Err(e @ OrderError::OrderNotFound(_)) => return Err(e),
                Err(e) => {
                    tracing::error!(order_id = %order_id, error = %e, "Recovery failed for order");
                    OrderFinding {
                        order_id,
                        issues: Vec::new(),
                        repairs: Vec::new(),
                        action: RecoveryAction::Failed(e.to_string()),
                    }
                }
            };

            report.scanned += 1;
            report.incomplete += 1;
            match finding.action {
                RecoveryAction::Repaired => report.repaired += 1,
                RecoveryAction::Deleted => report.deleted += 1,
                _ => {}
            }
            if !options.dry_run {
                self.metrics.record_recovery_action(finding.action.label());
            }
            report.findings.push(finding);
        }

        tracing::info!(
            scanned = report.scanned,
            incomplete = report.incomplete,
            repaired = report.repaired,
            deleted = report.deleted,
            dry_run = options.dry_run,
            "Recovery finished"
        );

        Ok(report)
    }

    /// `None` when the order is complete.
    async fn process(&self, order_id: Uuid, options: &RecoveryOptions) -> Result<Option<OrderFinding>, OrderError> {
        let mut tx = self.store.begin().await?;
        let snapshot = tx
            .load_order(order_id)
            .await?
            .ok_or(OrderError::OrderNotFound(order_id))?;

        let issues: Vec<String> = snapshot.issues().iter().map(ToString::to_string).collect();
        let plan = plan_repairs(&snapshot, &self.placeholder_phone);

        let ctx = match options.operator_id {
            Some(operator) => CommandContext::by_actor(operator),
            None => CommandContext::new(),
        };

        let (repairs, action) = match plan {
            RepairPlan::Complete => return Ok(None),

            RepairPlan::Repair(repairs) if options.dry_run => (repairs, RecoveryAction::WouldRepair),
            RepairPlan::Repair(repairs) => {
                let command = OrderCommand::ApplyRepair { repairs: repairs.clone() };
                OrderCommandHandler::apply_in(tx.as_mut(), snapshot.order, &command, &ctx).await?;
                tx.commit().await?;

                for repair in &repairs {
                    tracing::warn!(
                        order_id = %order_id,
                        field = ?repair.field,
                        previous = %repair.previous,
                        replacement = %repair.replacement,
                        "Order field replaced with placeholder"
                    );
                }
                (repairs, RecoveryAction::Repaired)
            }

            RepairPlan::Unfixable(_) if !options.delete_unfixable => (Vec::new(), RecoveryAction::LeftInPlace),
            RepairPlan::Unfixable(_) if options.dry_run => (Vec::new(), RecoveryAction::WouldDelete),
            RepairPlan::Unfixable(_) => {
                let command = OrderCommand::Purge { issues: issues.clone() };
                OrderCommandHandler::apply_in(tx.as_mut(), snapshot.order, &command, &ctx).await?;
                tx.commit().await?;

                tracing::warn!(order_id = %order_id, issues = ?issues, "Deleted unfixable order");
                (Vec::new(), RecoveryAction::Deleted)
            }
        };

        Ok(Some(OrderFinding { order_id, issues, repairs, action }))
    }

    /// Undo the most recent repair that is still in effect.
    pub async fn revert_last_repair(&self, order_id: Uuid, operator_id: Option<Uuid>) -> Result<CommandOutcome, OrderError> {
        let mut tx = self.store.begin().await?;
        let snapshot = tx
            .load_order(order_id)
            .await?
            .ok_or(OrderError::OrderNotFound(order_id))?;

        let events = tx.load_events(order_id).await?;
        let repairs = last_open_repair(&events).ok_or(OrderError::NoRepairToRevert(order_id))?;

        let ctx = match operator_id {
            Some(operator) => CommandContext::by_actor(operator),
            None => CommandContext::new(),
        };
        let outcome = OrderCommandHandler::apply_in(
            tx.as_mut(),
            snapshot.order,
            &OrderCommand::RevertRepair { repairs },
            &ctx,
        )
        .await?;
        tx.commit().await?;

        self.metrics.record_recovery_action("reverted");
        tracing::warn!(order_id = %order_id, "Repair reverted");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bag::{Bag, BagItem};
    use crate::domain::money::Money;
    use crate::domain::order::{DeliveryAddress, Fees, OrderAggregate, OrderPlacement, PlaceOrder};
    use crate::store::InMemoryStore;

    fn service(store: &InMemoryStore) -> RecoveryService {
        RecoveryService::new(
            Arc::new(store.clone()),
            ContactPhone::parse("0000000000").unwrap(),
            Arc::new(Metrics::new().unwrap()),
        )
    }

    /// Legacy row with the given contact details and bags.
    async fn legacy_order(store: &InMemoryStore, address: &str, phone: &str, with_bag: bool) -> Uuid {
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
        order.delivery_address = address.to_string();
        order.contact_phone = phone.to_string();

        let mut links = Vec::new();
        if with_bag {
            let bag = Bag::new(order.user_id, "Drinks", vec![BagItem::other("Zobo", "drinks", Money::from_major(300), 1)]);
            links.push(bag.id);
            store.add_bag(bag).await;
        }
        let id = order.id;
        store.put_order(order, links).await;
        id
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let store = InMemoryStore::new();
        let id = legacy_order(&store, "Ikeja", "123", true).await;
        legacy_order(&store, "Ikeja", "123", false).await;

        let report = service(&store)
            .run(RecoveryOptions { dry_run: true, delete_unfixable: true, ..Default::default() })
            .await
            .unwrap();

        assert_eq!(report.scanned, 2);
        assert_eq!(report.incomplete, 2);
        assert_eq!(report.repaired, 0);
        assert_eq!(store.order_count().await, 2);
        assert_eq!(store.order(id).await.unwrap().order.contact_phone, "123");

        let actions: Vec<_> = report.findings.iter().map(|f| f.action.clone()).collect();
        assert!(actions.contains(&RecoveryAction::WouldRepair));
        assert!(actions.contains(&RecoveryAction::WouldDelete));
    }

    #[tokio::test]
    async fn test_repair_is_recorded_and_reversible() {
        let store = InMemoryStore::new();
        let id = legacy_order(&store, "Ikeja", "123", true).await;
        let recovery = service(&store);

        let report = recovery.run(RecoveryOptions::default()).await.unwrap();
        assert_eq!(report.repaired, 1);

        let repaired = store.order(id).await.unwrap();
        assert!(repaired.is_complete());
        assert_eq!(repaired.order.delivery_address, format!("Default Address for Order #{}", id));
        assert_eq!(repaired.order.contact_phone, "0000000000");
        assert_eq!(store.events_for(id).await[0].event_type, "OrderRepairApplied");

        recovery.revert_last_repair(id, None).await.unwrap();
        let reverted = store.order(id).await.unwrap();
        assert_eq!(reverted.order.delivery_address, "Ikeja");
        assert_eq!(reverted.order.contact_phone, "123");

        let err = recovery.revert_last_repair(id, None).await.unwrap_err();
        assert_eq!(err.code(), "no-repair-to-revert");
    }

    #[tokio::test]
    async fn test_unfixable_orders_deleted_only_on_request() {
        let store = InMemoryStore::new();
        let id = legacy_order(&store, "15 Broad Street, Lagos", "08031234567", false).await;
        let recovery = service(&store);

        let report = recovery.run(RecoveryOptions::default()).await.unwrap();
        assert_eq!(report.findings[0].action, RecoveryAction::LeftInPlace);
        assert_eq!(store.order_count().await, 1);

        let report = recovery
            .run(RecoveryOptions { delete_unfixable: true, order_id: Some(id), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(report.deleted, 1);
        assert_eq!(store.order_count().await, 0);
        assert_eq!(store.events_for(id).await.last().unwrap().event_type, "OrderPurged");
    }

    #[tokio::test]
    async fn test_single_order_must_exist() {
        let store = InMemoryStore::new();
        let err = service(&store)
            .run(RecoveryOptions { order_id: Some(Uuid::new_v4()), ..Default::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::OrderNotFound(_)));
    }

    #[tokio::test]
    async fn test_repaired_legacy_order_verifies_without_divergence() {
        let store = InMemoryStore::new();
        let id = legacy_order(&store, "15 Broad Street, Lagos", "123", true).await;

        let before = verify_order(&store, id).await.unwrap();
        assert_eq!(before.history, HistoryCheck::Missing);

        service(&store).run(RecoveryOptions::default()).await.unwrap();
        assert_eq!(store.events_for(id).await[0].event_type, "OrderRepairApplied");

        let after = verify_order(&store, id).await.unwrap();
        assert_eq!(after.history, HistoryCheck::Missing);
        assert!(after.issues.is_empty());
    }

    #[tokio::test]
    async fn test_placed_order_history_is_consistent() {
        let store = InMemoryStore::new();
        let user_id = Uuid::new_v4();
        let bag = Bag::new(user_id, "Drinks", vec![BagItem::other("Zobo", "drinks", Money::from_major(300), 1)]);
        store.add_bag(bag.clone()).await;

        let placement = OrderPlacement::new(
            Arc::new(store.clone()),
            Fees::default(),
            Arc::new(Metrics::new().unwrap()),
        );
        let snapshot = placement
            .place_order(PlaceOrder {
                user_id,
                bag_ids: vec![bag.id],
                delivery_address: "15 Broad Street, Lagos".to_string(),
                contact_phone: "08031234567".to_string(),
                delivery_fee: None,
                service_charge: None,
            })
            .await
            .unwrap();

        let verification = verify_order(&store, snapshot.order.id).await.unwrap();
        assert_eq!(verification.history, HistoryCheck::Consistent);

        store
            .edit_order(snapshot.order.id, |order| order.contact_phone = "09000000000".to_string())
            .await;
        let verification = verify_order(&store, snapshot.order.id).await.unwrap();
        assert!(matches!(verification.history, HistoryCheck::Diverged(_)));
    }

    #[tokio::test]
    async fn test_verify_flags_missing_history_and_payment() {
        let store = InMemoryStore::new();
        let id = legacy_order(&store, "15 Broad Street, Lagos", "08031234567", true).await;

        let verification = verify_order(&store, id).await.unwrap();
        assert_eq!(verification.bags_count, 1);
        assert_eq!(verification.total_items, 1);
        assert_eq!(verification.history, HistoryCheck::Missing);
        assert!(verification.payment_amount.is_none());
        assert!(!verification.is_healthy());
        assert_eq!(verify_all(&store).await.unwrap().len(), 1);
    }
}
