use uuid::Uuid;

use crate::domain::order::{
    ContactPhone, FieldRepair, OrderEvent, OrderIssue, OrderSnapshot, RepairField,
};
use crate::event_sourcing::EventEnvelope;

// ============================================================================
// Repair Planning
// ============================================================================

/// What recovery can do with one order, decided from its issues alone.
#[derive(Debug, Clone, PartialEq)]
pub enum RepairPlan {
    Complete,
    /// Every issue is a contact detail; these placeholders fix it.
    Repair(Vec<FieldRepair>),
    Unfixable(Vec<OrderIssue>),
}

pub fn placeholder_address(order_id: Uuid) -> String {
    format!("Default Address for Order #{}", order_id)
}

pub fn plan_repairs(snapshot: &OrderSnapshot, placeholder_phone: &ContactPhone) -> RepairPlan {
    let issues = snapshot.issues();
    if issues.is_empty() {
        return RepairPlan::Complete;
    }
    if !issues.iter().all(OrderIssue::is_fixable) {
        return RepairPlan::Unfixable(issues);
    }

    let order = &snapshot.order;
    let repairs = issues
        .iter()
        .filter_map(|issue| match issue {
            OrderIssue::AddressInvalid => Some(FieldRepair {
                field: RepairField::DeliveryAddress,
                previous: order.delivery_address.clone(),
                replacement: placeholder_address(order.id),
            }),
            OrderIssue::PhoneInvalid => Some(FieldRepair {
                field: RepairField::ContactPhone,
                previous: order.contact_phone.clone(),
                replacement: placeholder_phone.as_str().to_string(),
            }),
            _ => None,
        })
        .collect();

    RepairPlan::Repair(repairs)
}

/// The most recent repair that has not been reverted since.
pub fn last_open_repair(events: &[EventEnvelope<OrderEvent>]) -> Option<Vec<FieldRepair>> {
    let mut open = None;
    for envelope in events {
        match &envelope.event_data {
            OrderEvent::RepairApplied(e) => open = Some(e.repairs.clone()),
            OrderEvent::RepairReverted(_) => open = None,
            _ => {}
        }
    }
    open
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::domain::bag::{Bag, BagItem};
    use crate::domain::money::Money;
    use crate::domain::order::{DeliveryAddress, Fees, OrderAggregate, OrderRepairApplied, OrderRepairReverted};

    fn snapshot_with(address: &str, phone: &str, bags: Vec<Bag>) -> OrderSnapshot {
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
        OrderSnapshot { order, bags, payment: None }
    }

    fn drinks() -> Bag {
        Bag::new(Uuid::new_v4(), "Drinks", vec![BagItem::other("Zobo", "drinks", Money::from_major(300), 1)])
    }

    #[test]
    fn test_contact_issues_get_placeholders() {
        let phone = ContactPhone::parse("0000000000").unwrap();
        let snap = snapshot_with("Ikeja", "", vec![drinks()]);

        let RepairPlan::Repair(repairs) = plan_repairs(&snap, &phone) else {
            panic!("expected a repair plan");
        };
        assert_eq!(repairs.len(), 2);
        assert_eq!(repairs[0].previous, "Ikeja");
        assert_eq!(repairs[0].replacement, format!("Default Address for Order #{}", snap.order.id));
        assert_eq!(repairs[1].replacement, "0000000000");
    }

    #[test]
    fn test_missing_bags_are_unfixable() {
        let phone = ContactPhone::parse("0000000000").unwrap();
        let snap = snapshot_with("Ikeja", "123", vec![]);
        assert!(matches!(plan_repairs(&snap, &phone), RepairPlan::Unfixable(issues) if issues.contains(&OrderIssue::NoBags)));
    }

    #[test]
    fn test_complete_order_needs_nothing() {
        let phone = ContactPhone::parse("0000000000").unwrap();
        let snap = snapshot_with("15 Broad Street, Lagos", "08031234567", vec![drinks()]);
        assert_eq!(plan_repairs(&snap, &phone), RepairPlan::Complete);
    }

    #[test]
    fn test_reverted_repair_is_closed() {
        let id = Uuid::new_v4();
        let corr = Uuid::new_v4();
        let repair = FieldRepair {
            field: RepairField::ContactPhone,
            previous: "1".into(),
            replacement: "0000000000".into(),
        };
        let applied = EventEnvelope::new(
            id,
            2,
            OrderEvent::RepairApplied(OrderRepairApplied { repairs: vec![repair.clone()], repaired_at: Utc::now() }),
            corr,
        );
        assert_eq!(last_open_repair(std::slice::from_ref(&applied)), Some(vec![repair.clone()]));

        let reverted = EventEnvelope::new(
            id,
            3,
            OrderEvent::RepairReverted(OrderRepairReverted { repairs: vec![repair.inverted()], reverted_at: Utc::now() }),
            corr,
        );
        assert_eq!(last_open_repair(&[applied, reverted]), None);
    }
}
