use serde::{Deserialize, Serialize};
use uuid::Uuid;
use std::fmt;

use crate::domain::bag::Bag;
use crate::domain::money::Money;
use crate::domain::payment::Payment;
use super::aggregate::OrderAggregate;
use super::value_objects::{is_long_enough, MIN_ADDRESS_LEN, MIN_PHONE_LEN, MAX_DELIVERY_FEE, MAX_SERVICE_CHARGE};

// ============================================================================
// Order Snapshot - Order row with its linked bags and payment
// ============================================================================

/// One failed clause of the completeness predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderIssue {
    NoBags,
    EmptyBag { bag_id: Uuid, name: String },
    AddressInvalid,
    PhoneInvalid,
    DeliveryFeeOutOfRange,
    ServiceChargeOutOfRange,
    NonPositiveTotal,
}

impl OrderIssue {
    /// Only contact details can be patched with placeholders.
    pub fn is_fixable(&self) -> bool {
        matches!(self, OrderIssue::AddressInvalid | OrderIssue::PhoneInvalid)
    }
}

impl fmt::Display for OrderIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderIssue::NoBags => write!(f, "no bags linked"),
            OrderIssue::EmptyBag { name, .. } => write!(f, "bag '{}' has no items", name),
            OrderIssue::AddressInvalid => write!(f, "delivery address shorter than {} characters", MIN_ADDRESS_LEN),
            OrderIssue::PhoneInvalid => write!(f, "contact phone shorter than {} characters", MIN_PHONE_LEN),
            OrderIssue::DeliveryFeeOutOfRange => write!(f, "delivery fee out of range"),
            OrderIssue::ServiceChargeOutOfRange => write!(f, "service charge out of range"),
            OrderIssue::NonPositiveTotal => write!(f, "total is not positive"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderSnapshot {
    pub order: OrderAggregate,
    pub bags: Vec<Bag>,
    pub payment: Option<Payment>,
}

impl OrderSnapshot {
    pub fn subtotal(&self) -> Money {
        self.bags.iter().map(Bag::total).sum()
    }

    pub fn total(&self) -> Money {
        self.subtotal() + self.order.delivery_fee + self.order.service_charge + self.order.vat_amount
    }

    pub fn is_paid(&self) -> bool {
        self.payment.as_ref().is_some_and(Payment::is_success)
    }

    /// Every clause of the completeness predicate that fails, in a fixed order.
    pub fn issues(&self) -> Vec<OrderIssue> {
        let mut issues = Vec::new();

        if self.bags.is_empty() {
            issues.push(OrderIssue::NoBags);
        }
        for bag in self.bags.iter().filter(|b| b.is_empty()) {
            issues.push(OrderIssue::EmptyBag { bag_id: bag.id, name: bag.name.clone() });
        }
        if !is_long_enough(&self.order.delivery_address, MIN_ADDRESS_LEN) {
            issues.push(OrderIssue::AddressInvalid);
        }
        if !is_long_enough(&self.order.contact_phone, MIN_PHONE_LEN) {
            issues.push(OrderIssue::PhoneInvalid);
        }
        if !self.order.delivery_fee.within(Money::ZERO, MAX_DELIVERY_FEE) {
            issues.push(OrderIssue::DeliveryFeeOutOfRange);
        }
        if !self.order.service_charge.within(Money::ZERO, MAX_SERVICE_CHARGE) {
            issues.push(OrderIssue::ServiceChargeOutOfRange);
        }
        if !self.total().is_positive() {
            issues.push(OrderIssue::NonPositiveTotal);
        }

        issues
    }

    pub fn is_complete(&self) -> bool {
        self.issues().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bag::BagItem;
    use crate::domain::order::value_objects::{ContactPhone, DeliveryAddress, Fees};

    fn snapshot(bags: Vec<Bag>) -> OrderSnapshot {
        let (order, _) = OrderAggregate::place(
            Uuid::new_v4(),
            Uuid::new_v4(),
            vec![Uuid::new_v4()],
            DeliveryAddress::parse("15 Broad Street, Lagos").unwrap(),
            ContactPhone::parse("08031234567").unwrap(),
            Fees::default(),
            Money::ZERO,
        )
        .unwrap();
        OrderSnapshot { order, bags, payment: None }
    }

    #[test]
    fn test_complete_order() {
        let owner = Uuid::new_v4();
        let bag = Bag::new(owner, "Drinks", vec![BagItem::other("Zobo", "drinks", Money::from_major(300), 2)]);
        let snap = snapshot(vec![bag]);

        assert!(snap.is_complete());
        assert_eq!(snap.subtotal(), Money::from_major(600));
        assert_eq!(snap.total(), Money::from_major(1_200));
    }

    #[test]
    fn test_issues_are_listed() {
        let owner = Uuid::new_v4();
        let empty = Bag::new(owner, "Empty", vec![]);
        let mut snap = snapshot(vec![empty]);
        snap.order.contact_phone = "123".to_string();
        snap.order.delivery_address = "  Lagos   ".to_string();

        let issues = snap.issues();
        assert!(matches!(issues[0], OrderIssue::EmptyBag { .. }));
        assert!(issues.contains(&OrderIssue::AddressInvalid));
        assert!(issues.contains(&OrderIssue::PhoneInvalid));
        assert!(!issues.iter().all(OrderIssue::is_fixable));
    }

    #[test]
    fn test_no_bags_is_unfixable() {
        let snap = snapshot(vec![]);
        assert_eq!(snap.issues(), vec![OrderIssue::NoBags]);
        assert!(!OrderIssue::NoBags.is_fixable());
    }

    #[test]
    fn test_zero_total_with_free_fees() {
        let owner = Uuid::new_v4();
        let bag = Bag::new(owner, "Free", vec![BagItem::other("Water", "drinks", Money::ZERO, 1)]);
        let mut snap = snapshot(vec![bag]);
        snap.order.delivery_fee = Money::ZERO;
        snap.order.service_charge = Money::ZERO;
        assert_eq!(snap.issues(), vec![OrderIssue::NonPositiveTotal]);
    }
}
