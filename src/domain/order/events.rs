use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

use crate::domain::money::Money;
use crate::event_sourcing::DomainEvent;
use super::value_objects::OrderStatus;

// ============================================================================
// Order Events - Audit Log Entries for the Order Aggregate
// ============================================================================

/// Order Event - Union type for all order events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    Placed(OrderPlaced),
    Dispatched(OrderDispatched),
    Delivered(OrderDelivered),
    Cancelled(OrderCancelled),
    PaymentConfirmed(OrderPaymentConfirmed),
    RepairApplied(OrderRepairApplied),
    RepairReverted(OrderRepairReverted),
    Purged(OrderPurged),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::Placed(_) => "OrderPlaced",
            OrderEvent::Dispatched(_) => "OrderDispatched",
            OrderEvent::Delivered(_) => "OrderDelivered",
            OrderEvent::Cancelled(_) => "OrderCancelled",
            OrderEvent::PaymentConfirmed(_) => "OrderPaymentConfirmed",
            OrderEvent::RepairApplied(_) => "OrderRepairApplied",
            OrderEvent::RepairReverted(_) => "OrderRepairReverted",
            OrderEvent::Purged(_) => "OrderPurged",
        }
    }
}

// ============================================================================
// Individual Event Types
// ============================================================================

/// Order Placed - first event, written by the creation routine
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderPlaced {
    pub user_id: Uuid,
    pub bag_ids: Vec<Uuid>,
    pub delivery_address: String,
    pub contact_phone: String,
    pub delivery_fee: Money,
    pub service_charge: Money,
    pub vat_amount: Money,
    pub placed_at: DateTime<Utc>,
}

/// Order Dispatched - Pending to On the Way
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderDispatched {
    pub dispatched_at: DateTime<Utc>,
}

/// Order Delivered - On the Way to Delivered
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderDelivered {
    pub delivered_at: DateTime<Utc>,
}

/// Order Cancelled - operator closed the order
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderCancelled {
    pub reason: Option<String>,
    pub previous_status: OrderStatus,
    pub cancelled_at: DateTime<Utc>,
}

/// Payment success moved the order (back) to Pending.
///
/// `reopened` is set when the order was Delivered or Cancelled and the
/// configured policy allowed reopening it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderPaymentConfirmed {
    pub payment_id: Uuid,
    pub previous_status: OrderStatus,
    pub reopened: bool,
    pub confirmed_at: DateTime<Utc>,
}

/// Field overwritten by the recovery command.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RepairField {
    DeliveryAddress,
    ContactPhone,
}

/// One overwritten field with the value it had before.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FieldRepair {
    pub field: RepairField,
    pub previous: String,
    pub replacement: String,
}

impl FieldRepair {
    /// The repair that undoes this one.
    pub fn inverted(&self) -> FieldRepair {
        FieldRepair {
            field: self.field,
            previous: self.replacement.clone(),
            replacement: self.previous.clone(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderRepairApplied {
    pub repairs: Vec<FieldRepair>,
    pub repaired_at: DateTime<Utc>,
}

/// Restores the values recorded by the last `OrderRepairApplied`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderRepairReverted {
    pub repairs: Vec<FieldRepair>,
    pub reverted_at: DateTime<Utc>,
}

/// Order row deleted by recovery. Stays in the log after the row is gone.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderPurged {
    pub issues: Vec<String>,
    pub purged_at: DateTime<Utc>,
}
