use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

use crate::domain::money::Money;
use crate::event_sourcing::Aggregate;
use super::commands::OrderCommand;
use super::errors::OrderError;
use super::events::*;
use super::value_objects::{ContactPhone, DeliveryAddress, Fees, OrderStatus, TerminalPaymentPolicy};

// ============================================================================
// Order Aggregate - Domain Logic
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAggregate {
    // Identity
    pub id: Uuid,
    pub version: i64,

    // Current State
    pub user_id: Uuid,
    pub bag_ids: Vec<Uuid>,
    pub delivery_address: String,
    pub contact_phone: String,
    pub delivery_fee: Money,
    pub service_charge: Money,
    pub vat_amount: Money,
    pub status: OrderStatus,

    // Audit Trail
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    // Optional fields
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_reason: Option<String>,
}

/// How an order responds to a payment-success event in its current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentReaction {
    /// Already Pending; nothing to write.
    AlreadyPending,
    /// On the Way moves back to Pending.
    ResetToPending { from: OrderStatus },
    /// Terminal order left untouched under the Ignore policy.
    IgnoredClosed { status: OrderStatus },
    /// Terminal order moved to Pending under the Reopen policy.
    Reopened { from: OrderStatus },
}

impl PaymentReaction {
    pub fn label(&self) -> &'static str {
        match self {
            PaymentReaction::AlreadyPending => "already_pending",
            PaymentReaction::ResetToPending { .. } => "reset_to_pending",
            PaymentReaction::IgnoredClosed { .. } => "ignored_closed",
            PaymentReaction::Reopened { .. } => "reopened",
        }
    }

    pub fn changes_status(&self) -> bool {
        matches!(self, PaymentReaction::ResetToPending { .. } | PaymentReaction::Reopened { .. })
    }
}

impl OrderAggregate {
    /// Build a new Pending order and the event that records it.
    ///
    /// Inputs arrive already validated; the status is always set here rather
    /// than left to a storage default.
    pub fn place(
        order_id: Uuid,
        user_id: Uuid,
        bag_ids: Vec<Uuid>,
        delivery_address: DeliveryAddress,
        contact_phone: ContactPhone,
        fees: Fees,
        vat_amount: Money,
    ) -> Result<(Self, OrderEvent), OrderError> {
        if bag_ids.is_empty() {
            return Err(OrderError::EmptyBagList);
        }
        fees.validate()?;

        let event = OrderEvent::Placed(OrderPlaced {
            user_id,
            bag_ids,
            delivery_address: delivery_address.into_inner(),
            contact_phone: contact_phone.into_inner(),
            delivery_fee: fees.delivery_fee,
            service_charge: fees.service_charge,
            vat_amount,
            placed_at: Utc::now(),
        });

        let mut order = Self::apply_first_event(order_id, &event)?;
        order.version = 1;
        Ok((order, event))
    }

    pub fn fees(&self) -> Fees {
        Fees {
            delivery_fee: self.delivery_fee,
            service_charge: self.service_charge,
        }
    }

    /// Classify a payment-success event against the current status.
    pub fn payment_reaction(&self, policy: TerminalPaymentPolicy) -> PaymentReaction {
        match self.status {
            OrderStatus::Pending => PaymentReaction::AlreadyPending,
            status if !status.is_terminal() => PaymentReaction::ResetToPending { from: status },
            status => match policy {
                TerminalPaymentPolicy::Ignore => PaymentReaction::IgnoredClosed { status },
                TerminalPaymentPolicy::Reopen => PaymentReaction::Reopened { from: status },
            },
        }
    }

    fn field_value(&self, field: RepairField) -> &str {
        match field {
            RepairField::DeliveryAddress => &self.delivery_address,
            RepairField::ContactPhone => &self.contact_phone,
        }
    }

    fn set_field(&mut self, field: RepairField, value: &str) {
        match field {
            RepairField::DeliveryAddress => self.delivery_address = value.to_string(),
            RepairField::ContactPhone => self.contact_phone = value.to_string(),
        }
    }

    fn reject(&self, to: OrderStatus) -> OrderError {
        OrderError::InvalidStatusTransition { from: self.status, to }
    }
}

// ============================================================================
// Aggregate Trait Implementation
// ============================================================================

impl Aggregate for OrderAggregate {
    type Event = OrderEvent;
    type Command = OrderCommand;
    type Error = OrderError;

    fn apply_first_event(aggregate_id: Uuid, event: &Self::Event) -> Result<Self, Self::Error> {
        match event {
            OrderEvent::Placed(e) => Ok(Self {
                id: aggregate_id,
                version: 0,
                user_id: e.user_id,
                bag_ids: e.bag_ids.clone(),
                delivery_address: e.delivery_address.clone(),
                contact_phone: e.contact_phone.clone(),
                delivery_fee: e.delivery_fee,
                service_charge: e.service_charge,
                vat_amount: e.vat_amount,
                status: OrderStatus::Pending,
                created_at: e.placed_at,
                updated_at: e.placed_at,
                delivered_at: None,
                cancelled_reason: None,
            }),
            _ => Err(OrderError::NotInitialized),
        }
    }

    fn apply_event(&mut self, event: &Self::Event) -> Result<(), Self::Error> {
        match event {
            OrderEvent::Placed(_) => {
                // First event already applied
            }
            OrderEvent::Dispatched(e) => {
                self.status = OrderStatus::OnTheWay;
                self.updated_at = e.dispatched_at;
            }
            OrderEvent::Delivered(e) => {
                self.status = OrderStatus::Delivered;
                self.delivered_at = Some(e.delivered_at);
                self.updated_at = e.delivered_at;
            }
            OrderEvent::Cancelled(e) => {
                self.status = OrderStatus::Cancelled;
                self.cancelled_reason = e.reason.clone();
                self.updated_at = e.cancelled_at;
            }
            OrderEvent::PaymentConfirmed(e) => {
                self.status = OrderStatus::Pending;
                self.delivered_at = None;
                self.cancelled_reason = None;
                self.updated_at = e.confirmed_at;
            }
            OrderEvent::RepairApplied(e) => {
                for repair in &e.repairs {
                    self.set_field(repair.field, &repair.replacement);
                }
                self.updated_at = e.repaired_at;
            }
            OrderEvent::RepairReverted(e) => {
                for repair in &e.repairs {
                    self.set_field(repair.field, &repair.replacement);
                }
                self.updated_at = e.reverted_at;
            }
            OrderEvent::Purged(e) => {
                self.updated_at = e.purged_at;
            }
        }
        Ok(())
    }

    fn handle_command(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        let now = Utc::now();

        match command {
            OrderCommand::Dispatch => {
                if self.status != OrderStatus::Pending {
                    return Err(self.reject(OrderStatus::OnTheWay));
                }
                Ok(vec![OrderEvent::Dispatched(OrderDispatched { dispatched_at: now })])
            }

            OrderCommand::Deliver => {
                if self.status != OrderStatus::OnTheWay {
                    return Err(self.reject(OrderStatus::Delivered));
                }
                Ok(vec![OrderEvent::Delivered(OrderDelivered { delivered_at: now })])
            }

            OrderCommand::Cancel { reason } => {
                if self.status == OrderStatus::Cancelled {
                    return Err(self.reject(OrderStatus::Cancelled));
                }
                Ok(vec![OrderEvent::Cancelled(OrderCancelled {
                    reason: reason.clone(),
                    previous_status: self.status,
                    cancelled_at: now,
                })])
            }

            OrderCommand::ConfirmPayment { payment_id, policy } => {
                match self.payment_reaction(*policy) {
                    PaymentReaction::AlreadyPending | PaymentReaction::IgnoredClosed { .. } => Ok(vec![]),
                    PaymentReaction::ResetToPending { from } => {
                        Ok(vec![OrderEvent::PaymentConfirmed(OrderPaymentConfirmed {
                            payment_id: *payment_id,
                            previous_status: from,
                            reopened: false,
                            confirmed_at: now,
                        })])
                    }
                    PaymentReaction::Reopened { from } => {
                        Ok(vec![OrderEvent::PaymentConfirmed(OrderPaymentConfirmed {
                            payment_id: *payment_id,
                            previous_status: from,
                            reopened: true,
                            confirmed_at: now,
                        })])
                    }
                }
            }

            OrderCommand::ApplyRepair { repairs } => {
                if repairs.is_empty() {
                    return Ok(vec![]);
                }
                if repairs.iter().any(|r| self.field_value(r.field) != r.previous) {
                    return Err(OrderError::RepairSuperseded(self.id));
                }
                Ok(vec![OrderEvent::RepairApplied(OrderRepairApplied {
                    repairs: repairs.clone(),
                    repaired_at: now,
                })])
            }

            OrderCommand::RevertRepair { repairs } => {
                if repairs.is_empty() {
                    return Err(OrderError::NoRepairToRevert(self.id));
                }
                // Only revert while the placeholders are still in place
                if repairs.iter().any(|r| self.field_value(r.field) != r.replacement) {
                    return Err(OrderError::RepairSuperseded(self.id));
                }
                Ok(vec![OrderEvent::RepairReverted(OrderRepairReverted {
                    repairs: repairs.iter().map(FieldRepair::inverted).collect(),
                    reverted_at: now,
                })])
            }

            OrderCommand::Purge { issues } => {
                Ok(vec![OrderEvent::Purged(OrderPurged {
                    issues: issues.clone(),
                    purged_at: now,
                })])
            }
        }
    }

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_sourcing::EventEnvelope;

    fn pending_order() -> OrderAggregate {
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
        order
    }

    fn run(order: &mut OrderAggregate, command: OrderCommand) -> Result<Vec<OrderEvent>, OrderError> {
        let events = order.handle_command(&command)?;
        for event in &events {
            order.apply_event(event)?;
        }
        Ok(events)
    }

    #[test]
    fn test_place_sets_pending_explicitly() {
        let order = pending_order();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.version, 1);
        assert!(order.delivered_at.is_none());
    }

    #[test]
    fn test_place_rejects_empty_bags() {
        let result = OrderAggregate::place(
            Uuid::new_v4(),
            Uuid::new_v4(),
            vec![],
            DeliveryAddress::parse("15 Broad Street, Lagos").unwrap(),
            ContactPhone::parse("08031234567").unwrap(),
            Fees::default(),
            Money::ZERO,
        );
        assert!(matches!(result, Err(OrderError::EmptyBagList)));
    }

    #[test]
    fn test_forward_lifecycle() {
        let mut order = pending_order();

        run(&mut order, OrderCommand::Dispatch).unwrap();
        assert_eq!(order.status, OrderStatus::OnTheWay);

        run(&mut order, OrderCommand::Deliver).unwrap();
        assert_eq!(order.status, OrderStatus::Delivered);
        assert!(order.delivered_at.is_some());
    }

    #[test]
    fn test_rejected_transitions() {
        let mut order = pending_order();
        assert!(matches!(
            order.handle_command(&OrderCommand::Deliver),
            Err(OrderError::InvalidStatusTransition { from: OrderStatus::Pending, to: OrderStatus::Delivered })
        ));

        run(&mut order, OrderCommand::Dispatch).unwrap();
        assert!(order.handle_command(&OrderCommand::Dispatch).is_err());

        run(&mut order, OrderCommand::Cancel { reason: None }).unwrap();
        assert!(order.handle_command(&OrderCommand::Cancel { reason: None }).is_err());
        assert!(order.handle_command(&OrderCommand::Dispatch).is_err());
    }

    #[test]
    fn test_delivered_order_can_be_cancelled() {
        let mut order = pending_order();
        run(&mut order, OrderCommand::Dispatch).unwrap();
        run(&mut order, OrderCommand::Deliver).unwrap();

        let events = run(&mut order, OrderCommand::Cancel { reason: Some("refund".into()) }).unwrap();
        assert!(matches!(
            &events[0],
            OrderEvent::Cancelled(e) if e.previous_status == OrderStatus::Delivered
        ));
        assert_eq!(order.cancelled_reason.as_deref(), Some("refund"));
    }

    #[test]
    fn test_payment_on_pending_is_a_no_op() {
        let order = pending_order();
        let command = OrderCommand::ConfirmPayment {
            payment_id: Uuid::new_v4(),
            policy: TerminalPaymentPolicy::Ignore,
        };
        assert!(order.handle_command(&command).unwrap().is_empty());
        assert!(order.handle_command(&command).unwrap().is_empty());
    }

    #[test]
    fn test_payment_resets_on_the_way_to_pending() {
        let mut order = pending_order();
        run(&mut order, OrderCommand::Dispatch).unwrap();

        assert_eq!(
            order.payment_reaction(TerminalPaymentPolicy::Ignore),
            PaymentReaction::ResetToPending { from: OrderStatus::OnTheWay }
        );
        run(&mut order, OrderCommand::ConfirmPayment {
            payment_id: Uuid::new_v4(),
            policy: TerminalPaymentPolicy::Ignore,
        })
        .unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[test]
    fn test_terminal_order_obeys_payment_policy() {
        let mut order = pending_order();
        run(&mut order, OrderCommand::Dispatch).unwrap();
        run(&mut order, OrderCommand::Deliver).unwrap();

        let ignore = OrderCommand::ConfirmPayment {
            payment_id: Uuid::new_v4(),
            policy: TerminalPaymentPolicy::Ignore,
        };
        assert!(order.handle_command(&ignore).unwrap().is_empty());
        assert_eq!(order.status, OrderStatus::Delivered);

        let events = run(&mut order, OrderCommand::ConfirmPayment {
            payment_id: Uuid::new_v4(),
            policy: TerminalPaymentPolicy::Reopen,
        })
        .unwrap();
        assert!(matches!(&events[0], OrderEvent::PaymentConfirmed(e) if e.reopened));
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(order.delivered_at.is_none());
    }

    #[test]
    fn test_repair_then_revert_restores_values() {
        let mut order = pending_order();
        order.contact_phone = "123".to_string();

        let repairs = vec![FieldRepair {
            field: RepairField::ContactPhone,
            previous: "123".to_string(),
            replacement: "0000000000".to_string(),
        }];

        run(&mut order, OrderCommand::ApplyRepair { repairs: repairs.clone() }).unwrap();
        assert_eq!(order.contact_phone, "0000000000");

        run(&mut order, OrderCommand::RevertRepair { repairs }).unwrap();
        assert_eq!(order.contact_phone, "123");
    }

    #[test]
    fn test_revert_refused_after_manual_edit() {
        let mut order = pending_order();
        let repairs = vec![FieldRepair {
            field: RepairField::ContactPhone,
            previous: order.contact_phone.clone(),
            replacement: "0000000000".to_string(),
        }];
        run(&mut order, OrderCommand::ApplyRepair { repairs: repairs.clone() }).unwrap();

        order.contact_phone = "08099999999".to_string();
        assert!(matches!(
            order.handle_command(&OrderCommand::RevertRepair { repairs }),
            Err(OrderError::RepairSuperseded(_))
        ));
    }

    #[test]
    fn test_replay_matches_live_state() {
        let mut order = pending_order();
        let placed = OrderEvent::Placed(OrderPlaced {
            user_id: order.user_id,
            bag_ids: order.bag_ids.clone(),
            delivery_address: order.delivery_address.clone(),
            contact_phone: order.contact_phone.clone(),
            delivery_fee: order.delivery_fee,
            service_charge: order.service_charge,
            vat_amount: order.vat_amount,
            placed_at: order.created_at,
        });
        let correlation_id = Uuid::new_v4();
        let mut envelopes = vec![EventEnvelope::new(order.id, 1, placed, correlation_id)];

        for command in [OrderCommand::Dispatch, OrderCommand::Deliver] {
            for event in run(&mut order, command).unwrap() {
                let seq = envelopes.len() as i64 + 1;
                envelopes.push(EventEnvelope::new(order.id, seq, event, correlation_id));
            }
        }

        let replayed = OrderAggregate::load_from_events(envelopes).unwrap();
        assert_eq!(replayed.status, OrderStatus::Delivered);
        assert_eq!(replayed.version, 3);
        assert_eq!(replayed.delivered_at, order.delivered_at);
    }
}
