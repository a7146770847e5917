use uuid::Uuid;

use super::events::FieldRepair;
use super::value_objects::{OrderStatus, TerminalPaymentPolicy};

// ============================================================================
// Order Commands - Represent operator and system intent
// ============================================================================
//
// Placement is not a command: the creation routine builds the first event
// itself because it needs bags and stock from the same transaction.
//
// ============================================================================

#[derive(Debug, Clone)]
pub enum OrderCommand {
    Dispatch,
    Deliver,
    Cancel {
        reason: Option<String>,
    },
    ConfirmPayment {
        payment_id: Uuid,
        policy: TerminalPaymentPolicy,
    },
    ApplyRepair {
        repairs: Vec<FieldRepair>,
    },
    RevertRepair {
        repairs: Vec<FieldRepair>,
    },
    Purge {
        issues: Vec<String>,
    },
}

impl OrderCommand {
    /// Operator command that moves an order into `target`.
    ///
    /// Pending is reachable only through payment confirmation, so it has no
    /// operator command.
    pub fn for_target(target: OrderStatus, reason: Option<String>) -> Option<OrderCommand> {
        match target {
            OrderStatus::Pending => None,
            OrderStatus::OnTheWay => Some(OrderCommand::Dispatch),
            OrderStatus::Delivered => Some(OrderCommand::Deliver),
            OrderStatus::Cancelled => Some(OrderCommand::Cancel { reason }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OrderCommand::Dispatch => "dispatch",
            OrderCommand::Deliver => "deliver",
            OrderCommand::Cancel { .. } => "cancel",
            OrderCommand::ConfirmPayment { .. } => "confirm_payment",
            OrderCommand::ApplyRepair { .. } => "apply_repair",
            OrderCommand::RevertRepair { .. } => "revert_repair",
            OrderCommand::Purge { .. } => "purge",
        }
    }
}
