use uuid::Uuid;

use crate::domain::money::Money;
use crate::store::StoreError;
use crate::utils::IsTransient;
use super::value_objects::OrderStatus;

// ============================================================================
// Order Business Rule Errors
// ============================================================================

/// Broad class of a failure, used to decide what the caller may be told and
/// how loudly it is logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Caller-correctable input problem; message is shown verbatim.
    Validation,
    /// Referenced entities are not the caller's; message reveals nothing.
    Authorization,
    /// Internal logic defect or storage constraint hit; generic message.
    Integrity,
    NotFound,
    /// Request conflicts with the order's current state.
    Conflict,
    Storage,
}

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("At least one bag must be provided.")]
    EmptyBagList,

    #[error("One or more bags not found or don't belong to you.")]
    InvalidBagOwnership,

    #[error("Bag '{bag_name}' is empty. All bags must contain items.")]
    EmptyBag { bag_id: Uuid, bag_name: String },

    #[error("Bag '{bag_name}': at least one plate is required when ordering food category items")]
    PlateRequirementUnmet { bag_id: Uuid, bag_name: String },

    #[error("Bag '{bag_name}': sorry, {item} is currently out of stock.")]
    OutOfStock { bag_name: String, item: String },

    #[error("Bag '{bag_name}': only {available} portions of {item} available, {requested} requested.")]
    InsufficientStock { bag_name: String, item: String, available: u32, requested: u32 },

    #[error("Valid delivery address is required (minimum {min} characters).")]
    AddressTooShort { min: usize },

    #[error("Valid contact phone number is required (minimum {min} characters).")]
    PhoneTooShort { min: usize },

    #[error("Delivery fee must be between 0 and 10,000 (got {0}).")]
    DeliveryFeeOutOfRange(Money),

    #[error("Service charge must be between 0 and 5,000 (got {0}).")]
    ServiceChargeOutOfRange(Money),

    #[error("Order {order_id} is incomplete after creation")]
    IncompleteAfterCreation { order_id: Uuid },

    #[error("Cannot move order from {from} to {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    #[error("Repair on order {0} no longer matches the stored values")]
    RepairSuperseded(Uuid),

    #[error("Order {0} has no repair to revert")]
    NoRepairToRevert(Uuid),

    #[error("Order not found: {0}")]
    OrderNotFound(Uuid),

    #[error("Payment not found: {0}")]
    PaymentNotFound(Uuid),

    #[error("Unknown order status: {0}")]
    UnknownStatus(String),

    #[error("Unknown terminal payment policy: {0}")]
    UnknownPolicy(String),

    #[error("Storage constraint violated: {0}")]
    ConstraintViolation(String),

    #[error("Event history is unreadable: {0}")]
    CorruptHistory(String),

    #[error(transparent)]
    Storage(StoreError),

    #[error("Aggregate not initialized")]
    NotInitialized,
}

impl OrderError {
    /// Stable machine-readable code for the presentation layer.
    pub fn code(&self) -> &'static str {
        match self {
            OrderError::EmptyBagList => "empty-bag-list",
            OrderError::InvalidBagOwnership => "invalid-bag-ownership",
            OrderError::EmptyBag { .. } => "bag-has-no-items",
            OrderError::PlateRequirementUnmet { .. } => "plate-requirement-unmet",
            OrderError::OutOfStock { .. } => "out-of-stock",
            OrderError::InsufficientStock { .. } => "insufficient-stock",
            OrderError::AddressTooShort { .. } => "address-too-short",
            OrderError::PhoneTooShort { .. } => "phone-too-short",
            OrderError::DeliveryFeeOutOfRange(_) => "fee-out-of-range",
            OrderError::ServiceChargeOutOfRange(_) => "charge-out-of-range",
            OrderError::IncompleteAfterCreation { .. } => "post-creation-incomplete",
            OrderError::InvalidStatusTransition { .. } => "invalid-status-transition",
            OrderError::RepairSuperseded(_) => "repair-superseded",
            OrderError::NoRepairToRevert(_) => "no-repair-to-revert",
            OrderError::OrderNotFound(_) => "order-not-found",
            OrderError::PaymentNotFound(_) => "payment-not-found",
            OrderError::UnknownStatus(_) => "unknown-status",
            OrderError::UnknownPolicy(_) => "unknown-policy",
            OrderError::ConstraintViolation(_) => "constraint-violation",
            OrderError::CorruptHistory(_) => "corrupt-history",
            OrderError::Storage(_) => "storage-error",
            OrderError::NotInitialized => "not-initialized",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            OrderError::EmptyBagList
            | OrderError::EmptyBag { .. }
            | OrderError::PlateRequirementUnmet { .. }
            | OrderError::OutOfStock { .. }
            | OrderError::InsufficientStock { .. }
            | OrderError::AddressTooShort { .. }
            | OrderError::PhoneTooShort { .. }
            | OrderError::DeliveryFeeOutOfRange(_)
            | OrderError::ServiceChargeOutOfRange(_)
            | OrderError::UnknownStatus(_)
            | OrderError::UnknownPolicy(_) => ErrorCategory::Validation,
            OrderError::InvalidBagOwnership => ErrorCategory::Authorization,
            OrderError::IncompleteAfterCreation { .. }
            | OrderError::ConstraintViolation(_)
            | OrderError::CorruptHistory(_)
            | OrderError::NotInitialized => ErrorCategory::Integrity,
            OrderError::OrderNotFound(_)
            | OrderError::PaymentNotFound(_)
            | OrderError::NoRepairToRevert(_) => ErrorCategory::NotFound,
            OrderError::InvalidStatusTransition { .. }
            | OrderError::RepairSuperseded(_) => ErrorCategory::Conflict,
            OrderError::Storage(_) => ErrorCategory::Storage,
        }
    }

    /// Text safe to show an end user. Integrity and storage failures never
    /// leak internals.
    pub fn user_message(&self) -> String {
        match self.category() {
            ErrorCategory::Integrity | ErrorCategory::Storage => {
                "We could not place your order. Please try again.".to_string()
            }
            _ => self.to_string(),
        }
    }
}

impl From<StoreError> for OrderError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Constraint(name) => OrderError::ConstraintViolation(name),
            other => OrderError::Storage(other),
        }
    }
}

impl IsTransient for OrderError {
    fn is_transient(&self) -> bool {
        matches!(self, OrderError::Storage(e) if e.is_transient())
    }
}
