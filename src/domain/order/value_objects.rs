use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::money::Money;
use super::errors::OrderError;

// ============================================================================
// Order Value Objects
// ============================================================================

pub const MIN_ADDRESS_LEN: usize = 10;
pub const MIN_PHONE_LEN: usize = 10;
pub const MAX_DELIVERY_FEE: Money = Money::from_major(10_000);
pub const MAX_SERVICE_CHARGE: Money = Money::from_major(5_000);

/// Lifecycle stage of an order. Labels match the dashboard's wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    #[serde(rename = "On the Way")]
    OnTheWay,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 4] = [
        OrderStatus::Pending,
        OrderStatus::OnTheWay,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::OnTheWay => "On the Way",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Cancelled => "Cancelled",
        }
    }

    /// Delivered and Cancelled are closed; only an operator moves an order out of them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();

        match normalized.as_str() {
            "pending" => Ok(OrderStatus::Pending),
            "ontheway" => Ok(OrderStatus::OnTheWay),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" | "canceled" => Ok(OrderStatus::Cancelled),
            _ => Err(OrderError::UnknownStatus(s.to_string())),
        }
    }
}

/// What a payment-success event may do to an order that is already
/// Delivered or Cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalPaymentPolicy {
    /// Log the event and leave the order untouched.
    #[default]
    Ignore,
    /// Move the order back to Pending and record the reopening.
    Reopen,
}

impl FromStr for TerminalPaymentPolicy {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ignore" => Ok(TerminalPaymentPolicy::Ignore),
            "reopen" => Ok(TerminalPaymentPolicy::Reopen),
            other => Err(OrderError::UnknownPolicy(other.to_string())),
        }
    }
}

/// Delivery address that passed the length check (stored trimmed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryAddress(String);

impl DeliveryAddress {
    pub fn parse(raw: &str) -> Result<Self, OrderError> {
        let trimmed = raw.trim();
        if !is_long_enough(trimmed, MIN_ADDRESS_LEN) {
            return Err(OrderError::AddressTooShort { min: MIN_ADDRESS_LEN });
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// Contact phone that passed the length check (stored trimmed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactPhone(String);

impl ContactPhone {
    pub fn parse(raw: &str) -> Result<Self, OrderError> {
        let trimmed = raw.trim();
        if !is_long_enough(trimmed, MIN_PHONE_LEN) {
            return Err(OrderError::PhoneTooShort { min: MIN_PHONE_LEN });
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

pub(crate) fn is_long_enough(value: &str, min: usize) -> bool {
    value.trim().chars().count() >= min
}

/// Delivery fee and service charge applied to one order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fees {
    pub delivery_fee: Money,
    pub service_charge: Money,
}

impl Fees {
    pub fn validate(&self) -> Result<(), OrderError> {
        if !self.delivery_fee.within(Money::ZERO, MAX_DELIVERY_FEE) {
            return Err(OrderError::DeliveryFeeOutOfRange(self.delivery_fee));
        }
        if !self.service_charge.within(Money::ZERO, MAX_SERVICE_CHARGE) {
            return Err(OrderError::ServiceChargeOutOfRange(self.service_charge));
        }
        Ok(())
    }
}

impl Default for Fees {
    fn default() -> Self {
        Self {
            delivery_fee: Money::from_major(500),
            service_charge: Money::from_major(100),
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
