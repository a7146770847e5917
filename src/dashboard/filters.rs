use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::order::OrderStatus;
use crate::domain::payment::PaymentStatus;

// ============================================================================
// Dashboard Filters - the one predicate every read path uses
// ============================================================================
//
// Stores turn a filter into a query from `statuses()`, `payment_status()`
// and `delivered_on()`; in-memory paths call `matches()`. No other code
// re-states these conditions.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DashboardFilter {
    /// Paid orders waiting to be dispatched.
    PendingPaid,
    /// Paid orders out for delivery.
    OnTheWayPaid,
    /// Paid orders not yet finished: Pending or On the Way.
    Active,
    DeliveredPaid,
    /// Paid orders delivered on the given (UTC) day.
    DeliveredOn(NaiveDate),
}

impl DashboardFilter {
    pub fn statuses(&self) -> &'static [OrderStatus] {
        match self {
            DashboardFilter::PendingPaid => &[OrderStatus::Pending],
            DashboardFilter::OnTheWayPaid => &[OrderStatus::OnTheWay],
            DashboardFilter::Active => &[OrderStatus::Pending, OrderStatus::OnTheWay],
            DashboardFilter::DeliveredPaid | DashboardFilter::DeliveredOn(_) => &[OrderStatus::Delivered],
        }
    }

    /// Payment gate. Every dashboard view counts paid orders only.
    pub fn payment_status(&self) -> Option<PaymentStatus> {
        Some(PaymentStatus::Success)
    }

    pub fn delivered_on(&self) -> Option<NaiveDate> {
        match self {
            DashboardFilter::DeliveredOn(date) => Some(*date),
            _ => None,
        }
    }

    pub fn matches(
        &self,
        status: OrderStatus,
        delivered_at: Option<DateTime<Utc>>,
        payment_status: Option<PaymentStatus>,
    ) -> bool {
        if !self.statuses().contains(&status) {
            return false;
        }
        if let Some(required) = self.payment_status() {
            if payment_status != Some(required) {
                return false;
            }
        }
        match self.delivered_on() {
            Some(day) => delivered_at.is_some_and(|at| at.date_naive() == day),
            None => true,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DashboardFilter::PendingPaid => "pending",
            DashboardFilter::OnTheWayPaid => "on_the_way",
            DashboardFilter::Active => "active",
            DashboardFilter::DeliveredPaid => "delivered",
            DashboardFilter::DeliveredOn(_) => "delivered_on",
        }
    }
}
