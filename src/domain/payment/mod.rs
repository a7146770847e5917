// ============================================================================
// Payment Domain - Payments and the payment-success event
// ============================================================================
//
// The ledger records payments and raises `OrderPaymentSucceeded`; the
// subscriber is the single place that turns that event into an order
// status change.
//
// ============================================================================

pub mod value_objects;
pub mod events;
pub mod ledger;
pub mod subscriber;

pub use value_objects::*;
pub use events::*;
pub use ledger::*;
pub use subscriber::*;
