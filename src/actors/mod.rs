// ============================================================================
// Actors Module
// ============================================================================
//
// Actor-based infrastructure for background work.
//
// - payment_events    - queued delivery of payment-success events
// - integrity_monitor - periodic dry-run scan for incomplete orders
//
// Note: Order rules live in the command handler and the subscriber, NOT in
//       actors. Actors only schedule and serialise calls into them.
//
// ============================================================================

mod integrity_monitor;
mod payment_events;

pub use integrity_monitor::{GetLastScan, IntegrityMonitorActor, IntegritySnapshot, RunIntegrityScan};
pub use payment_events::{DeliverPaymentEvent, GetPaymentEventStats, PaymentEventStats, PaymentEventsActor};
