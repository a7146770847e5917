// ============================================================================
// Food ordering: order integrity core
// ============================================================================
//
// - domain/         - money, bags, orders (aggregate, placement), payments
// - event_sourcing/ - aggregate and event envelope abstractions
// - store/          - transactional persistence (Postgres and in-memory)
// - dashboard/      - shared status/payment filters and counts
// - recovery/       - repair, purge and verification of incomplete orders
// - actors/         - background delivery and monitoring
//
// ============================================================================

pub mod actors;
pub mod config;
pub mod dashboard;
pub mod domain;
pub mod event_sourcing;
pub mod metrics;
pub mod recovery;
pub mod store;
pub mod telemetry;
pub mod utils;
