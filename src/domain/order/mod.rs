// ============================================================================
// Order Domain - Business Logic for the Order Aggregate
// ============================================================================
//
// - Value objects (OrderStatus, DeliveryAddress, ContactPhone, Fees)
// - Events and commands
// - Errors (OrderError, ErrorCategory)
// - Aggregate (status state machine, repairs)
// - Snapshot (completeness predicate)
// - Command handler and the creation routine (OrderPlacement)
//
// ============================================================================

pub mod value_objects;
pub mod events;
pub mod commands;
pub mod errors;
pub mod aggregate;
pub mod snapshot;
pub mod command_handler;
pub mod placement;

// Re-export for convenience
pub use value_objects::*;
pub use events::*;
pub use commands::*;
pub use errors::*;
pub use aggregate::*;
pub use snapshot::*;
pub use command_handler::*;
pub use placement::*;
