// ============================================================================
// Event Sourcing Infrastructure
// ============================================================================
//
// Generic aggregate/event abstractions. Events are persisted as an audit log
// by the store layer (src/store/) in the same transaction as the row change.
//
// ============================================================================

mod core;

pub use self::core::*;
