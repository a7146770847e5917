// ============================================================================
// Bag Domain - Cart snapshots the customer checks out
// ============================================================================

pub mod value_objects;

pub use value_objects::*;
