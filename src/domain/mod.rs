// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// Each area has its own subdirectory. Storage lives in src/store/ and only
// sees these types through the store traits.
//
// ============================================================================

pub mod money;
pub mod bag;
pub mod order;
pub mod payment;
