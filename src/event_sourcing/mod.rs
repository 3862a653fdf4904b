// ============================================================================
// Event Sourcing Infrastructure
// ============================================================================
//
// Generic, reusable event sourcing infrastructure: an append-only event log
// plus the collaborator contracts it consumes.
//
// ============================================================================

// Core abstractions (GENERIC - works with any event type)
pub mod core;
pub mod store;

// Re-export core infrastructure
pub use self::core::*;
pub use self::store::*;
