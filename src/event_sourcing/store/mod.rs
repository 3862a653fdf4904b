// ============================================================================
// Event Sourcing Store - Relational Persistence Layer
// ============================================================================
//
// Append-only `event_store` table. Works with ANY domain event type.
//
// ============================================================================

pub mod error;
pub mod event_store;

pub use error::EventStoreError;
pub use event_store::{EventRecord, EventStore};
