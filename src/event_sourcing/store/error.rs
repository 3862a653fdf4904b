use crate::event_sourcing::core::{SerializationError, VersionOutOfRange};

// ============================================================================
// Event Store Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum EventStoreError {
    #[error("event store query failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error(transparent)]
    Serialization(#[from] SerializationError),

    #[error(transparent)]
    VersionOutOfRange(#[from] VersionOutOfRange),

    #[error("event not found: {0}")]
    EventNotFound(i64),
}
