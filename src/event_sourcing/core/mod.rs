// ============================================================================
// Event Sourcing Core - Events, Streams, Serialization, Dispatch
// ============================================================================
//
// Storage-agnostic building blocks shared by the event store and its
// collaborators.
//
// ============================================================================

pub mod dispatch;
pub mod event;

// Re-export core types for convenience
pub use dispatch::{EventDispatcher, EventListener, ImmediateEventDispatcher};
pub use event::{
    deserialize_event, serialize_event, stream_events, DomainEvent, EventSerializer,
    JsonEventSerializer, SerializationError, StreamEvent, StreamId, StreamVersion, VersionOutOfRange,
};
