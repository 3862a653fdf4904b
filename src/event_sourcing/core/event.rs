use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use uuid::Uuid;

// ============================================================================
// Domain Events and Streams
// ============================================================================
//
// A domain event is an immutable fact. Events are appended either to a
// stream (one aggregate instance, versioned from zero) or unscoped, outside
// any stream.
//
// ============================================================================

/// Domain Event trait
///
/// All domain events must implement this trait to be used with the event store.
/// Equality is structural: two events are the same fact when all fields match.
pub trait DomainEvent:
    Serialize + DeserializeOwned + Clone + PartialEq + fmt::Debug + Send + Sync + 'static
{
    /// Name recorded in the `event_name` column
    fn event_name(&self) -> &'static str;
}

/// Identifies the stream an event belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamId {
    /// Events of one aggregate instance
    Scoped(String),
    /// Events recorded outside any stream
    Unscoped,
}

impl StreamId {
    pub fn new(id: impl Into<String>) -> Self {
        Self::Scoped(id.into())
    }

    pub fn generate() -> Self {
        Self::Scoped(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Scoped(id) => Some(id),
            Self::Unscoped => None,
        }
    }

    /// Column value: the id itself, or NULL for unscoped events
    pub(crate) fn to_column(&self) -> Option<String> {
        self.as_str().map(str::to_string)
    }

    pub(crate) fn from_column(column: Option<String>) -> Self {
        match column {
            Some(id) => Self::Scoped(id),
            None => Self::Unscoped,
        }
    }
}

impl From<Uuid> for StreamId {
    fn from(id: Uuid) -> Self {
        Self::Scoped(id.to_string())
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scoped(id) => f.write_str(id),
            Self::Unscoped => f.write_str("<unscoped>"),
        }
    }
}

/// Position of an event within its stream, starting at zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct StreamVersion(u64);

impl StreamVersion {
    pub const fn zero() -> Self {
        Self(0)
    }

    pub const fn new(version: u64) -> Self {
        Self(version)
    }

    /// Saturates at `u64::MAX`, which is past the storable range and is
    /// rejected on append rather than wrapping.
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// SQLite integers are signed 64-bit
    pub(crate) fn to_column(self) -> Result<i64, VersionOutOfRange> {
        i64::try_from(self.0).map_err(|_| VersionOutOfRange(i128::from(self.0)))
    }

    pub(crate) fn from_column(column: i64) -> Result<Self, VersionOutOfRange> {
        u64::try_from(column)
            .map(Self)
            .map_err(|_| VersionOutOfRange(i128::from(column)))
    }
}

/// A stream version that does not fit the stream_version column
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("stream version {0} is outside the storable range 0..={max}", max = i64::MAX)]
pub struct VersionOutOfRange(pub i128);

impl fmt::Display for StreamVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One event at its intended place in a stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent<E> {
    pub stream_id: StreamId,
    pub version: StreamVersion,
    pub event: E,
}

impl<E> StreamEvent<E> {
    pub fn new(stream_id: StreamId, version: StreamVersion, event: E) -> Self {
        Self {
            stream_id,
            version,
            event,
        }
    }
}

/// Build consecutive stream events starting after `from`, or at zero for a new stream
pub fn stream_events<E>(
    stream_id: &StreamId,
    from: Option<StreamVersion>,
    events: impl IntoIterator<Item = E>,
) -> Vec<StreamEvent<E>> {
    let mut version = from.map(StreamVersion::next).unwrap_or_default();
    events
        .into_iter()
        .map(|event| {
            let stream_event = StreamEvent::new(stream_id.clone(), version, event);
            version = version.next();
            stream_event
        })
        .collect()
}

// ============================================================================
// Event Serialization
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("could not serialize {event_name}: {source}")]
    Serialize {
        event_name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not deserialize {event_name}: {source}")]
    Deserialize {
        event_name: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Turns domain events into the stored payload and back
pub trait EventSerializer<E>: Send + Sync {
    fn serialize(&self, event: &E) -> Result<String, SerializationError>;

    fn deserialize(&self, event_name: &str, payload: &str) -> Result<E, SerializationError>;

    fn event_name_for(&self, event: &E) -> String;
}

/// serde_json serializer; the event's own serde representation is the payload
pub struct JsonEventSerializer<E> {
    _phantom: PhantomData<fn() -> E>,
}

impl<E> JsonEventSerializer<E> {
    pub fn new() -> Self {
        Self { _phantom: PhantomData }
    }
}

impl<E> Default for JsonEventSerializer<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: DomainEvent> EventSerializer<E> for JsonEventSerializer<E> {
    fn serialize(&self, event: &E) -> Result<String, SerializationError> {
        serialize_event(event).map_err(|source| SerializationError::Serialize {
            event_name: event.event_name().to_string(),
            source,
        })
    }

    fn deserialize(&self, event_name: &str, payload: &str) -> Result<E, SerializationError> {
        deserialize_event(payload).map_err(|source| SerializationError::Deserialize {
            event_name: event_name.to_string(),
            source,
        })
    }

    fn event_name_for(&self, event: &E) -> String {
        event.event_name().to_string()
    }
}

pub fn serialize_event<E: Serialize>(event: &E) -> Result<String, serde_json::Error> {
    serde_json::to_string(event)
}

pub fn deserialize_event<E: DeserializeOwned>(json: &str) -> Result<E, serde_json::Error> {
    serde_json::from_str(json)
}

// ============================================================================
// Tests
// ============================================================================
