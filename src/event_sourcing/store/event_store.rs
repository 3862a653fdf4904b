use chrono::{DateTime, Utc};
use futures_util::future;
use futures_util::TryStreamExt;
use sqlx::sqlite::{Sqlite, SqlitePool};
use std::sync::Arc;

use super::error::EventStoreError;
use crate::db;
use crate::event_sourcing::core::{
    DomainEvent, EventDispatcher, EventSerializer, StreamEvent, StreamId, StreamVersion,
};
use crate::metrics::Metrics;

// ============================================================================
// Generic Event Store - Append-Only Event Log
// ============================================================================
//
// This is a GENERIC event store that works with ANY event type.
//
// Type Parameter:
// - `E`: The domain event type (must implement DomainEvent trait)
//
// Responsibilities:
// 1. Append events to the event_store table (never update, never delete)
// 2. Read a stream back in stream-version order
// 3. Page through all events in global (id) order
// 4. Announce every persisted batch to the dispatcher, once
//
// Stream versions are recorded as given. Two writers appending to the same
// stream can both succeed with colliding versions; nothing here rejects that.
//
// ============================================================================

const EMPTY_META_DATA: &str = "{}";

/// A row of the event_store table
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct EventRecord {
    pub id: i64,
    pub stream_id: Option<String>,
    pub stream_version: i64,
    pub event_name: String,
    pub event_data: String,
    pub raised_at: DateTime<Utc>,
    pub meta_data: String,
}

pub struct EventStore<E: DomainEvent> {
    pool: SqlitePool,
    serializer: Arc<dyn EventSerializer<E>>,
    dispatcher: Arc<dyn EventDispatcher<E>>,
    metrics: Option<Arc<Metrics>>,
}

impl<E: DomainEvent> EventStore<E> {
    pub fn new(
        pool: SqlitePool,
        serializer: Arc<dyn EventSerializer<E>>,
        dispatcher: Arc<dyn EventDispatcher<E>>,
    ) -> Self {
        Self {
            pool,
            serializer,
            dispatcher,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Create the event_store table if it does not exist yet
    pub async fn migrate(&self) -> Result<(), EventStoreError> {
        db::apply_schema(&self.pool, db::EVENT_STORE_SCHEMA).await?;
        Ok(())
    }

    /// Persist a single event outside any stream, then dispatch it alone
    pub async fn store_event(&self, event: E) -> Result<(), EventStoreError> {
        let id = self
            .insert(&self.pool, &StreamId::Unscoped, StreamVersion::zero(), &event)
            .await?;

        tracing::info!(
            event_id = id,
            event_name = event.event_name(),
            "Stored unscoped event"
        );
        self.record_appended(1);

        self.dispatch(&[event]).await;
        Ok(())
    }

    /// Persist events in the given order, then dispatch the whole batch once
    ///
    /// The inserts share one transaction. Dispatch happens after commit and is
    /// not part of it: a crash between the two leaves the batch stored but
    /// never announced.
    pub async fn store_stream(&self, events: Vec<StreamEvent<E>>) -> Result<(), EventStoreError> {
        if events.is_empty() {
            tracing::debug!("Ignoring empty event stream");
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for stream_event in &events {
            self.insert(
                &mut *tx,
                &stream_event.stream_id,
                stream_event.version,
                &stream_event.event,
            )
            .await?;
        }
        tx.commit().await?;

        tracing::info!(
            stream_id = %events[0].stream_id,
            first_version = %events[0].version,
            event_count = events.len(),
            "✅ Appended events to event store"
        );
        self.record_appended(events.len());

        let domain_events: Vec<E> = events.into_iter().map(|e| e.event).collect();
        self.dispatch(&domain_events).await;
        Ok(())
    }

    /// All events of one stream, ascending by stream version
    pub async fn get_stream(&self, stream_id: &StreamId) -> Result<Vec<StreamEvent<E>>, EventStoreError> {
        let events: Vec<StreamEvent<E>> = sqlx::query_as::<_, EventRecord>(
            "SELECT id, stream_id, stream_version, event_name, event_data, raised_at, meta_data
             FROM event_store
             WHERE stream_id IS $1
             ORDER BY stream_version ASC, id ASC",
        )
        .bind(stream_id.to_column())
        .fetch(&self.pool)
        .map_err(EventStoreError::from)
        .and_then(|record| future::ready(self.to_stream_event(record)))
        .try_collect()
        .await?;

        tracing::debug!(
            stream_id = %stream_id,
            event_count = events.len(),
            "Loaded event stream"
        );
        Ok(events)
    }

    /// A page of events in global insertion order
    ///
    /// Skips the first `skip` events and returns up to `take`. `take == 0`
    /// means no limit: everything after `skip`.
    pub async fn get_events(&self, take: u32, skip: u32) -> Result<Vec<E>, EventStoreError> {
        self.get_event_records(take, skip)
            .await?
            .into_iter()
            .map(|record| self.deserialize(&record))
            .collect()
    }

    /// Same page as [`get_events`](Self::get_events), without deserializing payloads
    pub async fn get_event_records(&self, take: u32, skip: u32) -> Result<Vec<EventRecord>, EventStoreError> {
        // SQLite treats a negative LIMIT as "no limit"
        let limit: i64 = if take == 0 { -1 } else { i64::from(take) };

        let records = sqlx::query_as::<_, EventRecord>(
            "SELECT id, stream_id, stream_version, event_name, event_data, raised_at, meta_data
             FROM event_store
             ORDER BY id ASC
             LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(i64::from(skip))
        .fetch_all(&self.pool)
        .await?;

        tracing::debug!(take, skip, returned = records.len(), "Loaded event page");
        Ok(records)
    }

    /// A single event by its sequence id
    pub async fn get_event(&self, id: i64) -> Result<E, EventStoreError> {
        let record = sqlx::query_as::<_, EventRecord>(
            "SELECT id, stream_id, stream_version, event_name, event_data, raised_at, meta_data
             FROM event_store
             WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(EventStoreError::EventNotFound(id))?;

        self.deserialize(&record)
    }

    /// Highest version recorded for a stream, `None` for an empty stream
    ///
    /// Informational only: appends never check it.
    pub async fn current_version(&self, stream_id: &StreamId) -> Result<Option<StreamVersion>, EventStoreError> {
        let (version,): (Option<i64>,) = sqlx::query_as(
            "SELECT MAX(stream_version) FROM event_store WHERE stream_id IS $1",
        )
        .bind(stream_id.to_column())
        .fetch_one(&self.pool)
        .await?;

        Ok(version.map(StreamVersion::from_column).transpose()?)
    }

    async fn insert<'e, X>(
        &self,
        executor: X,
        stream_id: &StreamId,
        version: StreamVersion,
        event: &E,
    ) -> Result<i64, EventStoreError>
    where
        X: sqlx::Executor<'e, Database = Sqlite>,
    {
        let stream_version = version.to_column()?;
        let event_data = self.serializer.serialize(event)?;
        let event_name = self.serializer.event_name_for(event);

        let result = sqlx::query(
            "INSERT INTO event_store (stream_id, stream_version, event_name, event_data, raised_at, meta_data)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(stream_id.to_column())
        .bind(stream_version)
        .bind(event_name)
        .bind(event_data)
        .bind(Utc::now())
        .bind(EMPTY_META_DATA)
        .execute(executor)
        .await?;

        Ok(result.last_insert_rowid())
    }

    fn deserialize(&self, record: &EventRecord) -> Result<E, EventStoreError> {
        Ok(self.serializer.deserialize(&record.event_name, &record.event_data)?)
    }

    fn to_stream_event(&self, record: EventRecord) -> Result<StreamEvent<E>, EventStoreError> {
        let event = self.deserialize(&record)?;
        Ok(StreamEvent::new(
            StreamId::from_column(record.stream_id),
            StreamVersion::from_column(record.stream_version)?,
            event,
        ))
    }

    async fn dispatch(&self, events: &[E]) {
        self.dispatcher.dispatch(events).await;
        if let Some(metrics) = &self.metrics {
            metrics.record_batch_dispatched();
        }
    }

    fn record_appended(&self, count: usize) {
        if let Some(metrics) = &self.metrics {
            metrics.record_events_appended(count);
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_sourcing::core::{stream_events, JsonEventSerializer, SerializationError};
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use tokio::sync::Mutex;

    #[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
    #[serde(tag = "type", content = "data")]
    enum AccountEvent {
        Opened { owner: String },
        Deposited { amount: i64 },
    }

    impl DomainEvent for AccountEvent {
        fn event_name(&self) -> &'static str {
            match self {
                AccountEvent::Opened { .. } => "AccountOpened",
                AccountEvent::Deposited { .. } => "AccountDeposited",
            }
        }
    }

    #[derive(Default)]
    struct RecordingDispatcher {
        batches: Mutex<Vec<Vec<AccountEvent>>>,
    }

    #[async_trait]
    impl EventDispatcher<AccountEvent> for RecordingDispatcher {
        async fn dispatch(&self, events: &[AccountEvent]) {
            self.batches.lock().await.push(events.to_vec());
        }
    }

    async fn event_store() -> (EventStore<AccountEvent>, Arc<RecordingDispatcher>) {
        let pool = db::connect_in_memory("event store").await.unwrap();
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let store = EventStore::new(
            pool,
            Arc::new(JsonEventSerializer::new()),
            dispatcher.clone(),
        );
        store.migrate().await.unwrap();
        (store, dispatcher)
    }

    fn deposit(amount: i64) -> AccountEvent {
        AccountEvent::Deposited { amount }
    }

    #[tokio::test]
    async fn test_store_event_round_trip() {
        let (store, dispatcher) = event_store().await;
        let event = AccountEvent::Opened {
            owner: "hats".to_string(),
        };

        store.store_event(event.clone()).await.unwrap();

        let events = store.get_events(1, 0).await.unwrap();
        assert_eq!(events, vec![event.clone()]);
        assert_eq!(store.get_event(1).await.unwrap(), event);

        let batches = dispatcher.batches.lock().await;
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0], vec![event]);
    }

    #[tokio::test]
    async fn test_store_event_is_unscoped_at_version_zero() {
        let (store, _) = event_store().await;
        store.store_event(deposit(5)).await.unwrap();

        let unscoped = store.get_stream(&StreamId::Unscoped).await.unwrap();
        assert_eq!(unscoped.len(), 1);
        assert_eq!(unscoped[0].stream_id, StreamId::Unscoped);
        assert_eq!(unscoped[0].version, StreamVersion::zero());

        let records = store.get_event_records(0, 0).await.unwrap();
        assert_eq!(records[0].stream_id, None);
        assert_eq!(records[0].event_name, "AccountDeposited");
        assert_eq!(records[0].meta_data, "{}");
    }

    #[tokio::test]
    async fn test_store_stream_dispatches_once_per_batch() {
        let (store, dispatcher) = event_store().await;
        let id = StreamId::generate();
        let events = stream_events(&id, None, vec![deposit(1), deposit(2), deposit(3)]);

        store.store_stream(events).await.unwrap();

        let batches = dispatcher.batches.lock().await;
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0], vec![deposit(1), deposit(2), deposit(3)]);
    }

    #[tokio::test]
    async fn test_empty_stream_neither_stores_nor_dispatches() {
        let (store, dispatcher) = event_store().await;

        store.store_stream(Vec::new()).await.unwrap();

        assert!(store.get_events(0, 0).await.unwrap().is_empty());
        assert!(dispatcher.batches.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_get_stream_orders_by_version_across_interleaving() {
        let (store, _) = event_store().await;
        let a = StreamId::new("account-a");
        let b = StreamId::new("account-b");

        // out of order for `a`, interleaved with `b`
        store
            .store_stream(vec![StreamEvent::new(a.clone(), StreamVersion::new(2), deposit(30))])
            .await
            .unwrap();
        store
            .store_stream(vec![StreamEvent::new(b.clone(), StreamVersion::zero(), deposit(99))])
            .await
            .unwrap();
        store
            .store_stream(vec![
                StreamEvent::new(a.clone(), StreamVersion::zero(), deposit(10)),
                StreamEvent::new(a.clone(), StreamVersion::new(1), deposit(20)),
            ])
            .await
            .unwrap();

        let stream = store.get_stream(&a).await.unwrap();
        let versions: Vec<u64> = stream.iter().map(|e| e.version.as_u64()).collect();
        let events: Vec<AccountEvent> = stream.into_iter().map(|e| e.event).collect();

        assert_eq!(versions, vec![0, 1, 2]);
        assert_eq!(events, vec![deposit(10), deposit(20), deposit(30)]);
        assert_eq!(store.get_stream(&b).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_get_stream_of_unknown_stream_is_empty() {
        let (store, _) = event_store().await;
        assert!(store.get_stream(&StreamId::new("nobody")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_events_pages_in_insertion_order() {
        let (store, _) = event_store().await;
        for amount in 0..10 {
            store.store_event(deposit(amount)).await.unwrap();
        }

        assert_eq!(store.get_events(3, 0).await.unwrap(), vec![deposit(0), deposit(1), deposit(2)]);
        assert_eq!(store.get_events(3, 4).await.unwrap(), vec![deposit(4), deposit(5), deposit(6)]);
        assert_eq!(store.get_events(5, 8).await.unwrap(), vec![deposit(8), deposit(9)]);
        assert!(store.get_events(2, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_take_zero_means_no_limit() {
        let (store, _) = event_store().await;
        for amount in 0..4 {
            store.store_event(deposit(amount)).await.unwrap();
        }

        assert_eq!(store.get_events(0, 0).await.unwrap().len(), 4);
        assert_eq!(store.get_events(0, 1).await.unwrap(), vec![deposit(1), deposit(2), deposit(3)]);
    }

    #[tokio::test]
    async fn test_get_event_missing_id_is_not_found() {
        let (store, _) = event_store().await;

        let result = store.get_event(42).await;
        assert!(matches!(result, Err(EventStoreError::EventNotFound(42))));
    }

    #[tokio::test]
    async fn test_colliding_versions_are_both_recorded() {
        let (store, _) = event_store().await;
        let id = StreamId::new("contended");

        store
            .store_stream(vec![StreamEvent::new(id.clone(), StreamVersion::zero(), deposit(1))])
            .await
            .unwrap();
        store
            .store_stream(vec![StreamEvent::new(id.clone(), StreamVersion::zero(), deposit(2))])
            .await
            .unwrap();

        let stream = store.get_stream(&id).await.unwrap();
        assert_eq!(stream.len(), 2);
        // ties keep insertion order
        assert_eq!(stream[0].event, deposit(1));
        assert_eq!(stream[1].event, deposit(2));
    }

    #[tokio::test]
    async fn test_current_version_tracks_highest_version() {
        let (store, _) = event_store().await;
        let id = StreamId::new("account-c");

        assert_eq!(store.current_version(&id).await.unwrap(), None);

        let events = stream_events(&id, None, vec![deposit(1), deposit(2)]);
        store.store_stream(events).await.unwrap();
        assert_eq!(store.current_version(&id).await.unwrap(), Some(StreamVersion::new(1)));

        let current = store.current_version(&id).await.unwrap();
        store.store_stream(stream_events(&id, current, vec![deposit(3)])).await.unwrap();
        assert_eq!(store.current_version(&id).await.unwrap(), Some(StreamVersion::new(2)));
    }

    /// JSON, except negative deposits can not be serialized
    struct NoOverdraftSerializer;

    impl EventSerializer<AccountEvent> for NoOverdraftSerializer {
        fn serialize(&self, event: &AccountEvent) -> Result<String, SerializationError> {
            match event {
                AccountEvent::Deposited { amount } if *amount < 0 => Err(SerializationError::Serialize {
                    event_name: event.event_name().to_string(),
                    source: serde_json::from_str::<i64>("overdraft").unwrap_err(),
                }),
                _ => JsonEventSerializer::<AccountEvent>::new().serialize(event),
            }
        }

        fn deserialize(&self, event_name: &str, payload: &str) -> Result<AccountEvent, SerializationError> {
            JsonEventSerializer::<AccountEvent>::new().deserialize(event_name, payload)
        }

        fn event_name_for(&self, event: &AccountEvent) -> String {
            event.event_name().to_string()
        }
    }

    #[tokio::test]
    async fn test_failed_batch_stores_and_dispatches_nothing() {
        let pool = db::connect_in_memory("event store").await.unwrap();
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let store: EventStore<AccountEvent> =
            EventStore::new(pool, Arc::new(NoOverdraftSerializer), dispatcher.clone());
        store.migrate().await.unwrap();

        let id = StreamId::generate();
        let result = store
            .store_stream(stream_events(&id, None, vec![deposit(1), deposit(-1)]))
            .await;

        assert!(matches!(result, Err(EventStoreError::Serialization(_))));
        assert!(store.get_event_records(0, 0).await.unwrap().is_empty());
        assert!(dispatcher.batches.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_version_beyond_column_range_is_rejected() {
        let (store, dispatcher) = event_store().await;
        let id = StreamId::generate();

        let result = store
            .store_stream(vec![
                StreamEvent::new(id.clone(), StreamVersion::zero(), deposit(1)),
                StreamEvent::new(id.clone(), StreamVersion::new(u64::MAX), deposit(2)),
            ])
            .await;

        assert!(matches!(result, Err(EventStoreError::VersionOutOfRange(_))));
        assert!(store.get_stream(&id).await.unwrap().is_empty());
        assert!(dispatcher.batches.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_largest_storable_version_round_trips() {
        let (store, _) = event_store().await;
        let id = StreamId::generate();
        let largest = StreamVersion::new(i64::MAX as u64);

        store
            .store_stream(vec![StreamEvent::new(id.clone(), largest, deposit(1))])
            .await
            .unwrap();

        assert_eq!(store.get_stream(&id).await.unwrap()[0].version, largest);
        assert_eq!(store.current_version(&id).await.unwrap(), Some(largest));
    }

    #[tokio::test]
    async fn test_negative_stored_version_is_an_error() {
        let (store, _) = event_store().await;
        let id = StreamId::new("corrupted");
        sqlx::query(
            "INSERT INTO event_store (stream_id, stream_version, event_name, event_data, raised_at)
             VALUES ($1, -1, 'AccountDeposited', $2, $3)",
        )
        .bind(id.to_column())
        .bind(serde_json::to_string(&deposit(1)).unwrap())
        .bind(Utc::now())
        .execute(&store.pool)
        .await
        .unwrap();

        assert!(matches!(
            store.get_stream(&id).await,
            Err(EventStoreError::VersionOutOfRange(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_table_is_a_query_error() {
        let pool = db::connect_in_memory("event store").await.unwrap();
        let store: EventStore<AccountEvent> = EventStore::new(
            pool,
            Arc::new(JsonEventSerializer::new()),
            Arc::new(RecordingDispatcher::default()),
        );

        assert!(matches!(store.get_event(1).await, Err(EventStoreError::Query(_))));
        assert!(matches!(store.store_event(deposit(1)).await, Err(EventStoreError::Query(_))));
    }

    #[tokio::test]
    async fn test_metrics_count_appends_and_dispatches() {
        let (store, _) = event_store().await;
        let metrics = Arc::new(Metrics::new().unwrap());
        let store = store.with_metrics(metrics.clone());

        store.store_event(deposit(1)).await.unwrap();
        let id = StreamId::generate();
        store.store_stream(stream_events(&id, None, vec![deposit(2), deposit(3)])).await.unwrap();

        assert_eq!(metrics.events_appended.get(), 3);
        assert_eq!(metrics.batches_dispatched.get(), 2);
    }
}
