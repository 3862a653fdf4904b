use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use event_vault::config::VaultConfig;
use event_vault::db;
use event_vault::event_sourcing::{
    stream_events, DomainEvent, EventListener, EventStore, ImmediateEventDispatcher,
    JsonEventSerializer, StreamId,
};
use event_vault::metrics::{self, Metrics};
use event_vault::personal_data::{
    AesGcmEncryption, PersonalCryptographyStore, PersonalData, PersonalDataError, PersonalDataKey,
    PersonalDataStore, PersonalKey,
};

// ============================================================================
// Demo Domain - Member registration with crypto-shredded personal data
// ============================================================================
//
// Events only carry data keys. The name itself sits in the personal data
// store, encrypted with the member's key.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
enum MemberEvent {
    MemberRegistered {
        personal_key: PersonalKey,
        name: PersonalDataKey,
    },
    MemberRenamed {
        personal_key: PersonalKey,
        name: PersonalDataKey,
    },
    MemberForgotten {
        personal_key: PersonalKey,
    },
    RegistrationsOpened,
}

impl DomainEvent for MemberEvent {
    fn event_name(&self) -> &'static str {
        match self {
            Self::MemberRegistered { .. } => "MemberRegistered",
            Self::MemberRenamed { .. } => "MemberRenamed",
            Self::MemberForgotten { .. } => "MemberForgotten",
            Self::RegistrationsOpened => "RegistrationsOpened",
        }
    }
}

struct LoggingListener;

#[async_trait]
impl EventListener<MemberEvent> for LoggingListener {
    async fn handle(&self, events: &[MemberEvent]) {
        for event in events {
            tracing::info!(event = event.event_name(), "📨 Event dispatched");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,event_vault=debug")),
        )
        .init();

    tracing::info!("🚀 Starting event vault demo");

    let config = VaultConfig::from_env()?;

    // === 1. Metrics ===
    let metrics = Arc::new(Metrics::new()?);
    tracing::info!("📊 Metrics registry created with {} metrics", metrics.registry().gather().len());

    // actix-web gets its own runtime on a separate thread
    let metrics_registry = Arc::new(metrics.registry().clone());
    let metrics_port = config.metrics_port;
    std::thread::spawn(move || {
        let rt = match tokio::runtime::Runtime::new() {
            Ok(rt) => rt,
            Err(e) => {
                tracing::error!("Could not start metrics runtime: {}", e);
                return;
            }
        };
        rt.block_on(async {
            if let Err(e) = metrics::start_metrics_server(metrics_registry, metrics_port).await {
                tracing::error!("Metrics server error: {}", e);
            }
        });
    });

    // === 2. Connect the three stores ===
    let event_pool = db::connect("event store", &config.event_store).await?;
    let data_pool = db::connect("personal data store", &config.personal_data_store).await?;
    let crypto_pool = db::connect("personal cryptography store", &config.personal_cryptography_store).await?;

    let dispatcher = Arc::new(ImmediateEventDispatcher::<MemberEvent>::new());
    dispatcher.add_listener(Arc::new(LoggingListener));

    let events = EventStore::new(
        event_pool,
        Arc::new(JsonEventSerializer::<MemberEvent>::new()),
        dispatcher,
    )
    .with_metrics(metrics.clone());
    events.migrate().await?;

    let cryptography = PersonalCryptographyStore::new(crypto_pool, Arc::new(AesGcmEncryption::new()))
        .with_metrics(metrics.clone());
    cryptography.migrate().await?;

    let personal_data = PersonalDataStore::new(data_pool, Arc::new(cryptography))
        .with_metrics(metrics.clone());
    personal_data.migrate().await?;

    // === 3. Register a member ===
    events.store_event(MemberEvent::RegistrationsOpened).await?;

    let member = PersonalKey::generate();
    let stream = StreamId::generate();
    let first_name = PersonalDataKey::generate();
    let second_name = PersonalDataKey::generate();

    personal_data
        .store_data(&member, &first_name, &PersonalData::new("shawn mccool"))
        .await?;
    personal_data
        .store_data(&member, &second_name, &PersonalData::new("shawn m."))
        .await?;

    let current = events.current_version(&stream).await?;
    events
        .store_stream(stream_events(
            &stream,
            current,
            [
                MemberEvent::MemberRegistered {
                    personal_key: member.clone(),
                    name: first_name,
                },
                MemberEvent::MemberRenamed {
                    personal_key: member.clone(),
                    name: second_name,
                },
            ],
        ))
        .await?;
    tracing::info!(stream_id = %stream, "✅ Member registered");

    // === 4. Replay the stream, resolving names ===
    for stream_event in events.get_stream(&stream).await? {
        let name_key = match &stream_event.event {
            MemberEvent::MemberRegistered { name, .. } | MemberEvent::MemberRenamed { name, .. } => name,
            _ => continue,
        };
        let name = personal_data.retrieve_data(&member, name_key).await?;
        tracing::info!(version = %stream_event.version, bytes = name.as_bytes().len(), "🔓 Resolved name");
    }

    // === 5. Forget the member ===
    personal_data.forget_person(&member).await?;
    let current = events.current_version(&stream).await?;
    events
        .store_stream(stream_events(
            &stream,
            current,
            [MemberEvent::MemberForgotten {
                personal_key: member.clone(),
            }],
        ))
        .await?;

    match personal_data.retrieve_data(&member, &first_name).await {
        Err(PersonalDataError::DataNotFound { .. }) | Err(PersonalDataError::RemovedPerson(_)) => {
            tracing::info!(personal_key = %member, "🗑️ Member forgotten, personal data is unrecoverable");
        }
        Ok(_) => tracing::warn!(personal_key = %member, "Personal data survived erasure"),
        Err(e) => return Err(e.into()),
    }

    let logged = events.get_events(0, 0).await?;
    tracing::info!(events = logged.len(), "🎉 Demo complete!");

    Ok(())
}
