use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::config::StoreConfig;

// ============================================================================
// Database Connection - Pool Setup and Schema
// ============================================================================
//
// Every store gets its own pool. Connection failures are reported with the
// environment variables that configure the failing store, never as the raw
// driver error alone.
//
// ============================================================================

pub const EVENT_STORE_SCHEMA: &str = include_str!("../../migrations/create_event_store.sql");
pub const PERSONAL_CRYPTOGRAPHY_STORE_SCHEMA: &str =
    include_str!("../../migrations/create_personal_cryptography_store.sql");
pub const PERSONAL_DATA_STORE_SCHEMA: &str = include_str!("../../migrations/create_personal_data_store.sql");

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error(
        "could not connect to the {store} database ({source}). \
         Have you configured {env_prefix}_DSN (and {env_prefix}_MAX_CONNECTIONS) \
         for the event store, personal data store and personal cryptography store?"
    )]
    CouldNotConnect {
        store: &'static str,
        env_prefix: &'static str,
        #[source]
        source: sqlx::Error,
    },
}

/// Open a pool for one store
pub async fn connect(store: &'static str, config: &StoreConfig) -> Result<SqlitePool, ConnectionError> {
    let wrap = |source: sqlx::Error| ConnectionError::CouldNotConnect {
        store,
        env_prefix: config.env_prefix,
        source,
    };

    let options = SqliteConnectOptions::from_str(&config.dsn)
        .map_err(wrap)?
        .create_if_missing(true);

    // An in-memory database lives and dies with its single connection
    let pool_options = if config.is_in_memory() {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(config.max_connections)
    };

    let pool = pool_options.connect_with(options).await.map_err(wrap)?;

    tracing::info!(
        store = store,
        max_connections = config.max_connections,
        in_memory = config.is_in_memory(),
        "Connected to database"
    );

    Ok(pool)
}

/// Fresh private in-memory database, used by tests and the demo binary
pub async fn connect_in_memory(store: &'static str) -> Result<SqlitePool, ConnectionError> {
    connect(store, &StoreConfig::new("IN_MEMORY", "sqlite::memory:")).await
}

/// Run a schema script; every script is idempotent
pub async fn apply_schema(pool: &SqlitePool, schema: &str) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(schema).execute(pool).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_pool_keeps_schema_between_queries() {
        let pool = connect_in_memory("event store").await.unwrap();
        apply_schema(&pool, EVENT_STORE_SCHEMA).await.unwrap();
        // second run is a no-op
        apply_schema(&pool, EVENT_STORE_SCHEMA).await.unwrap();

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM event_store")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_bad_dsn_names_the_env_variables() {
        let config = StoreConfig::new("EVENT_STORE", "postgres://nowhere/db");

        let err = connect("event store", &config).await.unwrap_err();
        let message = err.to_string();

        assert!(message.contains("event store"));
        assert!(message.contains("EVENT_STORE_DSN"));
    }

    #[tokio::test]
    async fn test_unreachable_file_is_a_connection_error() {
        let config = StoreConfig::new(
            "PERSONAL_DATA_STORE",
            "sqlite:///definitely/not/a/real/dir/vault.db",
        );

        let result = connect("personal data store", &config).await;
        assert!(matches!(
            result,
            Err(ConnectionError::CouldNotConnect { env_prefix: "PERSONAL_DATA_STORE", .. })
        ));
    }
}
