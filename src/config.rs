use std::env;

// ============================================================================
// Configuration - Connection Settings from the Environment
// ============================================================================
//
// Each store reads its own `<PREFIX>_DSN` so the event log, the personal data
// and the cryptography material can live in separate databases.
//
// ============================================================================

pub const EVENT_STORE_PREFIX: &str = "EVENT_STORE";
pub const PERSONAL_DATA_STORE_PREFIX: &str = "PERSONAL_DATA_STORE";
pub const PERSONAL_CRYPTOGRAPHY_STORE_PREFIX: &str = "PERSONAL_CRYPTOGRAPHY_STORE";

const DEFAULT_DSN: &str = "sqlite::memory:";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_METRICS_PORT: u16 = 9090;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be a positive integer, got {value:?}")]
    InvalidNumber { var: String, value: String },
}

/// Connection settings for one store
#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    /// Env prefix this config was read from, used in connection errors
    pub env_prefix: &'static str,
    pub dsn: String,
    pub max_connections: u32,
}

impl StoreConfig {
    pub fn new(env_prefix: &'static str, dsn: impl Into<String>) -> Self {
        Self {
            env_prefix,
            dsn: dsn.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }

    /// Read `<PREFIX>_DSN` and `<PREFIX>_MAX_CONNECTIONS`
    pub fn from_env(env_prefix: &'static str) -> Result<Self, ConfigError> {
        let dsn = env::var(format!("{env_prefix}_DSN")).unwrap_or_else(|_| DEFAULT_DSN.to_string());
        let max_connections = read_number(&format!("{env_prefix}_MAX_CONNECTIONS"))?
            .unwrap_or(DEFAULT_MAX_CONNECTIONS);

        Ok(Self {
            env_prefix,
            dsn,
            max_connections,
        })
    }

    pub fn is_in_memory(&self) -> bool {
        self.dsn.contains(":memory:") || self.dsn.contains("mode=memory")
    }
}

/// Settings for the whole vault: three stores plus the metrics endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct VaultConfig {
    pub event_store: StoreConfig,
    pub personal_data_store: StoreConfig,
    pub personal_cryptography_store: StoreConfig,
    pub metrics_port: u16,
}

impl VaultConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let metrics_port = match read_number("METRICS_PORT")? {
            Some(port) => u16::try_from(port).map_err(|_| ConfigError::InvalidNumber {
                var: "METRICS_PORT".to_string(),
                value: port.to_string(),
            })?,
            None => DEFAULT_METRICS_PORT,
        };

        Ok(Self {
            event_store: StoreConfig::from_env(EVENT_STORE_PREFIX)?,
            personal_data_store: StoreConfig::from_env(PERSONAL_DATA_STORE_PREFIX)?,
            personal_cryptography_store: StoreConfig::from_env(PERSONAL_CRYPTOGRAPHY_STORE_PREFIX)?,
            metrics_port,
        })
    }
}

fn read_number(var: &str) -> Result<Option<u32>, ConfigError> {
    match env::var(var) {
        Ok(value) => value
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|n| *n > 0)
            .map(Some)
            .ok_or_else(|| ConfigError::InvalidNumber {
                var: var.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}
