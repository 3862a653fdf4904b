use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;
use std::sync::Arc;

use super::encryption::PersonalDataEncryption;
use super::errors::PersonalDataError;
use super::value_objects::{CryptographicDetails, CryptographyState, PersonalKey};
use crate::db;
use crate::metrics::Metrics;

// ============================================================================
// Personal Cryptography Store - Per-Subject Key Material
// ============================================================================
//
// One row per personal key, ever. Removing a person tombstones the row: the
// key material is set to NULL and `cleared_at` is stamped, the row itself
// stays. Because the row stays, adding the same person again is rejected and
// a shredded subject can never become active again.
//
// ============================================================================

#[derive(Debug, sqlx::FromRow)]
struct CryptographyRecord {
    cryptographic_details: Option<String>,
    cleared_at: Option<DateTime<Utc>>,
}

pub struct PersonalCryptographyStore {
    pool: SqlitePool,
    encryption: Arc<dyn PersonalDataEncryption>,
    metrics: Option<Arc<Metrics>>,
}

impl PersonalCryptographyStore {
    pub fn new(pool: SqlitePool, encryption: Arc<dyn PersonalDataEncryption>) -> Self {
        Self {
            pool,
            encryption,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Create the personal_cryptography_store table if it does not exist yet
    pub async fn migrate(&self) -> Result<(), PersonalDataError> {
        db::apply_schema(&self.pool, db::PERSONAL_CRYPTOGRAPHY_STORE_SCHEMA).await?;
        Ok(())
    }

    /// The configured strategy, for callers that need fresh key material
    pub fn encryption(&self) -> &Arc<dyn PersonalDataEncryption> {
        &self.encryption
    }

    /// Record a person's cryptographic details
    ///
    /// Fails with `AlreadyHasCrypto` whenever a record exists, including a
    /// tombstoned one.
    pub async fn add_person(
        &self,
        person: &PersonalKey,
        crypto: &CryptographicDetails,
    ) -> Result<(), PersonalDataError> {
        let serialized = crypto
            .serialize()
            .map_err(|source| PersonalDataError::MalformedCryptography {
                personal_key: person.clone(),
                source,
            })?;

        let result = sqlx::query(
            "INSERT INTO personal_cryptography_store (personal_key, cryptographic_details, encryption, added_at)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(person.as_str())
        .bind(serialized)
        .bind(crypto.encryption())
        .bind(Utc::now())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                tracing::info!(
                    personal_key = %person,
                    encryption = crypto.encryption(),
                    "Added cryptography for person"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_cryptography_provisioned();
                }
                Ok(())
            }
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(PersonalDataError::AlreadyHasCrypto(person.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// True if a record exists for the person, shredded or not
    pub async fn has_person(&self, person: &PersonalKey) -> Result<bool, PersonalDataError> {
        let (exists,): (i64,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM personal_cryptography_store WHERE personal_key = $1)",
        )
        .bind(person.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(exists != 0)
    }

    pub async fn cryptography_state(&self, person: &PersonalKey) -> Result<CryptographyState, PersonalDataError> {
        let record = sqlx::query_as::<_, CryptographyRecord>(
            "SELECT cryptographic_details, cleared_at
             FROM personal_cryptography_store
             WHERE personal_key = $1",
        )
        .bind(person.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(record) = record else {
            return Ok(CryptographyState::Unknown);
        };

        match (record.cryptographic_details, record.cleared_at) {
            (Some(details), None) => CryptographicDetails::deserialize(&details)
                .map(CryptographyState::Active)
                .map_err(|source| PersonalDataError::MalformedCryptography {
                    personal_key: person.clone(),
                    source,
                }),
            // Missing key material counts as shredded even without a timestamp
            (_, cleared_at) => Ok(CryptographyState::Shredded { cleared_at }),
        }
    }

    /// The person's active cryptographic details
    ///
    /// `CryptographyNotFound` if the person was never added, `RemovedPerson`
    /// if their key material was destroyed.
    pub async fn get_cryptography_for(&self, person: &PersonalKey) -> Result<CryptographicDetails, PersonalDataError> {
        match self.cryptography_state(person).await? {
            CryptographyState::Active(details) => Ok(details),
            CryptographyState::Shredded { .. } => Err(PersonalDataError::RemovedPerson(person.clone())),
            CryptographyState::Unknown => Err(PersonalDataError::CryptographyNotFound(person.clone())),
        }
    }

    /// Destroy the person's key material, keeping the record as a tombstone
    ///
    /// Removing an already removed person succeeds and keeps the original
    /// `cleared_at`. Removing a person that was never added fails with
    /// `CryptographyNotFound`.
    pub async fn remove_person(&self, person: &PersonalKey) -> Result<(), PersonalDataError> {
        let result = sqlx::query(
            "UPDATE personal_cryptography_store
             SET cryptographic_details = NULL, cleared_at = $1
             WHERE personal_key = $2 AND cleared_at IS NULL",
        )
        .bind(Utc::now())
        .bind(person.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            if !self.has_person(person).await? {
                return Err(PersonalDataError::CryptographyNotFound(person.clone()));
            }
            tracing::debug!(personal_key = %person, "Person was already removed");
            return Ok(());
        }

        tracing::info!(personal_key = %person, "🔥 Shredded cryptography for person");
        if let Some(metrics) = &self.metrics {
            metrics.record_subject_shredded();
        }
        Ok(())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
