use chrono::Utc;
use sqlx::sqlite::SqlitePool;
use std::sync::Arc;

use super::cryptography_store::PersonalCryptographyStore;
use super::errors::PersonalDataError;
use super::value_objects::{EncryptedPersonalData, PersonalData, PersonalDataKey, PersonalKey};
use crate::db;
use crate::metrics::Metrics;

// ============================================================================
// Personal Data Store - Encrypted Values per Data Subject
// ============================================================================
//
// Values are encrypted with the subject's key from the cryptography store,
// which is created on first write. Erasure has two halves:
// - `remove_data_for` deletes the ciphertext rows
// - `PersonalCryptographyStore::remove_person` destroys the key
// Only both together (`forget_person`) erase a subject completely.
//
// Writes are not transactional across the two stores. Two concurrent first
// writes for one subject race to provision a key; the loser re-reads the
// winner's key instead of failing.
//
// ============================================================================

#[derive(Debug, sqlx::FromRow)]
struct PersonalDataRecord {
    encrypted_personal_data: String,
    encryption: String,
}

pub struct PersonalDataStore {
    pool: SqlitePool,
    cryptography: Arc<PersonalCryptographyStore>,
    metrics: Option<Arc<Metrics>>,
}

impl PersonalDataStore {
    pub fn new(pool: SqlitePool, cryptography: Arc<PersonalCryptographyStore>) -> Self {
        Self {
            pool,
            cryptography,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Create the personal_data_store table if it does not exist yet
    pub async fn migrate(&self) -> Result<(), PersonalDataError> {
        db::apply_schema(&self.pool, db::PERSONAL_DATA_STORE_SCHEMA).await?;
        Ok(())
    }

    pub fn cryptography(&self) -> &Arc<PersonalCryptographyStore> {
        &self.cryptography
    }

    /// Encrypt and store one value, provisioning the subject's key if needed
    ///
    /// Storing data for a removed person fails with `RemovedPerson`.
    pub async fn store_data(
        &self,
        personal_key: &PersonalKey,
        data_key: &PersonalDataKey,
        data: &PersonalData,
    ) -> Result<(), PersonalDataError> {
        if !self.cryptography.has_person(personal_key).await? {
            self.provision(personal_key).await?;
        }

        let crypto = self.cryptography.get_cryptography_for(personal_key).await?;
        let encrypted = self.cryptography.encryption().encrypt(data, &crypto)?;

        sqlx::query(
            "INSERT INTO personal_data_store (personal_key, data_key, encrypted_personal_data, encryption, stored_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(personal_key.as_str())
        .bind(data_key.to_string())
        .bind(&encrypted.ciphertext)
        .bind(&encrypted.encryption)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        tracing::info!(
            personal_key = %personal_key,
            data_key = %data_key,
            encryption = %encrypted.encryption,
            "Stored personal data"
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_personal_data_stored();
        }
        Ok(())
    }

    /// Decrypt one value
    ///
    /// `DataNotFound` if nothing is stored under the pair; `RemovedPerson` if
    /// the rows exist but the subject's key was destroyed. When several rows
    /// share the pair, the most recently stored one wins.
    pub async fn retrieve_data(
        &self,
        personal_key: &PersonalKey,
        data_key: &PersonalDataKey,
    ) -> Result<PersonalData, PersonalDataError> {
        let result = self.decrypt_latest(personal_key, data_key).await;

        if let (Err(e), Some(metrics)) = (&result, &self.metrics) {
            metrics.record_personal_data_failure(e.reason());
        }
        result
    }

    /// Hard-delete every value stored for the subject, returning the row count
    ///
    /// Leaves the subject's key untouched.
    pub async fn remove_data_for(&self, personal_key: &PersonalKey) -> Result<u64, PersonalDataError> {
        let removed = sqlx::query("DELETE FROM personal_data_store WHERE personal_key = $1")
            .bind(personal_key.as_str())
            .execute(&self.pool)
            .await?
            .rows_affected();

        tracing::info!(personal_key = %personal_key, removed, "Removed personal data");
        if let Some(metrics) = &self.metrics {
            metrics.record_personal_data_purged(removed);
        }
        Ok(removed)
    }

    /// Full erasure: delete the subject's values, then shred their key
    ///
    /// A subject without cryptography has nothing to shred; that is not an error here.
    pub async fn forget_person(&self, personal_key: &PersonalKey) -> Result<(), PersonalDataError> {
        self.remove_data_for(personal_key).await?;

        match self.cryptography.remove_person(personal_key).await {
            Ok(()) | Err(PersonalDataError::CryptographyNotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn decrypt_latest(
        &self,
        personal_key: &PersonalKey,
        data_key: &PersonalDataKey,
    ) -> Result<PersonalData, PersonalDataError> {
        let record = sqlx::query_as::<_, PersonalDataRecord>(
            "SELECT encrypted_personal_data, encryption
             FROM personal_data_store
             WHERE personal_key = $1 AND data_key = $2
             ORDER BY id DESC
             LIMIT 1",
        )
        .bind(personal_key.as_str())
        .bind(data_key.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| PersonalDataError::DataNotFound {
            personal_key: personal_key.clone(),
            data_key: *data_key,
        })?;

        let crypto = self.cryptography.get_cryptography_for(personal_key).await?;
        let encrypted = EncryptedPersonalData::new(record.encryption, record.encrypted_personal_data);
        let data = self.cryptography.encryption().decrypt(&encrypted, &crypto)?;

        tracing::debug!(personal_key = %personal_key, data_key = %data_key, "Retrieved personal data");
        Ok(data)
    }

    /// Give an unseen subject fresh key material
    ///
    /// Losing the race to a concurrent writer is fine: the caller re-reads
    /// whatever key won.
    async fn provision(&self, personal_key: &PersonalKey) -> Result<(), PersonalDataError> {
        let crypto = self.cryptography.encryption().generate_cryptographic_details()?;

        match self.cryptography.add_person(personal_key, &crypto).await {
            Ok(()) => Ok(()),
            Err(PersonalDataError::AlreadyHasCrypto(_)) => {
                tracing::warn!(
                    personal_key = %personal_key,
                    "Cryptography was provisioned concurrently, using the existing key"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_provisioning_race();
                }
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
