use super::value_objects::{PersonalDataKey, PersonalKey};

// ============================================================================
// Personal Data Errors
// ============================================================================
//
// "Never existed" (CryptographyNotFound, DataNotFound), "deliberately erased"
// (RemovedPerson) and "infrastructure failed" (Query) are separate variants
// because each needs a different remedy.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum EncryptionError {
    #[error("cryptographic details for {found} are not compatible with {expected} encryption")]
    IncompatibleDetails { expected: String, found: String },

    #[error("cryptographic details do not contain the key {0}")]
    MissingKey(&'static str),

    #[error("key material is malformed: {0}")]
    MalformedKey(String),

    #[error("ciphertext is malformed: {0}")]
    MalformedCiphertext(String),

    #[error("encryption failed")]
    EncryptionFailed,

    #[error("decryption failed: wrong key or tampered ciphertext")]
    DecryptionFailed,

    #[error("decrypted personal data is not valid UTF-8")]
    NotUtf8,
}

#[derive(Debug, thiserror::Error)]
pub enum PersonalDataError {
    #[error("personal data query failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error("can not add cryptography for {0}: person already has cryptography")]
    AlreadyHasCrypto(PersonalKey),

    #[error("can not retrieve cryptography for {0}: person was removed")]
    RemovedPerson(PersonalKey),

    #[error("can not find cryptography for person {0}")]
    CryptographyNotFound(PersonalKey),

    #[error("can not find personal data {data_key} for person {personal_key}")]
    DataNotFound {
        personal_key: PersonalKey,
        data_key: PersonalDataKey,
    },

    #[error(transparent)]
    Encryption(#[from] EncryptionError),

    #[error("stored cryptographic details for {personal_key} are unreadable: {source}")]
    MalformedCryptography {
        personal_key: PersonalKey,
        #[source]
        source: serde_json::Error,
    },
}

impl PersonalDataError {
    /// Short label for metrics
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Query(_) => "query",
            Self::AlreadyHasCrypto(_) => "already_has_crypto",
            Self::RemovedPerson(_) => "removed_person",
            Self::CryptographyNotFound(_) => "cryptography_not_found",
            Self::DataNotFound { .. } => "data_not_found",
            Self::Encryption(_) => "encryption",
            Self::MalformedCryptography { .. } => "malformed_cryptography",
        }
    }
}
