// ============================================================================
// Personal Data - Crypto-Shredding for Data Subjects
// ============================================================================
//
// Personal values never enter the event log. They live here, encrypted with
// one key per data subject:
// - Value objects (PersonalKey, PersonalDataKey, CryptographicDetails, etc.)
// - Encryption strategy (PersonalDataEncryption, AesGcmEncryption)
// - Cryptography store (per-subject key material and its tombstone)
// - Data store (encrypted values addressed by personal key + data key)
// - Errors (PersonalDataError, EncryptionError)
//
// Destroying a subject's key makes every ciphertext they ever produced
// unreadable, including copies the data store never deleted.
//
// ============================================================================

pub mod value_objects;
pub mod errors;
pub mod encryption;
pub mod cryptography_store;
pub mod data_store;

// Re-export for convenience
pub use value_objects::*;
pub use errors::*;
pub use encryption::*;
pub use cryptography_store::PersonalCryptographyStore;
pub use data_store::PersonalDataStore;
