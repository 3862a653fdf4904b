use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Personal Data Value Objects
// ============================================================================

/// Pseudonymous identifier of a data subject
///
/// Lives in its own namespace: a personal key is never a stream id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PersonalKey(String);

impl PersonalKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PersonalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies one stored value (one field) of a data subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PersonalDataKey(Uuid);

impl PersonalDataKey {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(key: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(key).map(Self)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl From<Uuid> for PersonalDataKey {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for PersonalDataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Plaintext personal data. Never logged.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonalData(String);

impl PersonalData {
    pub fn new(data: impl Into<String>) -> Self {
        Self(data.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for PersonalData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PersonalData(<{} bytes redacted>)", self.0.len())
    }
}

/// Ciphertext plus the algorithm that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedPersonalData {
    pub encryption: String,
    pub ciphertext: String,
}

impl EncryptedPersonalData {
    pub fn new(encryption: impl Into<String>, ciphertext: impl Into<String>) -> Self {
        Self {
            encryption: encryption.into(),
            ciphertext: ciphertext.into(),
        }
    }
}

/// Algorithm tag plus named key material, as produced by an encryption strategy
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CryptographicDetails {
    encryption: String,
    keys: BTreeMap<String, String>,
}

impl CryptographicDetails {
    pub fn new(encryption: impl Into<String>, keys: BTreeMap<String, String>) -> Self {
        Self {
            encryption: encryption.into(),
            keys,
        }
    }

    pub fn encryption(&self) -> &str {
        &self.encryption
    }

    pub fn key(&self, name: &str) -> Option<&str> {
        self.keys.get(name).map(String::as_str)
    }

    pub fn serialize(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn deserialize(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl fmt::Debug for CryptographicDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptographicDetails")
            .field("encryption", &self.encryption)
            .field("keys", &self.keys.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Lifecycle of a subject's key material: Unknown -> Active -> Shredded
#[derive(Debug, Clone, PartialEq)]
pub enum CryptographyState {
    /// No record was ever created
    Unknown,
    Active(CryptographicDetails),
    /// Record kept, key material destroyed
    Shredded { cleared_at: Option<DateTime<Utc>> },
}

impl CryptographyState {
    /// True once a record exists, shredded or not
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    pub fn is_shredded(&self) -> bool {
        matches!(self, Self::Shredded { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_personal_data_debug_is_redacted() {
        let data = PersonalData::new("shawn mccool");
        let debug = format!("{:?}", data);

        assert!(!debug.contains("shawn"));
        assert!(debug.contains("12 bytes"));
    }

    #[test]
    fn test_cryptographic_details_debug_hides_key_material() {
        let mut keys = BTreeMap::new();
        keys.insert("secretKey".to_string(), "c2VjcmV0".to_string());
        let details = CryptographicDetails::new("aes-256-gcm", keys);

        let debug = format!("{:?}", details);
        assert!(debug.contains("secretKey"));
        assert!(!debug.contains("c2VjcmV0"));
    }

    #[test]
    fn test_cryptographic_details_json_round_trip() {
        let mut keys = BTreeMap::new();
        keys.insert("secretKey".to_string(), "abc".to_string());
        let details = CryptographicDetails::new("aes-256-gcm", keys);

        let json = details.serialize().unwrap();
        let back = CryptographicDetails::deserialize(&json).unwrap();

        assert_eq!(back, details);
        assert_eq!(back.key("secretKey"), Some("abc"));
        assert_eq!(back.key("publicKey"), None);
    }

    #[test]
    fn test_data_key_parse() {
        let key = PersonalDataKey::generate();
        assert_eq!(PersonalDataKey::parse(&key.to_string()).unwrap(), key);
        assert!(PersonalDataKey::parse("hats").is_err());
    }

    #[test]
    fn test_cryptography_state_predicates() {
        assert!(!CryptographyState::Unknown.is_known());
        let shredded = CryptographyState::Shredded { cleared_at: None };
        assert!(shredded.is_known());
        assert!(shredded.is_shredded());
    }
}
