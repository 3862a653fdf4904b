use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::BTreeMap;

use super::errors::EncryptionError;
use super::value_objects::{CryptographicDetails, EncryptedPersonalData, PersonalData};

// ============================================================================
// Personal Data Encryption - Pluggable Strategy
// ============================================================================
//
// A strategy generates key material for a new data subject and encrypts /
// decrypts that subject's values with it. Key material is stored by the
// cryptography store; destroying it is what makes ciphertext unrecoverable.
//
// ============================================================================

pub trait PersonalDataEncryption: Send + Sync {
    /// Algorithm tag written next to key material and ciphertext
    fn name(&self) -> &'static str;

    /// Fresh key material for a new data subject
    fn generate_cryptographic_details(&self) -> Result<CryptographicDetails, EncryptionError>;

    fn encrypt(
        &self,
        data: &PersonalData,
        details: &CryptographicDetails,
    ) -> Result<EncryptedPersonalData, EncryptionError>;

    fn decrypt(
        &self,
        data: &EncryptedPersonalData,
        details: &CryptographicDetails,
    ) -> Result<PersonalData, EncryptionError>;
}

/// AES-256-GCM algorithm tag.
pub const AES_256_GCM: &str = "aes-256-gcm";

/// Name of the key entry in the cryptographic details.
pub const SECRET_KEY: &str = "secretKey";

const KEY_SIZE: usize = 32;
const NONCE_SIZE: usize = 12;

/// AES-256-GCM with one random key per data subject
///
/// Ciphertext layout before base64: `nonce (12 bytes) || ciphertext + tag`.
#[derive(Debug, Default, Clone, Copy)]
pub struct AesGcmEncryption;

impl AesGcmEncryption {
    pub fn new() -> Self {
        Self
    }

    fn check_compatible(&self, encryption: &str) -> Result<(), EncryptionError> {
        if encryption != AES_256_GCM {
            return Err(EncryptionError::IncompatibleDetails {
                expected: AES_256_GCM.to_string(),
                found: encryption.to_string(),
            });
        }
        Ok(())
    }

    fn cipher(&self, details: &CryptographicDetails) -> Result<Aes256Gcm, EncryptionError> {
        self.check_compatible(details.encryption())?;

        let encoded = details
            .key(SECRET_KEY)
            .ok_or(EncryptionError::MissingKey(SECRET_KEY))?;
        let key = BASE64
            .decode(encoded)
            .map_err(|e| EncryptionError::MalformedKey(e.to_string()))?;
        if key.len() != KEY_SIZE {
            return Err(EncryptionError::MalformedKey(format!(
                "expected {} bytes, got {}",
                KEY_SIZE,
                key.len()
            )));
        }

        Aes256Gcm::new_from_slice(&key).map_err(|e| EncryptionError::MalformedKey(e.to_string()))
    }
}

impl PersonalDataEncryption for AesGcmEncryption {
    fn name(&self) -> &'static str {
        AES_256_GCM
    }

    fn generate_cryptographic_details(&self) -> Result<CryptographicDetails, EncryptionError> {
        let mut key = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut key);

        let mut keys = BTreeMap::new();
        keys.insert(SECRET_KEY.to_string(), BASE64.encode(key));

        Ok(CryptographicDetails::new(AES_256_GCM, keys))
    }

    fn encrypt(
        &self,
        data: &PersonalData,
        details: &CryptographicDetails,
    ) -> Result<EncryptedPersonalData, EncryptionError> {
        let cipher = self.cipher(details)?;

        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), data.as_bytes())
            .map_err(|_| EncryptionError::EncryptionFailed)?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);

        Ok(EncryptedPersonalData::new(AES_256_GCM, BASE64.encode(sealed)))
    }

    fn decrypt(
        &self,
        data: &EncryptedPersonalData,
        details: &CryptographicDetails,
    ) -> Result<PersonalData, EncryptionError> {
        self.check_compatible(&data.encryption)?;
        let cipher = self.cipher(details)?;

        let sealed = BASE64
            .decode(&data.ciphertext)
            .map_err(|e| EncryptionError::MalformedCiphertext(e.to_string()))?;
        if sealed.len() < NONCE_SIZE {
            return Err(EncryptionError::MalformedCiphertext(format!(
                "{} bytes is shorter than the nonce",
                sealed.len()
            )));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);

        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| EncryptionError::DecryptionFailed)?;

        String::from_utf8(plaintext)
            .map(PersonalData::new)
            .map_err(|_| EncryptionError::NotUtf8)
    }
}

// ============================================================================
// Tests
// ============================================================================
