/*!
Reversible encryption and one-way hashing for sensitive fields.

Encrypted values use a self-describing envelope: the base64 encoding of a JSON
object whose first key is `iv`. Because the object always starts with `{"iv":`,
every envelope starts with [`ENCRYPTED_MARKER`], which is how the restorer tells
ciphertext from plaintext without a stored flag.
*/

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{Result, SnapshotError};

/// Leading signature of every encryption envelope (`base64("{\"iv\":")`)
pub const ENCRYPTED_MARKER: &str = "eyJpdiI6";

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// Whether a stored value carries the encryption envelope signature
pub fn is_encrypted(value: &str) -> bool {
    value.starts_with(ENCRYPTED_MARKER)
}

/// Reversible string encryption
pub trait Encrypter {
    fn encrypt(&self, plaintext: &str) -> Result<String>;

    /// Fails with [`SnapshotError::Decryption`] on tampered or foreign input
    fn decrypt(&self, envelope: &str) -> Result<String>;
}

/// One-way password hashing
pub trait PasswordHasher {
    fn hash(&self, password: &str) -> String;
}

/// A 256-bit application key
#[derive(Clone)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl EncryptionKey {
    /// Parse an application key
    ///
    /// `base64:<data>` must decode to exactly 32 bytes. Anything else is treated
    /// as a passphrase and stretched to 32 bytes with SHA-256.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(SnapshotError::validation("application key cannot be empty"));
        }

        if let Some(encoded) = raw.strip_prefix("base64:") {
            let bytes = BASE64
                .decode(encoded)
                .map_err(|e| SnapshotError::validation(format!("invalid base64 key: {e}")))?;
            let key: [u8; KEY_LEN] = bytes.try_into().map_err(|bytes: Vec<u8>| {
                SnapshotError::validation(format!(
                    "application key must be {KEY_LEN} bytes, got {}",
                    bytes.len()
                ))
            })?;
            return Ok(Self(key));
        }

        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&Sha256::digest(raw.as_bytes()));
        Ok(Self(key))
    }

    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    iv: String,
    value: String,
}

/// AES-256-GCM encrypter producing marked envelopes
#[derive(Clone)]
pub struct AesGcmEncrypter {
    cipher: Aes256Gcm,
}

impl AesGcmEncrypter {
    pub fn new(key: &EncryptionKey) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key.0)),
        }
    }
}

impl Encrypter for AesGcmEncrypter {
    fn encrypt(&self, plaintext: &str) -> Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| SnapshotError::Encryption(e.to_string()))?;

        let envelope = Envelope {
            iv: BASE64.encode(nonce),
            value: BASE64.encode(ciphertext),
        };
        Ok(BASE64.encode(serde_json::to_vec(&envelope)?))
    }

    fn decrypt(&self, envelope: &str) -> Result<String> {
        let raw = BASE64
            .decode(envelope)
            .map_err(|e| SnapshotError::Decryption(format!("envelope is not base64: {e}")))?;
        let envelope: Envelope = serde_json::from_slice(&raw)
            .map_err(|e| SnapshotError::Decryption(format!("malformed envelope: {e}")))?;

        let iv = BASE64
            .decode(&envelope.iv)
            .map_err(|e| SnapshotError::Decryption(format!("invalid iv: {e}")))?;
        if iv.len() != NONCE_LEN {
            return Err(SnapshotError::Decryption(format!(
                "iv must be {NONCE_LEN} bytes, got {}",
                iv.len()
            )));
        }
        let ciphertext = BASE64
            .decode(&envelope.value)
            .map_err(|e| SnapshotError::Decryption(format!("invalid payload: {e}")))?;

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&iv), ciphertext.as_ref())
            .map_err(|_| SnapshotError::Decryption("authentication failed".to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|e| SnapshotError::Decryption(format!("plaintext is not UTF-8: {e}")))
    }
}

/// Encrypter for runs whose entities carry no sensitive field
///
/// Every call fails, so a run that does reach a secret stops instead of
/// writing it unprotected.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeylessEncrypter;

impl Encrypter for KeylessEncrypter {
    fn encrypt(&self, _plaintext: &str) -> Result<String> {
        Err(SnapshotError::Encryption(
            "no application key configured".to_string(),
        ))
    }

    fn decrypt(&self, _envelope: &str) -> Result<String> {
        Err(SnapshotError::Decryption(
            "no application key configured".to_string(),
        ))
    }
}

/// Deterministic SHA-256 password hasher, output `sha256$<hex>`
#[derive(Debug, Clone, Default)]
pub struct Sha256PasswordHasher;

impl PasswordHasher for Sha256PasswordHasher {
    fn hash(&self, password: &str) -> String {
        format!("sha256${:x}", Sha256::digest(password.as_bytes()))
    }
}
