/*!
Sensitive-field protection applied on the way out of the writer.
*/

use serde_json::Value;
use tracing::debug;

use crate::catalog::EntityDef;
use crate::crypto::Encrypter;
use crate::{Record, Result};

/// Encrypts an entity's sensitive fields before records are encoded
///
/// Absent, null and empty values are left untouched. Live values are always
/// plaintext, so every other string is encrypted, including one that happens
/// to start with the envelope marker.
pub struct SensitiveFieldProtector<'a> {
    encrypter: &'a dyn Encrypter,
}

impl<'a> SensitiveFieldProtector<'a> {
    pub fn new(encrypter: &'a dyn Encrypter) -> Self {
        Self { encrypter }
    }

    /// Protect every record of `entity` in place, returning how many fields were encrypted
    pub fn protect_all(&self, entity: &EntityDef, records: &mut [Record]) -> Result<usize> {
        if entity.sensitive.is_empty() {
            return Ok(0);
        }

        let mut encrypted = 0;
        for record in records.iter_mut() {
            encrypted += self.protect(entity, record)?;
        }
        debug!(entity = entity.name, encrypted, "protected sensitive fields");
        Ok(encrypted)
    }

    /// Protect one record in place
    pub fn protect(&self, entity: &EntityDef, record: &mut Record) -> Result<usize> {
        let mut encrypted = 0;
        for field in entity.sensitive {
            let Some(plaintext) = record.get_str(field.name) else {
                continue;
            };
            if plaintext.is_empty() {
                continue;
            }
            let envelope = self.encrypter.encrypt(plaintext)?;
            record.set(field.name, Value::String(envelope));
            encrypted += 1;
        }
        Ok(encrypted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::EntityCatalog;
    use crate::crypto::{is_encrypted, AesGcmEncrypter, EncryptionKey, ENCRYPTED_MARKER};

    fn encrypter() -> AesGcmEncrypter {
        AesGcmEncrypter::new(&EncryptionKey::parse("protector tests").unwrap())
    }

    #[test]
    fn test_encrypts_credential_and_token() {
        let enc = encrypter();
        let protector = SensitiveFieldProtector::new(&enc);
        let catalog = EntityCatalog::standard();
        let users = catalog.require("users").unwrap();

        let mut records = vec![Record::new()
            .with("id", 1)
            .with("email", "ana@example.com")
            .with("password", "secret123")
            .with("remember_token", "tok-abc")];

        assert_eq!(protector.protect_all(users, &mut records).unwrap(), 2);

        let password = records[0].get_str("password").unwrap();
        let token = records[0].get_str("remember_token").unwrap();
        assert!(is_encrypted(password));
        assert!(is_encrypted(token));
        assert_eq!(enc.decrypt(password).unwrap(), "secret123");
        assert_eq!(records[0].get_str("email"), Some("ana@example.com"));
    }

    #[test]
    fn test_marker_prefixed_plaintext_is_still_encrypted() {
        let enc = encrypter();
        let protector = SensitiveFieldProtector::new(&enc);
        let catalog = EntityCatalog::standard();
        let users = catalog.require("users").unwrap();

        let lookalike = format!("{ENCRYPTED_MARKER}hunter2");
        let mut record = Record::new()
            .with("id", 1)
            .with("password", lookalike.as_str())
            .with("remember_token", lookalike.as_str());

        assert_eq!(protector.protect(users, &mut record).unwrap(), 2);
        for field in ["password", "remember_token"] {
            let stored = record.get_str(field).unwrap();
            assert_ne!(stored, lookalike);
            assert_eq!(enc.decrypt(stored).unwrap(), lookalike);
        }
    }

    #[test]
    fn test_leaves_null_empty_and_absent_alone() {
        let enc = encrypter();
        let protector = SensitiveFieldProtector::new(&enc);
        let catalog = EntityCatalog::standard();
        let users = catalog.require("users").unwrap();

        let mut record = Record::new()
            .with("id", 1)
            .with("password", "")
            .with("remember_token", Value::Null);

        assert_eq!(protector.protect(users, &mut record).unwrap(), 0);
        assert_eq!(record.get_str("password"), Some(""));
        assert_eq!(record.get("remember_token"), Some(&Value::Null));

        let mut bare = Record::new().with("id", 2);
        assert_eq!(protector.protect(users, &mut bare).unwrap(), 0);
        assert!(!bare.contains("password"));
    }

    #[test]
    fn test_entities_without_secrets_are_untouched() {
        let enc = encrypter();
        let protector = SensitiveFieldProtector::new(&enc);
        let catalog = EntityCatalog::standard();
        let cities = catalog.require("cities").unwrap();

        let mut records = vec![Record::new().with("id", 1).with("password", "not a secret here")];
        assert_eq!(protector.protect_all(cities, &mut records).unwrap(), 0);
        assert_eq!(records[0].get_str("password"), Some("not a secret here"));
    }
}
