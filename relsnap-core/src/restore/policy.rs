/*!
Entity-specific restore policy: transient entities and sensitive fields.
*/

use serde_json::Value;
use tracing::warn;

use crate::catalog::{EntityDef, SecretKind};
use crate::crypto::{is_encrypted, Encrypter, PasswordHasher};
use crate::Record;

/// Password hashed into the placeholder credential of unrecoverable accounts
pub const RESET_REQUIRED_PASSWORD: &str = "password_reset_required";

/// Why an entity was not restored
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Cache entries, sessions and reset tokens are never replayed
    Transient,
    /// The snapshot has no file for the entity
    MissingFile { path: String },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Transient => f.write_str("transient entity"),
            SkipReason::MissingFile { path } => write!(f, "no snapshot file at {path}"),
        }
    }
}

/// Counts of the fallbacks applied while recovering secrets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SecretRecovery {
    pub decrypted: usize,
    pub placeholders: usize,
    pub cleared: usize,
}

/// Restore-time rules applied after schema reconciliation
pub struct RestorePolicy<'a> {
    encrypter: &'a dyn Encrypter,
    hasher: &'a dyn PasswordHasher,
}

impl<'a> RestorePolicy<'a> {
    pub fn new(encrypter: &'a dyn Encrypter, hasher: &'a dyn PasswordHasher) -> Self {
        Self { encrypter, hasher }
    }

    /// Whether the entity is skipped outright, before any file is read
    pub fn skip_reason(&self, def: &EntityDef) -> Option<SkipReason> {
        def.transient.then_some(SkipReason::Transient)
    }

    /// Credential stored for accounts whose password cannot be recovered
    pub fn placeholder_credential(&self) -> String {
        self.hasher.hash(RESET_REQUIRED_PASSWORD)
    }

    /// Recover the entity's sensitive fields in place
    pub fn recover_secrets(&self, def: &EntityDef, records: &mut [Record]) -> SecretRecovery {
        let mut recovery = SecretRecovery::default();
        if def.sensitive.is_empty() {
            return recovery;
        }

        let placeholder = self.placeholder_credential();
        for record in records.iter_mut() {
            for field in def.sensitive {
                if !record.contains(field.name) {
                    continue;
                }
                let current = record.get_str(field.name).unwrap_or_default().to_string();

                match field.kind {
                    SecretKind::Credential if current.is_empty() => {
                        record.set(field.name, placeholder.clone());
                        recovery.placeholders += 1;
                    }
                    SecretKind::Credential if is_encrypted(&current) => {
                        match self.encrypter.decrypt(&current) {
                            Ok(plaintext) => {
                                record.set(field.name, plaintext);
                                recovery.decrypted += 1;
                            }
                            Err(e) => {
                                warn!(
                                    entity = def.name,
                                    field = field.name,
                                    id = %record_id(record),
                                    error = %e,
                                    "could not decrypt credential, substituting reset placeholder"
                                );
                                record.set(field.name, placeholder.clone());
                                recovery.placeholders += 1;
                            }
                        }
                    }
                    SecretKind::Token if is_encrypted(&current) => {
                        match self.encrypter.decrypt(&current) {
                            Ok(plaintext) => {
                                record.set(field.name, plaintext);
                                recovery.decrypted += 1;
                            }
                            Err(e) => {
                                warn!(
                                    entity = def.name,
                                    field = field.name,
                                    id = %record_id(record),
                                    error = %e,
                                    "could not decrypt token, clearing it"
                                );
                                record.set(field.name, Value::Null);
                                recovery.cleared += 1;
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
        recovery
    }
}

fn record_id(record: &Record) -> String {
    record
        .get("id")
        .map(|id| id.to_string())
        .unwrap_or_else(|| "?".to_string())
}
