//! MFA persistence contract.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::EncryptedSecret;
use crate::error::{Result, WardkeyError};

/// MFA status for a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MfaStatus {
    /// MFA not configured.
    Disabled,
    /// Setup started but not yet verified.
    Pending,
    /// Fully enabled and verified.
    Enabled,
}

/// A user's stored MFA configuration.
///
/// Invariant: `enabled` is never true while `verified_at` is `None`. The only
/// code path that sets `enabled` is [`MfaStore::mark_verified`], which sets
/// both together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MfaRecord {
    /// TOTP secret, sealed under the master key.
    pub secret: EncryptedSecret,
    /// False until the user's first successful TOTP verification.
    pub enabled: bool,
    /// Salted hashes of unused backup codes. Entries are removed as codes
    /// are consumed.
    pub backup_codes: Vec<String>,
    /// When the first successful TOTP verification enabled MFA.
    pub verified_at: Option<DateTime<Utc>>,
}

impl MfaRecord {
    /// Create a pending (not yet verified) record.
    pub fn pending(secret: EncryptedSecret, backup_codes: Vec<String>) -> Self {
        Self {
            secret,
            enabled: false,
            backup_codes,
            verified_at: None,
        }
    }

    /// The lifecycle state this record represents.
    pub fn status(&self) -> MfaStatus {
        if self.enabled {
            MfaStatus::Enabled
        } else {
            MfaStatus::Pending
        }
    }
}

/// Trait for storing MFA configuration records.
///
/// Implement this for your database layer.
///
/// # Consumption contract
///
/// [`consume_backup_code`](Self::consume_backup_code) must be a *conditional*
/// remove: delete the given hash only if it is still present, atomically, and
/// report whether the delete happened. On document stores this is an atomic
/// array-pull; on SQL it is a `DELETE ... WHERE hash = ?` checked for
/// affected rows. A read-then-write pair is not acceptable — two concurrent
/// recovery logins must never both consume the same code.
///
/// # Example
///
/// ```rust,ignore
/// use wardkey::mfa::MfaStore;
/// use async_trait::async_trait;
///
/// struct DbMfaStore {
///     db: DatabaseConnection,
/// }
///
/// #[async_trait]
/// impl MfaStore for DbMfaStore {
///     async fn find(&self, user_id: &str) -> Result<Option<MfaRecord>> {
///         // Query your database
///         Ok(self.db.load_mfa_record(user_id).await?)
///     }
///
///     // ... implement other methods
/// }
/// ```
#[async_trait]
pub trait MfaStore: Send + Sync {
    /// Get a user's MFA record (None if MFA was never set up).
    async fn find(&self, user_id: &str) -> Result<Option<MfaRecord>>;

    /// Write a user's MFA record, replacing any existing one.
    async fn put(&self, user_id: &str, record: MfaRecord) -> Result<()>;

    /// Mark the record verified: sets `enabled` and `verified_at` together.
    ///
    /// Errors with `NotFound` if the user has no record.
    async fn mark_verified(&self, user_id: &str, at: DateTime<Utc>) -> Result<()>;

    /// Remove the user's MFA record entirely (disable).
    ///
    /// Idempotent: clearing an absent record is not an error.
    async fn clear(&self, user_id: &str) -> Result<()>;

    /// Conditionally remove a backup-code hash if it is still present.
    ///
    /// Returns whether this call removed it. See the trait-level
    /// consumption contract.
    async fn consume_backup_code(&self, user_id: &str, code_hash: &str) -> Result<bool>;

    /// Get the user's MFA lifecycle status.
    async fn status(&self, user_id: &str) -> Result<MfaStatus> {
        Ok(self
            .find(user_id)
            .await?
            .map(|r| r.status())
            .unwrap_or(MfaStatus::Disabled))
    }

    /// How many unused backup codes remain.
    async fn backup_codes_remaining(&self, user_id: &str) -> Result<usize> {
        Ok(self
            .find(user_id)
            .await?
            .map(|r| r.backup_codes.len())
            .unwrap_or(0))
    }
}

/// In-memory store for tests and development.
///
/// `consume_backup_code` removes under the write lock, satisfying the
/// at-most-once contract within a single process.
#[derive(Clone, Default)]
pub struct InMemoryMfaStore {
    records: Arc<RwLock<HashMap<String, MfaRecord>>>,
}

impl InMemoryMfaStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, MfaRecord>>> {
        self.records
            .read()
            .map_err(|_| WardkeyError::internal("MFA store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, MfaRecord>>> {
        self.records
            .write()
            .map_err(|_| WardkeyError::internal("MFA store lock poisoned"))
    }
}

#[async_trait]
impl MfaStore for InMemoryMfaStore {
    async fn find(&self, user_id: &str) -> Result<Option<MfaRecord>> {
        Ok(self.read()?.get(user_id).cloned())
    }

    async fn put(&self, user_id: &str, record: MfaRecord) -> Result<()> {
        self.write()?.insert(user_id.to_string(), record);
        Ok(())
    }

    async fn mark_verified(&self, user_id: &str, at: DateTime<Utc>) -> Result<()> {
        let mut records = self.write()?;
        let record = records
            .get_mut(user_id)
            .ok_or_else(|| WardkeyError::not_found("no MFA configuration for user"))?;
        record.enabled = true;
        record.verified_at = Some(at);
        Ok(())
    }

    async fn clear(&self, user_id: &str) -> Result<()> {
        self.write()?.remove(user_id);
        Ok(())
    }

    async fn consume_backup_code(&self, user_id: &str, code_hash: &str) -> Result<bool> {
        let mut records = self.write()?;
        let Some(record) = records.get_mut(user_id) else {
            return Ok(false);
        };
        let before = record.backup_codes.len();
        record.backup_codes.retain(|h| h != code_hash);
        Ok(record.backup_codes.len() < before)
    }
}
