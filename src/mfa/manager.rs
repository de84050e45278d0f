//! MFA credential lifecycle orchestration.
//!
//! Drives the per-user state machine over a pluggable [`MfaStore`]:
//!
//! ```text
//! Unconfigured --setup--> PendingVerification --confirm--> Active --disable--> Unconfigured
//! ```
//!
//! Setup while Active is a conflict; the user must disable first. Re-running
//! setup while Pending regenerates the credentials and overwrites the
//! pending record.

use chrono::Utc;
use serde::Serialize;

use crate::crypto::SecretCipher;
use crate::error::{Result, WardkeyError};
use crate::mfa::backup::{BackupCodeGenerator, BackupCodeHasher};
use crate::mfa::storage::{MfaRecord, MfaStatus, MfaStore};
use crate::mfa::totp::{TotpConfig, TotpManager};

/// Everything the user needs to finish enrollment, returned exactly once.
///
/// The caller displays these and must never re-surface them: storage holds
/// only the encrypted secret and the hashed codes. No `Debug` derive, so the
/// plaintext cannot wander into logs by accident.
#[derive(Serialize)]
pub struct MfaSetup {
    /// Base32 TOTP secret for manual entry.
    pub secret: String,
    /// QR provisioning artifact as a `data:image/png;base64,...` URI.
    pub qr_code_data_url: String,
    /// Plaintext backup codes.
    pub backup_codes: Vec<String>,
}

/// Manages the MFA credential lifecycle for users.
///
/// Stateless per call: all user state lives behind the [`MfaStore`]. The
/// cipher is injected so core logic never reads ambient configuration.
///
/// # Example
///
/// ```rust,ignore
/// use wardkey::crypto::SecretCipher;
/// use wardkey::mfa::{CredentialManager, InMemoryMfaStore, TotpConfig};
///
/// let manager = CredentialManager::new(InMemoryMfaStore::new(), SecretCipher::from_env()?)
///     .with_totp_config(TotpConfig::new("Mercy General"));
///
/// let setup = manager.setup("user-42", "nurse@example.com").await?;
/// // show setup.qr_code_data_url and setup.backup_codes to the user, once
/// ```
pub struct CredentialManager<S: MfaStore> {
    store: S,
    cipher: SecretCipher,
    totp: TotpManager,
    generator: BackupCodeGenerator,
    hasher: BackupCodeHasher,
}

impl<S: MfaStore> CredentialManager<S> {
    /// Create a manager with default TOTP, generator, and hasher settings.
    pub fn new(store: S, cipher: SecretCipher) -> Self {
        Self {
            store,
            cipher,
            totp: TotpManager::new(TotpConfig::default()),
            generator: BackupCodeGenerator::default(),
            hasher: BackupCodeHasher::default(),
        }
    }

    /// Set the TOTP configuration (issuer name, digits, step).
    pub fn with_totp_config(mut self, config: TotpConfig) -> Self {
        self.totp = TotpManager::new(config);
        self
    }

    /// Set the backup code generator.
    pub fn with_backup_generator(mut self, generator: BackupCodeGenerator) -> Self {
        self.generator = generator;
        self
    }

    /// Set the backup code hasher.
    pub fn with_hasher(mut self, hasher: BackupCodeHasher) -> Self {
        self.hasher = hasher;
        self
    }

    /// Create a manager from application configuration.
    pub fn from_config(store: S, cipher: SecretCipher, config: &crate::Config) -> Self {
        Self::new(store, cipher)
            .with_totp_config(TotpConfig::new(&config.issuer))
            .with_backup_generator(BackupCodeGenerator::new().with_count(config.backup_code_count))
            .with_hasher(BackupCodeHasher::new(config.hash_cost))
    }

    /// Begin MFA enrollment for a user.
    ///
    /// Generates the secret, provisioning artifact, and backup codes, and
    /// persists a pending record (encrypted secret, hashed codes,
    /// `enabled=false`). Returns the plaintext material exactly once.
    ///
    /// Errors with [`WardkeyError::Conflict`] if MFA is already active —
    /// the user must disable before re-enrolling. A pending enrollment is
    /// overwritten. Generation failures abort with nothing persisted.
    pub async fn setup(&self, user_id: &str, account_label: &str) -> Result<MfaSetup> {
        if self.store.status(user_id).await? == MfaStatus::Enabled {
            return Err(WardkeyError::conflict(
                "two-factor authentication is already enabled",
            ));
        }

        let totp_setup = self.totp.generate_setup(account_label)?;
        let codes = self.generator.generate();
        let hashes = codes
            .codes
            .iter()
            .map(|code| self.hasher.hash(code))
            .collect::<Result<Vec<_>>>()?;
        let sealed = self.cipher.encrypt(&totp_setup.secret)?;

        self.store
            .put(user_id, MfaRecord::pending(sealed, hashes))
            .await?;

        tracing::info!(user_id, "MFA enrollment started, awaiting verification");

        Ok(MfaSetup {
            secret: totp_setup.secret,
            qr_code_data_url: totp_setup.qr_code_data_url,
            backup_codes: codes.codes,
        })
    }

    /// Complete enrollment with the user's first TOTP code.
    ///
    /// On success the record transitions Pending → Active (`enabled=true`,
    /// `verified_at` set). A wrong code returns `Ok(false)` and leaves the
    /// record pending. Errors with `NotFound` if setup was never started and
    /// `Conflict` if MFA is already active.
    pub async fn confirm(&self, user_id: &str, code: &str) -> Result<bool> {
        let record = self
            .store
            .find(user_id)
            .await?
            .ok_or_else(|| WardkeyError::not_found("no MFA enrollment for user"))?;

        if record.enabled {
            return Err(WardkeyError::conflict(
                "two-factor authentication is already enabled",
            ));
        }

        let Some(secret) = self.open_secret(user_id, &record) else {
            return Ok(false);
        };

        if !self.totp.verify(&secret, code, user_id) {
            tracing::debug!(user_id, "MFA enrollment verification failed");
            return Ok(false);
        }

        self.store.mark_verified(user_id, Utc::now()).await?;
        tracing::info!(user_id, "MFA enabled");
        Ok(true)
    }

    /// Verify a login-time TOTP code for a user with active MFA.
    ///
    /// Returns `Ok(false)` for wrong, malformed, or expired codes, for users
    /// without active MFA, and for any internal verification failure — the
    /// outcomes are deliberately indistinguishable. Only storage I/O errors
    /// propagate.
    pub async fn verify_totp(&self, user_id: &str, code: &str) -> Result<bool> {
        let Some(record) = self.store.find(user_id).await? else {
            return Ok(false);
        };
        if !record.enabled {
            return Ok(false);
        }

        let Some(secret) = self.open_secret(user_id, &record) else {
            return Ok(false);
        };

        let valid = self.totp.verify(&secret, code, user_id);
        if !valid {
            tracing::debug!(user_id, "TOTP verification failed");
        }
        Ok(valid)
    }

    /// Verify and consume a backup recovery code.
    ///
    /// A code is accepted only if its hash matches *and* the storage-level
    /// conditional consume succeeds, so concurrent attempts on the same code
    /// produce exactly one winner and a consumed code never verifies twice.
    pub async fn verify_backup_code(&self, user_id: &str, code: &str) -> Result<bool> {
        let Some(record) = self.store.find(user_id).await? else {
            return Ok(false);
        };
        if !record.enabled {
            return Ok(false);
        }

        let Some(index) = self.hasher.find_match(code, &record.backup_codes) else {
            tracing::debug!(user_id, "backup code verification failed");
            return Ok(false);
        };

        let hash = record.backup_codes[index].clone();
        let consumed = self.store.consume_backup_code(user_id, &hash).await?;
        if consumed {
            let remaining = self.store.backup_codes_remaining(user_id).await?;
            tracing::info!(user_id, remaining, "backup code consumed");
        } else {
            // Matched but already claimed by a concurrent attempt.
            tracing::warn!(user_id, "backup code lost conditional consume");
        }
        Ok(consumed)
    }

    /// Disable MFA for a user, clearing the stored configuration.
    ///
    /// The user returns to Unconfigured and may enroll again from scratch.
    pub async fn disable(&self, user_id: &str) -> Result<()> {
        self.store.clear(user_id).await?;
        tracing::info!(user_id, "MFA disabled");
        Ok(())
    }

    /// The user's MFA lifecycle status.
    pub async fn status(&self, user_id: &str) -> Result<MfaStatus> {
        self.store.status(user_id).await
    }

    /// How many unused backup codes the user has left.
    pub async fn backup_codes_remaining(&self, user_id: &str) -> Result<usize> {
        self.store.backup_codes_remaining(user_id).await
    }

    /// Decrypt the stored secret, normalizing failure to `None`.
    ///
    /// A decrypt failure (key rotation gone wrong, corrupt record) must look
    /// like a wrong code to callers; the operator finds out from the log.
    fn open_secret(&self, user_id: &str, record: &MfaRecord) -> Option<String> {
        match self.cipher.decrypt(&record.secret) {
            Ok(secret) => Some(secret),
            Err(e) => {
                tracing::warn!(user_id, error = %e, "stored MFA secret could not be decrypted");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::MasterKey;
    use crate::mfa::storage::InMemoryMfaStore;

    fn manager() -> CredentialManager<InMemoryMfaStore> {
        CredentialManager::new(
            InMemoryMfaStore::new(),
            SecretCipher::new(&MasterKey::generate()),
        )
        .with_totp_config(TotpConfig::new("Mercy General"))
        .with_hasher(BackupCodeHasher::fast())
    }

    /// Compute the current code the way an authenticator app would.
    fn current_code(manager: &CredentialManager<InMemoryMfaStore>, secret: &str, user_id: &str) -> String {
        manager.totp.generate_current(secret, user_id).unwrap()
    }

    #[tokio::test]
    async fn test_setup_creates_pending_record() {
        let manager = manager();
        let setup = manager.setup("u1", "nurse@example.com").await.unwrap();

        assert_eq!(manager.status("u1").await.unwrap(), MfaStatus::Pending);
        assert_eq!(setup.backup_codes.len(), 10);
        assert!(setup.qr_code_data_url.starts_with("data:image/png;base64,"));
        assert_eq!(manager.backup_codes_remaining("u1").await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_secret_not_stored_in_plaintext() {
        let manager = manager();
        let setup = manager.setup("u1", "nurse@example.com").await.unwrap();

        let record = manager.store.find("u1").await.unwrap().unwrap();
        assert!(!record.secret.ciphertext.contains(&setup.secret));
        assert!(!record.backup_codes.contains(&setup.backup_codes[0]));
    }

    #[tokio::test]
    async fn test_confirm_enables_mfa() {
        let manager = manager();
        let setup = manager.setup("u1", "nurse@example.com").await.unwrap();

        // Wrong code first: still pending.
        assert!(!manager.confirm("u1", "000000").await.unwrap());
        assert_eq!(manager.status("u1").await.unwrap(), MfaStatus::Pending);

        let code = current_code(&manager, &setup.secret, "u1");
        assert!(manager.confirm("u1", &code).await.unwrap());
        assert_eq!(manager.status("u1").await.unwrap(), MfaStatus::Enabled);

        let record = manager.store.find("u1").await.unwrap().unwrap();
        assert!(record.verified_at.is_some());
    }

    #[tokio::test]
    async fn test_confirm_without_setup() {
        let manager = manager();
        assert!(matches!(
            manager.confirm("ghost", "123456").await,
            Err(WardkeyError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_setup_conflicts_when_active() {
        let manager = manager();
        let setup = manager.setup("u1", "nurse@example.com").await.unwrap();
        let code = current_code(&manager, &setup.secret, "u1");
        manager.confirm("u1", &code).await.unwrap();

        assert!(matches!(
            manager.setup("u1", "nurse@example.com").await,
            Err(WardkeyError::Conflict(_))
        ));
        assert!(matches!(
            manager.confirm("u1", &code).await,
            Err(WardkeyError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_resetup_while_pending_regenerates() {
        let manager = manager();
        let first = manager.setup("u1", "nurse@example.com").await.unwrap();
        let second = manager.setup("u1", "nurse@example.com").await.unwrap();

        assert_ne!(first.secret, second.secret);

        // Only the latest secret confirms.
        let stale = current_code(&manager, &first.secret, "u1");
        assert!(!manager.confirm("u1", &stale).await.unwrap());
        let code = current_code(&manager, &second.secret, "u1");
        assert!(manager.confirm("u1", &code).await.unwrap());
    }

    #[tokio::test]
    async fn test_verify_totp_requires_active() {
        let manager = manager();
        let setup = manager.setup("u1", "nurse@example.com").await.unwrap();
        let code = current_code(&manager, &setup.secret, "u1");

        // Pending: login-time verification refuses even a valid code.
        assert!(!manager.verify_totp("u1", &code).await.unwrap());
        // Unknown user: same answer.
        assert!(!manager.verify_totp("ghost", &code).await.unwrap());

        manager.confirm("u1", &code).await.unwrap();
        let code = current_code(&manager, &setup.secret, "u1");
        assert!(manager.verify_totp("u1", &code).await.unwrap());
        assert!(!manager.verify_totp("u1", "000000").await.unwrap());
    }

    #[tokio::test]
    async fn test_backup_code_consumed_once() {
        let manager = manager();
        let setup = manager.setup("u1", "nurse@example.com").await.unwrap();
        let code = current_code(&manager, &setup.secret, "u1");
        manager.confirm("u1", &code).await.unwrap();

        let backup = setup.backup_codes[0].clone();
        assert!(manager.verify_backup_code("u1", &backup).await.unwrap());
        assert_eq!(manager.backup_codes_remaining("u1").await.unwrap(), 9);

        // Consumed codes never verify again.
        assert!(!manager.verify_backup_code("u1", &backup).await.unwrap());
        assert_eq!(manager.backup_codes_remaining("u1").await.unwrap(), 9);
    }

    #[tokio::test]
    async fn test_backup_code_requires_active() {
        let manager = manager();
        let setup = manager.setup("u1", "nurse@example.com").await.unwrap();

        assert!(!manager
            .verify_backup_code("u1", &setup.backup_codes[0])
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_disable_returns_to_unconfigured() {
        let manager = manager();
        let setup = manager.setup("u1", "nurse@example.com").await.unwrap();
        let code = current_code(&manager, &setup.secret, "u1");
        manager.confirm("u1", &code).await.unwrap();

        manager.disable("u1").await.unwrap();
        assert_eq!(manager.status("u1").await.unwrap(), MfaStatus::Disabled);

        // Old credentials are gone; a fresh enrollment works.
        assert!(!manager.verify_totp("u1", &code).await.unwrap());
        manager.setup("u1", "nurse@example.com").await.unwrap();
        assert_eq!(manager.status("u1").await.unwrap(), MfaStatus::Pending);
    }

    #[tokio::test]
    async fn test_decrypt_failure_looks_like_wrong_code() {
        let manager = manager();
        let setup = manager.setup("u1", "nurse@example.com").await.unwrap();
        let code = current_code(&manager, &setup.secret, "u1");
        manager.confirm("u1", &code).await.unwrap();

        // Same store, different master key: secrets no longer decrypt.
        let other = CredentialManager::new(
            manager.store.clone(),
            SecretCipher::new(&MasterKey::generate()),
        )
        .with_hasher(BackupCodeHasher::fast());

        let code = current_code(&manager, &setup.secret, "u1");
        assert!(!other.verify_totp("u1", &code).await.unwrap());
    }
}
