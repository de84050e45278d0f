//! Multi-factor authentication credential management.
//!
//! TOTP enrollment with QR provisioning, backup recovery codes, and the
//! per-user MFA lifecycle. Secrets are sealed with [`crate::crypto`] before
//! they reach storage; backup codes are stored only as salted hashes.
//!
//! # Example
//!
//! ```rust,ignore
//! use wardkey::crypto::SecretCipher;
//! use wardkey::mfa::{CredentialManager, InMemoryMfaStore, TotpConfig};
//!
//! let manager = CredentialManager::new(InMemoryMfaStore::new(), SecretCipher::from_env()?)
//!     .with_totp_config(TotpConfig::new("Mercy General"));
//!
//! // Enroll
//! let setup = manager.setup("user-42", "nurse@example.com").await?;
//! // show setup.qr_code_data_url + setup.backup_codes exactly once
//!
//! // First verification activates MFA
//! manager.confirm("user-42", "492031").await?;
//!
//! // Login-time checks
//! manager.verify_totp("user-42", "115590").await?;
//! manager.verify_backup_code("user-42", "A7PQ2M1X").await?;
//! ```

mod backup;
mod manager;
mod storage;
mod totp;

pub use backup::{BackupCodeGenerator, BackupCodeHasher, BackupCodes};
pub use manager::{CredentialManager, MfaSetup};
pub use storage::{InMemoryMfaStore, MfaRecord, MfaStatus, MfaStore};
pub use totp::{TotpConfig, TotpManager, TotpSetup};
