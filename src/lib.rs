//! Wardkey - MFA credential management for healthcare platforms
//!
//! Wardkey provides the multi-factor authentication subsystem for hospital
//! management applications: TOTP enrollment with QR provisioning, one-time
//! backup recovery codes, encrypted-at-rest secret storage, and the per-user
//! MFA lifecycle (pending until first verification, active, disabled).
//!
//! # Features
//!
//! - **TOTP**: secret generation, otpauth provisioning URIs, and QR data
//!   URIs via `totp-rs`, with a ±1 step clock-drift window
//! - **Backup codes**: cryptographically random one-time codes, stored as
//!   salted bcrypt hashes, consumed at most once
//! - **At-rest encryption**: AES-256-GCM under a process-wide master key,
//!   with a rekey primitive for key rotation
//! - **Pluggable storage**: bring your own database behind [`mfa::MfaStore`]
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use wardkey::crypto::SecretCipher;
//! use wardkey::mfa::{CredentialManager, InMemoryMfaStore, TotpConfig};
//!
//! #[tokio::main]
//! async fn main() -> wardkey::Result<()> {
//!     // Initialize logging
//!     wardkey::init_tracing();
//!
//!     // Master key comes from WARDKEY_MASTER_KEY
//!     let cipher = SecretCipher::from_env()?;
//!
//!     let manager = CredentialManager::new(InMemoryMfaStore::new(), cipher)
//!         .with_totp_config(TotpConfig::new("Mercy General"));
//!
//!     let setup = manager.setup("user-42", "nurse@example.com").await?;
//!     println!("scan: {}", setup.qr_code_data_url);
//!     Ok(())
//! }
//! ```

mod config;
pub mod crypto;
mod error;
pub mod mfa;

// Re-exports for public API
pub use config::{Config, ConfigBuilder, LoggingConfig};
pub use crypto::{EncryptedSecret, MasterKey, SecretCipher};
pub use error::{Result, WardkeyError};
pub use mfa::{CredentialManager, MfaSetup, MfaStatus, MfaStore};

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging with sensible defaults
///
/// This should be called early in your application, typically in main().
///
/// # Environment Variables
///
/// - `RUST_LOG`: Set log level (e.g., "info", "debug", "wardkey=debug")
/// - `WARDKEY_LOG_JSON`: Set to "true" for JSON formatted logs
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json_logs = std::env::var("WARDKEY_LOG_JSON")
        .map(|v| v.parse::<bool>().unwrap_or(false))
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Initialize tracing with a custom configuration
pub fn init_tracing_with_config(config: &Config) {
    let env_filter = EnvFilter::new(&config.logging.level);

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
