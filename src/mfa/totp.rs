//! TOTP (Time-based One-Time Password) enrollment and verification.

use totp_rs::{Algorithm, Secret, TOTP};

use crate::error::{Result, WardkeyError};

/// Configuration for TOTP generation.
#[derive(Clone)]
pub struct TotpConfig {
    /// Issuer name shown in authenticator apps (e.g., "Mercy General").
    pub issuer: String,
    /// Number of digits in the code (default: 6).
    pub digits: usize,
    /// Time step in seconds (default: 30).
    pub step: u64,
    /// Algorithm (default: SHA1 for authenticator-app compatibility).
    pub algorithm: Algorithm,
}

impl Default for TotpConfig {
    fn default() -> Self {
        Self {
            issuer: "Wardkey".to_string(),
            digits: 6,
            step: 30,
            algorithm: Algorithm::SHA1,
        }
    }
}

impl TotpConfig {
    /// Create a new TOTP config with the given issuer name.
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            ..Default::default()
        }
    }

    /// Set the number of digits.
    pub fn digits(mut self, digits: usize) -> Self {
        self.digits = digits;
        self
    }

    /// Set the time step in seconds.
    pub fn step(mut self, step: u64) -> Self {
        self.step = step;
        self
    }
}

/// Data returned when enrolling a user in TOTP.
///
/// All three fields contain material that is shown to the user exactly once,
/// at enrollment time. Only the encrypted secret may be persisted.
pub struct TotpSetup {
    /// Base32-encoded secret (`A-Z2-7`).
    pub secret: String,
    /// Provisioning URI (otpauth://...) embedding secret, label, and issuer.
    pub uri: String,
    /// QR code as a `data:image/png;base64,...` URI for direct embedding.
    pub qr_code_data_url: String,
}

/// Manages TOTP operations.
#[derive(Clone)]
pub struct TotpManager {
    config: TotpConfig,
}

impl TotpManager {
    /// Create a new TOTP manager with the given configuration.
    pub fn new(config: TotpConfig) -> Self {
        Self { config }
    }

    /// Generate a new TOTP enrollment for a user.
    ///
    /// The secret carries 160 bits of entropy from the OS random source.
    /// A failure here is fatal to the enrollment attempt; the error never
    /// contains the secret.
    pub fn generate_setup(&self, account_label: &str) -> Result<TotpSetup> {
        let secret = Secret::generate_secret();
        let secret_base32 = secret.to_encoded().to_string();

        let totp = self.build_totp(&secret_base32, account_label)?;
        let uri = totp.get_url();

        let qr_code = totp.get_qr_base64().map_err(|e| {
            tracing::warn!(error = %e, "QR encoding failed during MFA enrollment");
            WardkeyError::generation("provisioning artifact generation failed")
        })?;

        Ok(TotpSetup {
            secret: secret_base32,
            uri,
            qr_code_data_url: format!("data:image/png;base64,{}", qr_code),
        })
    }

    /// Verify a TOTP code against a stored secret.
    ///
    /// Accepts codes within ±1 time step (30 seconds by default) to absorb
    /// clock drift between server and authenticator device. Anything that is
    /// not exactly `digits` ASCII digits after stripping spaces and dashes is
    /// rejected before any cryptographic work. Internal failures also return
    /// `false`: callers cannot distinguish a wrong code from a broken clock
    /// or a corrupt secret.
    pub fn verify(&self, secret: &str, code: &str, account_label: &str) -> bool {
        let code = match self.normalize(code) {
            Some(c) => c,
            None => return false,
        };

        let totp = match self.build_totp(secret, account_label) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(error = %e, "TOTP verification error (invalid stored secret?)");
                return false;
            }
        };

        match totp.check_current(&code) {
            Ok(valid) => valid,
            Err(e) => {
                tracing::warn!(error = %e, "TOTP verification error (system time issue?)");
                false
            }
        }
    }

    /// Verify against a specific timestamp (useful for testing).
    pub fn verify_at(&self, secret: &str, code: &str, account_label: &str, time: u64) -> bool {
        let code = match self.normalize(code) {
            Some(c) => c,
            None => return false,
        };
        match self.build_totp(secret, account_label) {
            Ok(totp) => totp.check(&code, time),
            Err(_) => false,
        }
    }

    /// Generate the code for the current time step.
    ///
    /// For test fixtures and operator tooling; login flows only ever verify.
    pub fn generate_current(&self, secret: &str, account_label: &str) -> Result<String> {
        let totp = self.build_totp(secret, account_label)?;
        totp.generate_current()
            .map_err(|e| WardkeyError::internal(format!("failed to generate TOTP: {}", e)))
    }

    /// Generate the code for a specific timestamp (useful for testing).
    pub fn generate_at(&self, secret: &str, account_label: &str, time: u64) -> Result<String> {
        Ok(self.build_totp(secret, account_label)?.generate(time))
    }

    /// Strip user-entered separators and require exactly `digits` ASCII digits.
    fn normalize(&self, code: &str) -> Option<String> {
        let code = code.replace([' ', '-'], "");
        if code.len() == self.config.digits && code.bytes().all(|b| b.is_ascii_digit()) {
            Some(code)
        } else {
            None
        }
    }

    fn build_totp(&self, secret: &str, account_label: &str) -> Result<TOTP> {
        TOTP::new(
            self.config.algorithm,
            self.config.digits,
            1, // 1 step skew tolerance
            self.config.step,
            Secret::Encoded(secret.to_string())
                .to_bytes()
                .map_err(|e| WardkeyError::generation(format!("invalid TOTP secret: {}", e)))?,
            Some(self.config.issuer.clone()),
            account_label.to_string(),
        )
        .map_err(|e| WardkeyError::generation(format!("failed to create TOTP: {}", e)))
    }
}
