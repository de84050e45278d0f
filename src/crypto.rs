//! At-rest encryption for TOTP secrets.
//!
//! Secrets are sealed with AES-256-GCM under a process-wide master key that
//! is loaded once at startup and never stored alongside the data it protects.
//! Each encryption uses a fresh random nonce, so the same secret never
//! produces the same ciphertext twice.

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use secrecy::{ExposeSecret, SecretBox};
use serde::{Deserialize, Serialize};

use crate::error::{Result, WardkeyError};

/// AES-256-GCM nonce length in bytes.
const NONCE_LEN: usize = 12;

/// The process-wide master encryption key.
///
/// Held behind [`secrecy::SecretBox`] so it is zeroized on drop and redacted
/// from `Debug` output. Load it once at startup and inject it into
/// [`SecretCipher`]; core logic never reads the environment itself.
pub struct MasterKey(SecretBox<[u8; 32]>);

impl MasterKey {
    /// Environment variable holding the base64-encoded 32-byte key.
    pub const ENV_VAR: &'static str = "WARDKEY_MASTER_KEY";

    /// Create a master key from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(SecretBox::new(Box::new(bytes)))
    }

    /// Decode a master key from a base64 string.
    ///
    /// The decoded key must be exactly 32 bytes.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = STANDARD.decode(encoded.trim()).map_err(|_| {
            WardkeyError::configuration("master key is not valid base64")
        })?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|_| {
            WardkeyError::configuration("master key must decode to exactly 32 bytes")
        })?;
        Ok(Self::from_bytes(bytes))
    }

    /// Load the master key from the `WARDKEY_MASTER_KEY` environment variable.
    ///
    /// A missing or malformed key is a [`WardkeyError::Configuration`] error,
    /// raised before any credential material is generated.
    pub fn from_env() -> Result<Self> {
        let encoded = std::env::var(Self::ENV_VAR).map_err(|_| {
            WardkeyError::configuration(format!("{} is not set", Self::ENV_VAR))
        })?;
        Self::from_base64(&encoded)
    }

    /// Generate a fresh random master key.
    ///
    /// Intended for key provisioning tooling and tests; production keys are
    /// supplied via configuration.
    pub fn generate() -> Self {
        use rand::RngCore;

        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self::from_bytes(bytes)
    }

    fn expose(&self) -> &[u8; 32] {
        self.0.expose_secret()
    }
}

/// A TOTP secret sealed for storage.
///
/// Both fields are base64. The nonce is not sensitive; it only has to be
/// unique per encryption under a given key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedSecret {
    pub nonce: String,
    pub ciphertext: String,
}

/// Encrypts and decrypts stored TOTP secrets under the master key.
#[derive(Clone)]
pub struct SecretCipher {
    cipher: Aes256Gcm,
}

impl SecretCipher {
    /// Create a cipher from a master key.
    pub fn new(key: &MasterKey) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.expose())),
        }
    }

    /// Create a cipher from the `WARDKEY_MASTER_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(&MasterKey::from_env()?))
    }

    /// Seal a plaintext secret with a fresh random nonce.
    pub fn encrypt(&self, plaintext: &str) -> Result<EncryptedSecret> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| WardkeyError::internal(format!("secret encryption failed: {}", e)))?;

        Ok(EncryptedSecret {
            nonce: STANDARD.encode(nonce),
            ciphertext: STANDARD.encode(ciphertext),
        })
    }

    /// Open a sealed secret.
    ///
    /// Fails if the record is malformed or was sealed under a different key.
    /// The error carries no plaintext material.
    pub fn decrypt(&self, encrypted: &EncryptedSecret) -> Result<String> {
        let nonce = STANDARD
            .decode(&encrypted.nonce)
            .map_err(|_| WardkeyError::internal("stored secret has a malformed nonce"))?;
        if nonce.len() != NONCE_LEN {
            return Err(WardkeyError::internal("stored secret has a malformed nonce"));
        }
        let ciphertext = STANDARD
            .decode(&encrypted.ciphertext)
            .map_err(|_| WardkeyError::internal("stored secret has malformed ciphertext"))?;

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_ref())
            .map_err(|_| WardkeyError::internal("secret decryption failed"))?;

        String::from_utf8(plaintext)
            .map_err(|_| WardkeyError::internal("decrypted secret is not valid UTF-8"))
    }

    /// Re-seal a secret under a different key.
    ///
    /// Maintenance primitive for master-key rotation: decrypts under this
    /// cipher's key and encrypts under `next`. Rotation itself (walking all
    /// stored records) is an out-of-band operation owned by the caller.
    pub fn rekey(&self, encrypted: &EncryptedSecret, next: &SecretCipher) -> Result<EncryptedSecret> {
        next.encrypt(&self.decrypt(encrypted)?)
    }
}
