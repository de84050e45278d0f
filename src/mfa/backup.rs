//! Backup recovery codes for when the authenticator device is unavailable.
//!
//! Plaintext codes exist exactly once, at generation time. Storage only ever
//! sees salted bcrypt hashes, and a stored hash is consumed on first
//! successful use (see [`super::storage::MfaStore::consume_backup_code`]).

use std::collections::HashSet;

use crate::error::{Result, WardkeyError};

/// bcrypt work factor for backup codes. Tuned to keep brute force expensive
/// without adding more than ~100ms to a recovery login.
const DEFAULT_WORK_FACTOR: u32 = 10;

/// A freshly generated set of backup codes.
#[derive(Clone, Debug)]
pub struct BackupCodes {
    /// Plaintext codes. Hash these before storage; never display them again.
    pub codes: Vec<String>,
}

impl BackupCodes {
    /// Format codes for the one-time display to the user (grouped for
    /// readability).
    pub fn display_codes(&self) -> Vec<String> {
        self.codes
            .iter()
            .map(|c| {
                if c.len() >= 8 {
                    format!("{}-{}", &c[..4], &c[4..])
                } else {
                    c.clone()
                }
            })
            .collect()
    }
}

/// Generates cryptographically secure backup codes.
#[derive(Clone, Debug)]
pub struct BackupCodeGenerator {
    /// Number of codes to generate (default: 10).
    pub count: usize,
    /// Length of each code (default: 8).
    pub length: usize,
}

impl Default for BackupCodeGenerator {
    fn default() -> Self {
        Self {
            count: 10,
            length: 8,
        }
    }
}

impl BackupCodeGenerator {
    /// Create a new backup code generator with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of codes to generate.
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    /// Set the length of each code.
    pub fn with_length(mut self, length: usize) -> Self {
        self.length = length;
        self
    }

    /// Generate a new set of backup codes.
    ///
    /// Each code is drawn from the OS random source over `A-Z0-9` (an
    /// 8-character code carries ~41 bits of entropy). Codes are guaranteed
    /// unique within the batch.
    pub fn generate(&self) -> BackupCodes {
        use rand::Rng;

        const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

        let mut rng = rand::rngs::OsRng;
        let mut seen = HashSet::with_capacity(self.count);
        let mut codes = Vec::with_capacity(self.count);
        while codes.len() < self.count {
            let code: String = (0..self.length)
                .map(|_| {
                    let idx = rng.gen_range(0..CHARSET.len());
                    CHARSET[idx] as char
                })
                .collect();
            if seen.insert(code.clone()) {
                codes.push(code);
            }
        }

        BackupCodes { codes }
    }
}

/// Salted one-way hashing for backup codes.
///
/// Every call salts independently, so hashing the same code twice yields two
/// different hashes that both verify.
#[derive(Clone, Debug)]
pub struct BackupCodeHasher {
    cost: u32,
}

impl Default for BackupCodeHasher {
    fn default() -> Self {
        Self {
            cost: DEFAULT_WORK_FACTOR,
        }
    }
}

impl BackupCodeHasher {
    /// Create a hasher with a custom bcrypt cost.
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    /// Minimum-cost hasher for tests (NOT for production).
    pub fn fast() -> Self {
        Self { cost: 4 }
    }

    /// Hash a backup code with a fresh random salt.
    pub fn hash(&self, code: &str) -> Result<String> {
        bcrypt::hash(normalize(code), self.cost)
            .map_err(|e| WardkeyError::internal(format!("backup code hashing failed: {}", e)))
    }

    /// Verify a backup code against a stored hash.
    ///
    /// Constant-effort: bcrypt re-derives the hash with the stored salt and
    /// compares. A malformed stored hash returns `false`, never an error.
    pub fn verify(&self, code: &str, stored_hash: &str) -> bool {
        bcrypt::verify(normalize(code), stored_hash).unwrap_or(false)
    }

    /// Find which stored hash (if any) a submitted code matches.
    ///
    /// Returns the index so the caller can consume that entry.
    pub fn find_match(&self, code: &str, stored_hashes: &[String]) -> Option<usize> {
        let code = normalize(code);
        stored_hashes
            .iter()
            .position(|hash| bcrypt::verify(&code, hash).unwrap_or(false))
    }
}

/// Strip separators and uppercase, so `abcd-1234` matches `ABCD1234`.
fn normalize(code: &str) -> String {
    code.replace(['-', ' '], "").to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_codes() {
        let codes = BackupCodeGenerator::new().generate();

        assert_eq!(codes.codes.len(), 10);
        assert!(codes.codes.iter().all(|c| c.len() == 8));
        assert!(codes
            .codes
            .iter()
            .all(|c| c.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())));
    }

    #[test]
    fn test_no_duplicates_in_batch() {
        let codes = BackupCodeGenerator::new().with_count(20).generate();

        let unique: HashSet<_> = codes.codes.iter().collect();
        assert_eq!(unique.len(), 20);
    }

    #[test]
    fn test_display_codes() {
        let codes = BackupCodes {
            codes: vec!["ABCD1234".to_string()],
        };

        assert_eq!(codes.display_codes(), vec!["ABCD-1234"]);
    }

    #[test]
    fn test_custom_settings() {
        let codes = BackupCodeGenerator::new()
            .with_count(5)
            .with_length(10)
            .generate();

        assert_eq!(codes.codes.len(), 5);
        assert!(codes.codes.iter().all(|c| c.len() == 10));
    }

    #[test]
    fn test_hash_is_salted() {
        let hasher = BackupCodeHasher::fast();
        let hash1 = hasher.hash("ABCD1234").unwrap();
        let hash2 = hasher.hash("ABCD1234").unwrap();

        // Fresh salt per call: same code, different hashes, both verify.
        assert_ne!(hash1, hash2);
        assert!(hasher.verify("ABCD1234", &hash1));
        assert!(hasher.verify("ABCD1234", &hash2));
    }

    #[test]
    fn test_wrong_code_rejected() {
        let hasher = BackupCodeHasher::fast();
        let hash = hasher.hash("ABCD1234").unwrap();

        assert!(!hasher.verify("WXYZ9876", &hash));
    }

    #[test]
    fn test_malformed_hash_verifies_false() {
        let hasher = BackupCodeHasher::fast();

        assert!(!hasher.verify("ABCD1234", "not-a-bcrypt-hash"));
        assert!(!hasher.verify("ABCD1234", ""));
    }

    #[test]
    fn test_verify_normalizes_input() {
        let hasher = BackupCodeHasher::fast();
        let hash = hasher.hash("ABCD1234").unwrap();

        assert!(hasher.verify("abcd-1234", &hash));
        assert!(hasher.verify("ABCD 1234", &hash));
    }

    #[test]
    fn test_find_match() {
        let hasher = BackupCodeHasher::fast();
        let codes = BackupCodeGenerator::new().with_count(3).generate();
        let hashes: Vec<String> = codes
            .codes
            .iter()
            .map(|c| hasher.hash(c).unwrap())
            .collect();

        assert_eq!(hasher.find_match(&codes.codes[1], &hashes), Some(1));
        assert_eq!(hasher.find_match("NOPE0000", &hashes), None);
    }
}
