use serde::{Deserialize, Serialize};

/// Main configuration for wardkey.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Issuer name shown in authenticator apps.
    #[serde(default = "default_issuer")]
    pub issuer: String,
    /// Number of backup codes issued per enrollment.
    #[serde(default = "default_backup_code_count")]
    pub backup_code_count: usize,
    /// bcrypt work factor for backup code hashes.
    #[serde(default = "default_hash_cost")]
    pub hash_cost: u32,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_json")]
    pub json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            issuer: default_issuer(),
            backup_code_count: default_backup_code_count(),
            hash_cost: default_hash_cost(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: default_json(),
        }
    }
}

fn default_issuer() -> String {
    "Wardkey".to_string()
}

fn default_backup_code_count() -> usize {
    10
}

fn default_hash_cost() -> u32 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_json() -> bool {
    false
}

/// Builder for Config with environment variable support.
///
/// The master encryption key is deliberately not part of `Config`: it is
/// loaded separately via [`crate::crypto::MasterKey::from_env`] and injected
/// where needed, so it never travels through serializable configuration.
#[must_use = "builder does nothing until you call build()"]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.config.issuer = issuer.into();
        self
    }

    pub fn with_backup_code_count(mut self, count: usize) -> Self {
        self.config.backup_code_count = count;
        self
    }

    pub fn with_hash_cost(mut self, cost: u32) -> Self {
        self.config.hash_cost = cost;
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    /// Load settings from environment variables.
    ///
    /// Looks for `WARDKEY_ISSUER`, `WARDKEY_BACKUP_CODE_COUNT`,
    /// `WARDKEY_HASH_COST`, `WARDKEY_LOG_LEVEL`, and `WARDKEY_LOG_JSON`,
    /// falling back to the unprefixed name for each.
    pub fn from_env(mut self) -> Self {
        if let Some(issuer) = get_env_with_prefix("ISSUER") {
            self.config.issuer = issuer;
        }
        if let Some(count) = get_env_with_prefix("BACKUP_CODE_COUNT") {
            if let Ok(count) = count.parse() {
                self.config.backup_code_count = count;
            }
        }
        if let Some(cost) = get_env_with_prefix("HASH_COST") {
            if let Ok(cost) = cost.parse() {
                self.config.hash_cost = cost;
            }
        }
        if let Some(level) = get_env_with_prefix("LOG_LEVEL") {
            self.config.logging.level = level;
        }
        if let Some(json) = get_env_with_prefix("LOG_JSON") {
            self.config.logging.json = json.parse().unwrap_or(false);
        }
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Get an environment variable, checking the `WARDKEY_` prefixed name first.
fn get_env_with_prefix(key: &str) -> Option<String> {
    std::env::var(format!("WARDKEY_{}", key))
        .or_else(|_| std::env::var(key))
        .ok()
}
