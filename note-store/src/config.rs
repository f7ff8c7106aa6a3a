//! Store configuration
//!
//! Central location for configuration constants and the deployment-time
//! settings (database location, encryption passphrase and salt) that are
//! loaded once at startup.

use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

// ===== Tags =====

/// Display color assigned to a tag created without one
pub const DEFAULT_TAG_COLOR: &str = "#444444";

// ===== Field Encryption =====

/// Length of the random IV generated for every encrypted field
pub const IV_SIZE: usize = 16;

/// Derived key length in bytes (AES-256)
pub const KEY_SIZE: usize = 32;

/// Default number of Argon2 passes over memory
pub const DEFAULT_KEY_COST: u32 = 3;

/// Default Argon2 memory cost in KiB (19 MiB)
pub const DEFAULT_KEY_MEMORY_KIB: u32 = 19 * 1024;

/// Argon2 needs at least 8 KiB per lane; derivation uses one lane
pub const MIN_KEY_MEMORY_KIB: u32 = 8;

/// Argon2 rejects salts shorter than this
pub const MIN_SALT_LENGTH: usize = 8;

// ===== Reminders =====

/// A reminder must fire at least this far in the future
pub const MIN_REMINDER_LEAD_MS: i64 = 5_000;

/// Notification title used when a note has no visible title
pub const UNTITLED_NOTE_TITLE: &str = "Untitled Note";

// ===== Environment =====

pub const ENV_PASSPHRASE: &str = "NOTE_STORE_PASSPHRASE";
pub const ENV_SALT: &str = "NOTE_STORE_SALT";
pub const ENV_DATABASE: &str = "NOTE_STORE_DB";
pub const ENV_KEY_COST: &str = "NOTE_STORE_KEY_COST";

fn default_database_path() -> PathBuf {
    PathBuf::from("notes.db")
}

fn default_key_cost() -> u32 {
    DEFAULT_KEY_COST
}

fn default_key_memory_kib() -> u32 {
    DEFAULT_KEY_MEMORY_KIB
}

/// Deployment-time store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    #[serde(default)]
    pub passphrase: String,
    #[serde(default)]
    pub salt: String,
    /// Argon2 time cost (iterations)
    #[serde(default = "default_key_cost")]
    pub key_cost: u32,
    #[serde(default = "default_key_memory_kib")]
    pub key_memory_kib: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            passphrase: String::new(),
            salt: String::new(),
            key_cost: default_key_cost(),
            key_memory_kib: default_key_memory_kib(),
        }
    }
}

impl StoreConfig {
    /// Load settings from a JSON file, then apply environment overrides.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).await?;
        let mut config: StoreConfig = serde_json::from_str(&content)?;
        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;

        tracing::info!("Store configuration loaded from {:?}", path);
        Ok(config)
    }

    /// Build settings from the environment alone.
    pub fn from_env() -> Result<Self> {
        let mut config = StoreConfig::default();
        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Overwrite fields from `lookup`, which maps variable names to values.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(passphrase) = lookup(ENV_PASSPHRASE) {
            self.passphrase = passphrase;
        }
        if let Some(salt) = lookup(ENV_SALT) {
            self.salt = salt;
        }
        if let Some(path) = lookup(ENV_DATABASE) {
            self.database_path = PathBuf::from(path);
        }
        if let Some(cost) = lookup(ENV_KEY_COST) {
            self.key_cost = cost
                .trim()
                .parse()
                .map_err(|_| {
                    AppError::Config(format!("{} is not a number: {}", ENV_KEY_COST, cost))
                })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.passphrase.is_empty() {
            return Err(AppError::Config("Encryption passphrase is not set".to_string()));
        }
        if self.salt.len() < MIN_SALT_LENGTH {
            return Err(AppError::Config(format!(
                "Salt must be at least {} bytes",
                MIN_SALT_LENGTH
            )));
        }
        if self.key_cost == 0 {
            return Err(AppError::Config("Key cost must be greater than 0".to_string()));
        }
        if self.key_memory_kib < MIN_KEY_MEMORY_KIB {
            return Err(AppError::Config(format!(
                "Key memory must be at least {} KiB",
                MIN_KEY_MEMORY_KIB
            )));
        }
        Ok(())
    }
}
