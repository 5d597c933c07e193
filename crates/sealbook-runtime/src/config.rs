//! Runtime configuration.
//!
//! ```toml
//! database_path = "books.db"
//! actor_id = "controller"
//!
//! [backup]
//! pbkdf2_iterations = 600000
//! compression_level = 6
//!
//! [[jurisdictions]]
//! code = "CA-ON"
//! display_name = "Ontario HST"
//! base_rate_bps = 1300
//! effective_date = "2024-01-01"
//! ```
//!
//! Every key is optional.  Loading validates the whole document; any problem
//! is a `ConfigError`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use sealbook_backup::BackupSettings;
use sealbook_contracts::{
    error::{SealError, SealResult},
    tax::TaxJurisdiction,
};
use sealbook_core::{compress, crypto::DEFAULT_PBKDF2_ITERATIONS};
use sealbook_tax::JurisdictionTable;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackupConfig {
    #[serde(default = "default_iterations")]
    pub pbkdf2_iterations: u32,
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,
}

fn default_iterations() -> u32 {
    DEFAULT_PBKDF2_ITERATIONS
}

fn default_compression_level() -> u32 {
    compress::DEFAULT_LEVEL
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            pbkdf2_iterations: default_iterations(),
            compression_level: default_compression_level(),
        }
    }
}

impl BackupConfig {
    pub fn settings(&self) -> BackupSettings {
        BackupSettings {
            pbkdf2_iterations: self.pbkdf2_iterations,
            compression_level: self.compression_level,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SealbookConfig {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    /// Recorded as `actor_id` on every event this process seals.
    #[serde(default = "default_actor_id")]
    pub actor_id: String,
    #[serde(default)]
    pub backup: BackupConfig,
    /// Upserted into the jurisdiction table on open.
    #[serde(default)]
    pub jurisdictions: Vec<TaxJurisdiction>,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("sealbook.db")
}

fn default_actor_id() -> String {
    "sealbook".to_string()
}

impl Default for SealbookConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            actor_id: default_actor_id(),
            backup: BackupConfig::default(),
            jurisdictions: Vec::new(),
        }
    }
}

impl SealbookConfig {
    pub fn from_toml_str(s: &str) -> SealResult<Self> {
        let config: SealbookConfig = toml::from_str(s).map_err(|e| SealError::ConfigError {
            reason: format!("failed to parse sealbook TOML: {}", e),
        })?;
        config.validated()
    }

    pub fn from_file(path: &Path) -> SealResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| SealError::ConfigError {
            reason: format!("failed to read config file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Check every value and normalize jurisdiction codes.
    pub fn validated(mut self) -> SealResult<Self> {
        if self.actor_id.trim().is_empty() {
            return Err(SealError::ConfigError {
                reason: "actor_id must not be empty".to_string(),
            });
        }
        if self.backup.pbkdf2_iterations == 0 {
            return Err(SealError::ConfigError {
                reason: "backup.pbkdf2_iterations must be positive".to_string(),
            });
        }
        if self.backup.compression_level > 9 {
            return Err(SealError::ConfigError {
                reason: format!(
                    "backup.compression_level must be 0-9, got {}",
                    self.backup.compression_level
                ),
            });
        }
        self.jurisdictions = JurisdictionTable {
            jurisdictions: self.jurisdictions,
        }
        .validated()?
        .jurisdictions;
        Ok(self)
    }
}
