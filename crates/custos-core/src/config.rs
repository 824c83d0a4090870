// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Ledger configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CustosError, Result};

/// Lowest PBKDF2 iteration count the key deriver will accept.
pub const MIN_KDF_ITERATIONS: u32 = 100_000;

/// Highest PBKDF2 iteration count accepted, from configuration or from a
/// stored key reference.
pub const MAX_KDF_ITERATIONS: u32 = 10_000_000;

/// Iteration count used for newly collected evidence unless overridden.
pub const DEFAULT_KDF_ITERATIONS: u32 = 210_000;

/// Persistent ledger settings.
///
/// Holds no key material. The master secret and signing key
/// are injected at startup and never written to this file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustosConfig {
    /// SQLite database holding evidence items and custody entries.
    pub database_path: PathBuf,
    /// PBKDF2-HMAC-SHA256 iterations for per-item key derivation.
    pub kdf_iterations: u32,
    /// How long a store call may wait on a locked database.
    pub storage_timeout_ms: u64,
    /// Append-only file that receives a notarization line per custody entry.
    pub anchor_log_path: Option<PathBuf>,
}

impl Default for CustosConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("custos.db"),
            kdf_iterations: DEFAULT_KDF_ITERATIONS,
            storage_timeout_ms: 5_000,
            anchor_log_path: None,
        }
    }
}

impl CustosConfig {
    /// Load a JSON config file and validate it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the config as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }

    /// Reject settings that would weaken key derivation or hang the store.
    pub fn validate(&self) -> Result<()> {
        if self.kdf_iterations < MIN_KDF_ITERATIONS {
            return Err(CustosError::Configuration(format!(
                "kdf_iterations must be at least {MIN_KDF_ITERATIONS}, got {}",
                self.kdf_iterations
            )));
        }
        if self.kdf_iterations > MAX_KDF_ITERATIONS {
            return Err(CustosError::Configuration(format!(
                "kdf_iterations must be at most {MAX_KDF_ITERATIONS}, got {}",
                self.kdf_iterations
            )));
        }
        if self.storage_timeout_ms == 0 {
            return Err(CustosError::Configuration(
                "storage_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.database_path.as_os_str().is_empty() {
            return Err(CustosError::Configuration(
                "database_path must not be empty".into(),
            ));
        }
        Ok(())
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.storage_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(CustosConfig::default().validate().is_ok());
    }

    #[test]
    fn weak_kdf_rejected() {
        let config = CustosConfig {
            kdf_iterations: 1_000,
            ..CustosConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(CustosError::Configuration(_))
        ));
    }

    #[test]
    fn runaway_kdf_rejected() {
        let config = CustosConfig {
            kdf_iterations: MAX_KDF_ITERATIONS + 1,
            ..CustosConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(CustosError::Configuration(_))
        ));
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custos.json");
        let config = CustosConfig {
            database_path: dir.path().join("ledger.db"),
            anchor_log_path: Some(dir.path().join("anchors.log")),
            ..CustosConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(CustosConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn partial_file_takes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custos.json");
        std::fs::write(&path, r#"{ "storage_timeout_ms": 250 }"#).unwrap();

        let config = CustosConfig::load(&path).unwrap();
        assert_eq!(config.storage_timeout(), Duration::from_millis(250));
        assert_eq!(config.kdf_iterations, DEFAULT_KDF_ITERATIONS);
    }
}
