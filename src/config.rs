//! Database tuning knobs, stored as JSON next to the database file

use crate::model::HASH_LENGTH;
use crate::store::IDEAL_BATCH_SIZE;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Construction-time settings for a [`crate::Database`]
///
/// The memory limit for [`crate::Database::cap`] is not part of this; it is
/// passed on every call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Byte capacity of the clean cache; 0 disables it
    pub clean_cache_size: usize,
    /// Number of independently locked clean cache shards
    pub clean_cache_shards: usize,
    /// Queued value bytes after which a flush batch is written out
    pub ideal_batch_size: usize,
    /// Preimage bytes above which `cap` also flushes preimages
    pub preimage_flush_threshold: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            clean_cache_size: 16 * 1024 * 1024,
            clean_cache_shards: 16,
            ideal_batch_size: IDEAL_BATCH_SIZE,
            preimage_flush_threshold: 4 * 1024 * 1024,
        }
    }
}

impl DatabaseConfig {
    /// A config with the clean cache turned off
    pub fn without_clean_cache() -> Self {
        DatabaseConfig {
            clean_cache_size: 0,
            ..Self::default()
        }
    }

    /// Load the config stored alongside a database file, or the defaults
    pub fn load(db_path: &Path) -> Result<Self> {
        let config_path = Self::config_path(db_path);
        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Self = serde_json::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save the config alongside a database file
    pub fn save(&self, db_path: &Path) -> Result<()> {
        self.validate()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(Self::config_path(db_path), content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.ideal_batch_size == 0 {
            return Err(Error::Config("ideal_batch_size must be non-zero".into()));
        }
        if self.clean_cache_size == 0 {
            return Ok(());
        }
        if self.clean_cache_shards == 0 {
            return Err(Error::Config(
                "clean_cache_shards must be non-zero when the clean cache is enabled".into(),
            ));
        }
        // Smallest cache entry: a hash and one byte of encoding
        if self.clean_cache_size / self.clean_cache_shards <= HASH_LENGTH {
            return Err(Error::Config(format!(
                "clean_cache_size of {} bytes is too small for {} shards",
                self.clean_cache_size, self.clean_cache_shards
            )));
        }
        Ok(())
    }

    /// `nodes.triedb` -> `nodes.triedb.config`
    fn config_path(db_path: &Path) -> PathBuf {
        let mut config_path = db_path.to_path_buf();
        let file_name = db_path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "nodes.triedb".to_string());
        config_path.set_file_name(format!("{}.config", file_name));
        config_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_config_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = DatabaseConfig::load(&dir.path().join("db.triedb")).unwrap();
        assert_eq!(config, DatabaseConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("db.triedb");

        let config = DatabaseConfig {
            clean_cache_size: 0,
            ideal_batch_size: 4096,
            ..DatabaseConfig::default()
        };
        config.save(&db_path).unwrap();

        assert!(dir.path().join("db.triedb.config").exists());
        assert_eq!(DatabaseConfig::load(&db_path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("db.triedb");
        std::fs::write(
            dir.path().join("db.triedb.config"),
            r#"{ "clean_cache_size": 1024 }"#,
        )
        .unwrap();

        let config = DatabaseConfig::load(&db_path).unwrap();
        assert_eq!(config.clean_cache_size, 1024);
        assert_eq!(config.ideal_batch_size, IDEAL_BATCH_SIZE);
    }

    #[test]
    fn test_rejects_zero_batch_size() {
        let config = DatabaseConfig {
            ideal_batch_size: 0,
            ..DatabaseConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_cache_too_small_for_shards() {
        let config = DatabaseConfig {
            clean_cache_size: 8,
            clean_cache_shards: 16,
            ..DatabaseConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = DatabaseConfig {
            clean_cache_size: 16 * (HASH_LENGTH + 1),
            ..config
        };
        assert!(config.validate().is_ok());
        assert!(DatabaseConfig::without_clean_cache().validate().is_ok());
    }
}
