use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::query::DEFAULT_MAX_AGE_MINUTES;
use crate::stock::DEFAULT_DATA_SOURCE;

pub const DEFAULT_PORT: u16 = 8000;

/// Settings read from `tickercache.toml`; every key is optional
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TickercacheConfig {
    pub database: Option<String>,
    pub data_source: Option<String>,
    pub max_age_minutes: Option<i64>,
    pub port: Option<u16>,
}

impl TickercacheConfig {
    /// Config with every key filled in with its default
    pub fn with_defaults() -> Self {
        Self {
            database: Some(default_database_path().display().to_string()),
            data_source: Some(DEFAULT_DATA_SOURCE.to_string()),
            max_age_minutes: Some(DEFAULT_MAX_AGE_MINUTES),
            port: Some(DEFAULT_PORT),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.database
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(default_database_path)
    }

    pub fn data_source(&self) -> &str {
        self.data_source.as_deref().unwrap_or(DEFAULT_DATA_SOURCE)
    }

    pub fn max_age(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.max_age_minutes.unwrap_or(DEFAULT_MAX_AGE_MINUTES))
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("tickercache.toml")
}

pub fn default_database_path() -> PathBuf {
    Path::new("data").join("stocks.db")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<TickercacheConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: TickercacheConfig = toml::from_str(&contents)?;
    if let Some(minutes) = config.max_age_minutes {
        if minutes <= 0 {
            anyhow::bail!("max_age_minutes must be positive in {} (got {})", path.display(), minutes);
        }
    }
    tracing::debug!("Loaded config from {}", path.display());
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &TickercacheConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_db_dir(db_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_config_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("absent.toml"))).unwrap().is_none());
    }

    #[test]
    fn test_defaults_when_keys_missing() {
        let config = TickercacheConfig::default();
        assert_eq!(config.database_path(), Path::new("data").join("stocks.db"));
        assert_eq!(config.data_source(), "yfinance");
        assert_eq!(config.max_age(), chrono::Duration::minutes(15));
        assert_eq!(config.port(), 8000);
    }

    #[test]
    fn test_write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tickercache.toml");
        let config = TickercacheConfig {
            database: Some("cache/prices.db".to_string()),
            port: Some(9100),
            ..Default::default()
        };

        write_config(&path, &config, false).unwrap();
        assert!(write_config(&path, &config, false).is_err());
        write_config(&path, &config, true).unwrap();

        let loaded = load_config(Some(&path)).unwrap().unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.port(), 9100);
        assert_eq!(loaded.data_source(), "yfinance");
    }

    #[test]
    fn test_rejects_non_positive_max_age() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tickercache.toml");
        std::fs::write(&path, "max_age_minutes = 0\n").unwrap();
        assert!(load_config(Some(&path)).is_err());
    }

    #[test]
    fn test_ensure_db_dir() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("a").join("b").join("stocks.db");
        ensure_db_dir(&db).unwrap();
        assert!(db.parent().unwrap().is_dir());
    }
}
