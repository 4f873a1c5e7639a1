use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable naming an alternate config file
pub const CONFIG_ENV_VAR: &str = "GRAIL_DB_CONFIG";

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

/// Store connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database file holding the grail_files table
    pub path: PathBuf,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

/// Ingestion behaviour
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Walk directories passed on the command line
    #[serde(default = "default_recursive")]
    pub recursive: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            recursive: default_recursive(),
        }
    }
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_recursive() -> bool {
    true
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. `explicit` (the `--config` flag)
    /// 2. Path specified in GRAIL_DB_CONFIG environment variable
    /// 3. ./config.toml in current directory
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let _ = dotenv::dotenv();

        let config_path = match explicit {
            Some(path) => path.to_path_buf(),
            None => std::env::var(CONFIG_ENV_VAR)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("config.toml")),
        };

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config = Self::from_toml(&config_str)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Parse configuration from a TOML string without validating it
    pub fn from_toml(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s)?;
        Ok(config)
    }

    /// Replace the database path (the `--database` flag)
    pub fn with_database_override(mut self, path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = path {
            self.database.path = path;
            self.validate()?;
        }
        Ok(self)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.database.path.as_os_str().is_empty() {
            anyhow::bail!("database.path must not be empty");
        }

        if self.database.busy_timeout_ms == 0 {
            anyhow::bail!("database.busy_timeout_ms must be greater than 0");
        }

        if let Some(parent) = self.database.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                anyhow::bail!(
                    "database directory does not exist: {}",
                    parent.display()
                );
            }
        }

        Ok(())
    }

    /// Get database path
    pub fn db_path(&self) -> &Path {
        &self.database.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_config(temp_dir: &TempDir, db_path: &Path) -> PathBuf {
        let db_str = db_path.to_str().unwrap().replace('\\', "\\\\");
        let content = format!(
            r#"
[database]
path = "{}"
busy_timeout_ms = 250

[ingest]
log_level = "debug"
"#,
            db_str
        );
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, content).unwrap();
        config_path
    }

    #[test]
    fn test_config_load_success() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("grail.db");
        let config_path = write_config(&temp_dir, &db_path);

        let config = Config::load(Some(&config_path));
        assert!(config.is_ok(), "Config::load() failed: {:?}", config.err());
        let config = config.unwrap();
        assert_eq!(config.db_path(), db_path.as_path());
        assert_eq!(config.database.busy_timeout_ms, 250);
        assert_eq!(config.ingest.log_level, "debug");
        assert!(config.ingest.recursive);
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::from_toml("[database]\npath = \"grail.db\"\n").unwrap();
        assert_eq!(config.database.busy_timeout_ms, 5000);
        assert_eq!(config.ingest.log_level, "info");
    }

    #[test]
    fn test_config_missing_database_section() {
        assert!(Config::from_toml("[ingest]\nrecursive = false\n").is_err());
    }

    #[test]
    fn test_config_missing_parent_dir() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nope").join("grail.db");
        let config_path = write_config(&temp_dir, &db_path);

        let err = Config::load(Some(&config_path)).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_database_override() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = write_config(&temp_dir, &temp_dir.path().join("a.db"));
        let other = temp_dir.path().join("b.db");

        let config = Config::load(Some(&config_path))
            .unwrap()
            .with_database_override(Some(other.clone()))
            .unwrap();
        assert_eq!(config.db_path(), other.as_path());
    }

    #[test]
    fn test_config_invalid_path() {
        let config = Config::load(Some(Path::new("nonexistent.toml")));
        assert!(config.is_err());
    }
}
