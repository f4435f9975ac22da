//! Startup configuration.
//!
//! Values come from CLI flags first, then the environment, then defaults.
//! The resolved [`Config`] is built once in `main` and handed to the scanner
//! and search engine by reference.

use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::Level;

use crate::cli::Cli;

pub const REPO_ENV: &str = "MAVEN_REPO_PATH";
pub const DB_ENV: &str = "CACHE_DB_PATH";
pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine a default for {0}; set it explicitly")]
    NoDefault(&'static str),

    #[error("repository path is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("failed to create index directory {path}: {source}")]
    IndexDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid log level {0:?} (expected trace, debug, info, warn or error)")]
    InvalidLogLevel(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub repository_root: PathBuf,
    pub index_path: PathBuf,
    pub log_level: Level,
}

/// Raw, unvalidated values gathered from flags and environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    pub repository_root: Option<PathBuf>,
    pub index_path: Option<PathBuf>,
    pub log_level: Option<String>,
}

impl ConfigSources {
    pub fn from_cli_and_env(cli: &Cli) -> Self {
        Self {
            repository_root: cli.repo.clone().or_else(|| env_value(REPO_ENV).map(PathBuf::from)),
            index_path: cli.db.clone().or_else(|| env_value(DB_ENV).map(PathBuf::from)),
            log_level: cli.log_level.clone().or_else(|| env_value(LOG_LEVEL_ENV)),
        }
    }
}

impl Config {
    pub fn resolve(sources: ConfigSources) -> Result<Self, ConfigError> {
        let repository_root = match sources.repository_root {
            Some(p) => p,
            None => default_repository_root()?,
        };
        let index_path = match sources.index_path {
            Some(p) => p,
            None => default_index_path()?,
        };
        let log_level = match sources.log_level.as_deref() {
            Some(raw) => parse_log_level(raw)?,
            None => Level::INFO,
        };

        let config = Self {
            repository_root,
            index_path,
            log_level,
        };
        config.validate()?;
        Ok(config)
    }

    /// A missing repository root is allowed: scans then index nothing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.repository_root.exists() && !self.repository_root.is_dir() {
            return Err(ConfigError::NotADirectory(self.repository_root.clone()));
        }
        ensure_parent_dir(&self.index_path)
    }
}

pub fn parse_log_level(raw: &str) -> Result<Level, ConfigError> {
    Level::from_str(raw.trim()).map_err(|_| ConfigError::InvalidLogLevel(raw.to_string()))
}

pub fn default_repository_root() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or(ConfigError::NoDefault("repository path"))?;
    Ok(home.join(".m2").join("repository"))
}

pub fn default_index_path() -> Result<PathBuf, ConfigError> {
    let base = dirs::data_local_dir()
        .or_else(dirs::cache_dir)
        .or_else(dirs::home_dir)
        .ok_or(ConfigError::NoDefault("index path"))?;
    Ok(base.join("class-index").join("index.lmdb"))
}

fn ensure_parent_dir(path: &Path) -> Result<(), ConfigError> {
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(());
    };
    std::fs::create_dir_all(parent).map_err(|source| ConfigError::IndexDirectory {
        path: parent.to_path_buf(),
        source,
    })
}

fn env_value(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::temp_path;

    #[test]
    fn resolve_prefers_explicit_sources_and_creates_index_dir() {
        let base = temp_path("config_explicit");
        let repo = base.join("repository");
        std::fs::create_dir_all(&repo).unwrap();
        let db = base.join("nested").join("index.lmdb");

        let config = Config::resolve(ConfigSources {
            repository_root: Some(repo.clone()),
            index_path: Some(db.clone()),
            log_level: Some("DEBUG".to_string()),
        })
        .unwrap();

        assert_eq!(config.repository_root, repo);
        assert_eq!(config.index_path, db);
        assert_eq!(config.log_level, Level::DEBUG);
        assert!(db.parent().unwrap().is_dir());
        let _ = std::fs::remove_dir_all(base);
    }

    #[test]
    fn resolve_accepts_missing_repository_root() {
        let base = temp_path("config_missing_repo");
        let config = Config::resolve(ConfigSources {
            repository_root: Some(base.join("nope")),
            index_path: Some(base.join("index.lmdb")),
            log_level: None,
        })
        .unwrap();
        assert_eq!(config.log_level, Level::INFO);
        let _ = std::fs::remove_dir_all(base);
    }

    #[test]
    fn resolve_rejects_file_as_repository_root() {
        let base = temp_path("config_file_repo");
        std::fs::create_dir_all(&base).unwrap();
        let file = base.join("repository");
        std::fs::write(&file, b"x").unwrap();

        let err = Config::resolve(ConfigSources {
            repository_root: Some(file),
            index_path: Some(base.join("index.lmdb")),
            log_level: None,
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::NotADirectory(_)));
        let _ = std::fs::remove_dir_all(base);
    }

    #[test]
    fn parse_log_level_rejects_unknown_levels() {
        assert_eq!(parse_log_level(" warn ").unwrap(), Level::WARN);
        assert!(matches!(
            parse_log_level("verbose"),
            Err(ConfigError::InvalidLogLevel(_))
        ));
    }
}
