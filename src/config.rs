//! Config loading and persistence.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::service::{HubLimits, OpError};
use crate::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Override the SQLite store location.
    pub db_path: Option<PathBuf>,
    /// Override the daemon socket location.
    pub socket_path: Option<PathBuf>,
    pub limits: Limits,
    pub realtime: RealtimeConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: None,
            socket_path: None,
            limits: Limits::default(),
            realtime: RealtimeConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    pub fn db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| crate::paths::data_dir().join("assured.db"))
    }

    pub fn socket_path(&self) -> PathBuf {
        self.socket_path
            .clone()
            .unwrap_or_else(|| crate::paths::socket_dir().join("daemon.sock"))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub max_subscribers_per_topic: usize,
    pub subscriber_queue_len: usize,
}

impl Default for Limits {
    fn default() -> Self {
        let defaults = HubLimits::default();
        Self {
            max_subscribers_per_topic: defaults.max_subscribers_per_topic,
            subscriber_queue_len: defaults.subscriber_queue_len,
        }
    }
}

impl Limits {
    pub fn hub_limits(&self) -> HubLimits {
        HubLimits {
            max_subscribers_per_topic: self.max_subscribers_per_topic,
            subscriber_queue_len: self.subscriber_queue_len,
        }
    }
}

/// Realtime admission knobs, configured per deployment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Origins allowed to open a channel; empty allows all.
    pub allowed_origins: Vec<String>,
    /// Skip the origin check entirely (local development).
    pub debug_skip_origin_check: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "assured=info".to_string(),
        }
    }
}

pub fn config_path() -> PathBuf {
    crate::paths::config_dir().join("config.toml")
}

pub fn load() -> Result<Config> {
    let path = config_path();
    let contents = fs::read_to_string(&path)
        .map_err(|e| config_error(format!("failed to read {}: {e}", path.display())))?;
    toml::from_str(&contents)
        .map_err(|e| config_error(format!("failed to parse {}: {e}", path.display())))
}

pub fn load_or_default() -> Config {
    let path = config_path();
    if path.exists() {
        match load() {
            Ok(cfg) => return cfg,
            Err(e) => {
                tracing::warn!("config load failed, using defaults: {e}");
                return Config::default();
            }
        }
    }
    Config::default()
}

pub fn write_config(path: &Path, cfg: &Config) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .map_err(|e| config_error(format!("failed to create {}: {e}", dir.display())))?;
    }
    let contents = toml::to_string_pretty(cfg)
        .map_err(|e| config_error(format!("failed to render config: {e}")))?;
    atomic_write(path, contents.as_bytes())
}

fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| config_error("config path missing parent directory".to_string()))?;
    let temp = tempfile::NamedTempFile::new_in(dir).map_err(|e| {
        config_error(format!(
            "failed to create temp file in {}: {e}",
            dir.display()
        ))
    })?;
    fs::write(temp.path(), data)
        .map_err(|e| config_error(format!("failed to write config temp file: {e}")))?;
    temp.persist(path).map_err(|e| {
        config_error(format!(
            "failed to persist config to {}: {e}",
            path.display()
        ))
    })?;
    Ok(())
}

fn config_error(reason: String) -> Error {
    Error::Op(OpError::Validation {
        field: "config".into(),
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        let cfg = Config {
            db_path: Some(PathBuf::from("/var/lib/assured/assured.db")),
            socket_path: None,
            limits: Limits {
                max_subscribers_per_topic: 8,
                subscriber_queue_len: 32,
            },
            realtime: RealtimeConfig {
                allowed_origins: vec!["https://assured.example".to_string()],
                debug_skip_origin_check: false,
            },
            logging: LoggingConfig::default(),
        };
        write_config(&path, &cfg).expect("write config");
        let contents = fs::read_to_string(&path).expect("read config");
        let loaded: Config = toml::from_str(&contents).expect("parse config");
        assert_eq!(loaded.limits.max_subscribers_per_topic, 8);
        assert_eq!(loaded.realtime.allowed_origins.len(), 1);
        assert_eq!(
            loaded.db_path(),
            PathBuf::from("/var/lib/assured/assured.db")
        );
    }

    #[test]
    fn defaults_allow_all_origins() {
        let cfg = Config::default();
        assert!(cfg.realtime.allowed_origins.is_empty());
        assert!(!cfg.realtime.debug_skip_origin_check);
    }
}
