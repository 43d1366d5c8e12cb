//! XDG directory helpers for config/data/socket locations.

use std::path::PathBuf;

/// Base directory for persistent data (the SQLite store).
///
/// Uses `ASSURED_DATA_DIR` if set, otherwise `$XDG_DATA_HOME/assured` or
/// `~/.local/share/assured`.
pub(crate) fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("ASSURED_DATA_DIR") {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }
    base_from("XDG_DATA_HOME", &[".local", "share"]).join("assured")
}

/// Directory for the config file.
pub(crate) fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("ASSURED_CONFIG_DIR") {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }
    base_from("XDG_CONFIG_HOME", &[".config"]).join("assured")
}

/// User-private directory for the daemon socket.
pub(crate) fn socket_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("ASSURED_RUNTIME_DIR") {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }
    if let Ok(dir) = std::env::var("XDG_RUNTIME_DIR") {
        if !dir.is_empty() {
            return PathBuf::from(dir).join("assured");
        }
    }
    data_dir()
}

fn base_from(var: &str, home_suffix: &[&str]) -> PathBuf {
    if let Ok(dir) = std::env::var(var) {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    let mut base = std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"));
    for part in home_suffix {
        base = base.join(part);
    }
    base
}
