//! Configuration and data directory management.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 24 * 7;
/// Ten years.
pub const MAX_SESSION_TTL_HOURS: i64 = 24 * 365 * 10;

/// Paths to Frontline data directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPaths {
    /// Root data directory (e.g., `data/`).
    pub root: PathBuf,
    /// SQLite directory (`data/db/`).
    pub db_dir: PathBuf,
}

impl DataPaths {
    /// Create data paths from a root directory. Creates directories if needed.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        let paths = Self {
            db_dir: root.join("db"),
            root,
        };
        std::fs::create_dir_all(&paths.db_dir)?;
        Ok(paths)
    }
}

/// Top-level Frontline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontlineConfig {
    /// HTTP server port.
    pub port: u16,
    /// Data directory paths.
    pub data_paths: DataPaths,
    /// Bearer session lifetime.
    pub session_ttl_hours: i64,
}

impl FrontlineConfig {
    /// Create configuration from environment and defaults.
    pub fn from_env(data_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let port = env_or("PORT", DEFAULT_PORT);
        let session_ttl_hours = env_or("FRONTLINE_SESSION_TTL_HOURS", DEFAULT_SESSION_TTL_HOURS);
        let data_paths = DataPaths::new(data_dir)?;

        Ok(Self {
            port,
            data_paths,
            session_ttl_hours: clamp_ttl_hours(session_ttl_hours),
        })
    }
}

/// Keep a session lifetime within `1..=MAX_SESSION_TTL_HOURS`.
pub fn clamp_ttl_hours(hours: i64) -> i64 {
    if hours > MAX_SESSION_TTL_HOURS {
        warn!("Session TTL of {hours}h capped at {MAX_SESSION_TTL_HOURS}h");
    }
    hours.clamp(1, MAX_SESSION_TTL_HOURS)
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Invalid {key} value {raw:?}, using default");
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_paths_creates_db_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let root = dir.path().join("data");
        let paths = DataPaths::new(&root).unwrap();
        assert!(paths.db_dir.is_dir());
        assert_eq!(paths.root, root);
    }

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        std::env::set_var("FRONTLINE_TEST_BAD_PORT", "not-a-port");
        assert_eq!(env_or("FRONTLINE_TEST_BAD_PORT", 1234u16), 1234);
        std::env::set_var("FRONTLINE_TEST_GOOD_PORT", " 8080 ");
        assert_eq!(env_or("FRONTLINE_TEST_GOOD_PORT", 1234u16), 8080);
        assert_eq!(env_or("FRONTLINE_TEST_UNSET_PORT", 42u16), 42);
    }

    #[test]
    fn test_ttl_is_bounded() {
        assert_eq!(clamp_ttl_hours(0), 1);
        assert_eq!(clamp_ttl_hours(-5), 1);
        assert_eq!(clamp_ttl_hours(48), 48);
        assert_eq!(clamp_ttl_hours(i64::MAX), MAX_SESSION_TTL_HOURS);
    }
}
