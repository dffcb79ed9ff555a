//! Shared application state.

use frontline_core::config::clamp_ttl_hours;
use frontline_core::FrontlineConfig;
use frontline_store::SqliteStore;

/// Shared application state accessible from all route handlers.
pub struct AppState {
    pub config: FrontlineConfig,
    pub store: SqliteStore,
}

impl AppState {
    pub fn new(config: FrontlineConfig, store: SqliteStore) -> Self {
        Self { config, store }
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(clamp_ttl_hours(self.config.session_ttl_hours))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oversized_ttl_does_not_panic() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = FrontlineConfig::from_env(dir.path()).unwrap();
        config.session_ttl_hours = i64::MAX;
        let state = AppState::new(config, SqliteStore::open_in_memory().unwrap());
        assert_eq!(
            state.session_ttl(),
            chrono::Duration::hours(frontline_core::config::MAX_SESSION_TTL_HOURS)
        );
    }
}
