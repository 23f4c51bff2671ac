//! Process configuration, read once at startup from `FRONTDESK_*` variables.

use std::path::PathBuf;
use std::time::Duration;

/// Where the record store keeps its files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
    pub backup_dir: PathBuf,
    /// Backups kept per collection file.
    pub max_backups: usize,
}

impl StoreConfig {
    pub fn new(data_dir: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            backup_dir: backup_dir.into(),
            max_backups: 10,
        }
    }

    pub fn with_max_backups(mut self, max: usize) -> Self {
        self.max_backups = max;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new("./data", "./backups")
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub max_connections: usize,
    pub store: StoreConfig,
    /// HMAC secret for issued tokens. `None` means a per-process random secret.
    pub jwt_secret: Option<String>,
    pub token_ttl: Duration,
    pub metrics_port: Option<u16>,
    /// Period of the background room-status reconciliation. Disabled when `None`.
    pub reconcile_every: Option<Duration>,
    pub admin_username: String,
    /// Creates an Admin at startup when no Admin exists.
    pub admin_password: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 8080,
            max_connections: 256,
            store: StoreConfig::default(),
            jwt_secret: None,
            token_ttl: Duration::from_secs(7 * 24 * 3600),
            metrics_port: None,
            reconcile_every: None,
            admin_username: "admin".into(),
            admin_password: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source; unset, unparsable or zero
    /// counts and periods fall back to the defaults.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parse = |key: &str| {
            get(key)
                .and_then(|s| s.trim().parse::<u64>().ok())
                .filter(|&n| n > 0)
        };

        let store = StoreConfig {
            data_dir: get("FRONTDESK_DATA_DIR").map_or(defaults.store.data_dir, PathBuf::from),
            backup_dir: get("FRONTDESK_BACKUP_DIR").map_or(defaults.store.backup_dir, PathBuf::from),
            max_backups: parse("FRONTDESK_MAX_BACKUPS").map_or(defaults.store.max_backups, |n| n as usize),
        };

        Self {
            bind: get("FRONTDESK_BIND").unwrap_or(defaults.bind),
            port: get("FRONTDESK_PORT")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(defaults.port),
            max_connections: parse("FRONTDESK_MAX_CONNECTIONS").map_or(defaults.max_connections, |n| n as usize),
            store,
            jwt_secret: get("FRONTDESK_JWT_SECRET").filter(|s| !s.is_empty()),
            token_ttl: parse("FRONTDESK_TOKEN_TTL_SECS").map_or(defaults.token_ttl, Duration::from_secs),
            metrics_port: get("FRONTDESK_METRICS_PORT").and_then(|s| s.trim().parse().ok()),
            reconcile_every: parse("FRONTDESK_RECONCILE_SECS").map(Duration::from_secs),
            admin_username: get("FRONTDESK_ADMIN_USERNAME").unwrap_or(defaults.admin_username),
            admin_password: get("FRONTDESK_ADMIN_PASSWORD").filter(|s| !s.is_empty()),
        }
    }

    pub fn with_store(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }

    pub fn with_jwt_secret(mut self, secret: impl Into<String>) -> Self {
        self.jwt_secret = Some(secret.into());
        self
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = Config::from_lookup(lookup(&[]));
        assert_eq!(config.port, 8080);
        assert_eq!(config.store.max_backups, 10);
        assert_eq!(config.store.data_dir, PathBuf::from("./data"));
        assert!(config.reconcile_every.is_none());
        assert!(config.jwt_secret.is_none());
        assert_eq!(config.addr(), "0.0.0.0:8080");
    }

    #[test]
    fn reads_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("FRONTDESK_PORT", "9090"),
            ("FRONTDESK_DATA_DIR", "/var/lib/frontdesk"),
            ("FRONTDESK_MAX_BACKUPS", "3"),
            ("FRONTDESK_RECONCILE_SECS", "60"),
            ("FRONTDESK_JWT_SECRET", "s3cret"),
            ("FRONTDESK_ADMIN_PASSWORD", "changeme"),
        ]));
        assert_eq!(config.port, 9090);
        assert_eq!(config.store.data_dir, PathBuf::from("/var/lib/frontdesk"));
        assert_eq!(config.store.max_backups, 3);
        assert_eq!(config.reconcile_every, Some(Duration::from_secs(60)));
        assert_eq!(config.jwt_secret.as_deref(), Some("s3cret"));
        assert_eq!(config.admin_password.as_deref(), Some("changeme"));
    }

    #[test]
    fn garbage_falls_back() {
        let config = Config::from_lookup(lookup(&[
            ("FRONTDESK_PORT", "http"),
            ("FRONTDESK_RECONCILE_SECS", "0"),
            ("FRONTDESK_MAX_CONNECTIONS", "0"),
            ("FRONTDESK_MAX_BACKUPS", "0"),
            ("FRONTDESK_TOKEN_TTL_SECS", "0"),
            ("FRONTDESK_JWT_SECRET", ""),
        ]));
        assert_eq!(config.port, 8080);
        assert!(config.reconcile_every.is_none());
        assert_eq!(config.max_connections, 256);
        assert_eq!(config.store.max_backups, 10);
        assert_eq!(config.token_ttl, Duration::from_secs(7 * 24 * 3600));
        assert!(config.jwt_secret.is_none());
    }
}
