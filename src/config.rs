use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

use crate::cache::history::MAX_HISTORY;
use crate::warmer::WarmerConfig;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    /// Per-target filter directives appended to `log_level`
    #[serde(default = "default_log_directives")]
    pub log_directives: Vec<String>,
    /// PostgreSQL connection URL, `DATABASE_URL` takes precedence
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub postgres_max_connections: u32,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub warmer: WarmerSettings,
}

fn default_max_connections() -> u32 {
    10
}

fn default_log_directives() -> Vec<String> {
    // sqlx logs every statement at info
    vec!["sqlx=warn".to_string(), "redis=warn".to_string()]
}

/// Where cached views live
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// Shared by every process; required for warm/clear runs to reach readers
    Redis,
    /// Private to this process
    #[default]
    Memory,
}

/// Backend, TTLs and list bounds of the cached views
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    /// Redis connection URL, `REDIS_URL` takes precedence
    pub redis_url: Option<String>,
    /// Key bound of the in-process backend
    pub memory_capacity: usize,
    pub balance_ttl_secs: u64,
    pub history_ttl_secs: u64,
    pub contacts_ttl_secs: u64,
    pub profile_ttl_secs: u64,
    pub history_max_len: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            redis_url: None,
            memory_capacity: crate::cache::memory::DEFAULT_CAPACITY,
            balance_ttl_secs: 300,
            history_ttl_secs: 3600,
            contacts_ttl_secs: 600,
            profile_ttl_secs: 3600,
            history_max_len: MAX_HISTORY,
        }
    }
}

impl CacheConfig {
    pub fn balance_ttl(&self) -> Duration {
        Duration::from_secs(self.balance_ttl_secs)
    }

    pub fn history_ttl(&self) -> Duration {
        Duration::from_secs(self.history_ttl_secs)
    }

    pub fn contacts_ttl(&self) -> Duration {
        Duration::from_secs(self.contacts_ttl_secs)
    }

    pub fn profile_ttl(&self) -> Duration {
        Duration::from_secs(self.profile_ttl_secs)
    }
}

/// Cache warmer schedule
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct WarmerSettings {
    pub enabled: bool,
    pub warm_on_startup: bool,
    pub interval_secs: u64,
    pub concurrency: usize,
}

impl Default for WarmerSettings {
    fn default() -> Self {
        let defaults = WarmerConfig::default();
        Self {
            enabled: true,
            warm_on_startup: true,
            interval_secs: defaults.interval.as_secs(),
            concurrency: defaults.concurrency,
        }
    }
}

impl WarmerSettings {
    pub fn warmer_config(&self) -> WarmerConfig {
        WarmerConfig {
            interval: Duration::from_secs(self.interval_secs.max(1)),
            concurrency: self.concurrency.max(1),
        }
    }
}

impl AppConfig {
    pub fn load(env: &str) -> anyhow::Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        let mut config = Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config yaml: {}", config_path))?;

        if let Ok(url) = std::env::var("DATABASE_URL")
            && !url.is_empty()
        {
            config.postgres_url = Some(url);
        }
        if let Ok(url) = std::env::var("REDIS_URL")
            && !url.is_empty()
        {
            config.cache.redis_url = Some(url);
        }
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
log_level: info
log_dir: ./logs
log_file: okane.log
use_json: false
rotation: daily
"#;

    #[test]
    fn test_missing_sections_use_defaults() {
        let config = AppConfig::from_yaml(MINIMAL).unwrap();
        assert!(config.postgres_url.is_none());
        assert_eq!(config.postgres_max_connections, 10);
        assert_eq!(config.cache.balance_ttl(), Duration::from_secs(300));
        assert_eq!(config.cache.history_ttl(), Duration::from_secs(3600));
        assert_eq!(config.cache.contacts_ttl(), Duration::from_secs(600));
        assert_eq!(config.cache.history_max_len, 50);
        assert_eq!(config.cache.backend, CacheBackend::Memory);
        assert!(config.cache.redis_url.is_none());
        assert_eq!(config.log_directives, vec!["sqlx=warn", "redis=warn"]);
        assert!(config.warmer.enabled);
        assert_eq!(config.warmer.interval_secs, 900);
        assert_eq!(config.warmer.concurrency, 8);
    }

    #[test]
    fn test_partial_sections() {
        let yaml = format!(
            "{MINIMAL}postgres_url: postgresql://localhost/okane\ncache:\n  balance_ttl_secs: 60\nwarmer:\n  enabled: false\n  concurrency: 0\n"
        );
        let config = AppConfig::from_yaml(&yaml).unwrap();
        assert_eq!(
            config.postgres_url.as_deref(),
            Some("postgresql://localhost/okane")
        );
        assert_eq!(config.cache.balance_ttl_secs, 60);
        assert_eq!(config.cache.profile_ttl_secs, 3600);
        assert!(!config.warmer.enabled);
        assert!(config.warmer.warm_on_startup);
        assert_eq!(config.warmer.warmer_config().concurrency, 1);
    }

    #[test]
    fn test_redis_backend_and_log_directives() {
        let yaml = format!(
            "{MINIMAL}log_directives: [\"okane::warmer=debug\"]\ncache:\n  backend: redis\n  redis_url: redis://cache:6379\n"
        );
        let config = AppConfig::from_yaml(&yaml).unwrap();
        assert_eq!(config.cache.backend, CacheBackend::Redis);
        assert_eq!(config.cache.redis_url.as_deref(), Some("redis://cache:6379"));
        assert_eq!(config.log_directives, vec!["okane::warmer=debug"]);

        let unknown = format!("{MINIMAL}cache:\n  backend: memcached\n");
        assert!(AppConfig::from_yaml(&unknown).is_err());
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(AppConfig::from_yaml("log_level: [").is_err());
    }

    #[test]
    fn test_dev_config_parses() {
        let content = include_str!("../config/dev.yaml");
        let config = AppConfig::from_yaml(content).unwrap();
        assert_eq!(config.rotation, "daily");
        assert_eq!(config.cache.backend, CacheBackend::Redis);

        let prod = AppConfig::from_yaml(include_str!("../config/prod.yaml")).unwrap();
        assert_eq!(prod.cache.backend, CacheBackend::Redis);
    }
}
