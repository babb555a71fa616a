//! Configuration management using the prefer crate.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::{Account, Server};
use crate::rate_limit::PacingMode;
use crate::search::SearchQuery;
use crate::store::{MemoryStore, SharedStore, SqliteStore};

/// Name used for config discovery and the default data directory.
pub const APP_NAME: &str = "yandex-xml";

/// Default response cache lifetime in seconds (one day).
pub const DEFAULT_CACHE_RESULTS_DURATION: u64 = 86400;

/// Default HTTP timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT: u64 = 30;

const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Where quota schedules, cached responses and the last-request mark live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-memory (single process, not persisted)
    Memory,
    /// SQLite file (persisted, multi-process on one host)
    #[default]
    Sqlite,
    /// Redis (distributed, requires redis-backend feature)
    Redis,
}

/// Store settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// SQLite file. Relative paths resolve against the config file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Redis URL. Falls back to `REDIS_URL`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: Server,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Seconds a search response stays cached.
    pub cache_results_duration: u64,
    /// HTTP timeout in seconds.
    pub request_timeout: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub pacing: PacingMode,
    pub store: StoreConfig,
    /// Applied to every query for the fields it leaves unset.
    pub defaults: SearchQuery,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: Server::default(),
            login: None,
            api_key: None,
            cache_results_duration: DEFAULT_CACHE_RESULTS_DURATION,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            user_agent: None,
            pacing: PacingMode::default(),
            store: StoreConfig::default(),
            defaults: SearchQuery::default(),
            source_path: None,
        }
    }
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    /// Falls back to defaults when no file is found or it cannot be parsed.
    /// Environment overrides are applied either way.
    pub async fn load() -> Self {
        let config = match prefer::load(APP_NAME).await {
            Ok(pref_config) => match pref_config.source_path() {
                Some(path) => match Self::load_from_path(path).await {
                    Ok(config) => config,
                    Err(e) => {
                        warn!("Ignoring config {}: {}", path.display(), e);
                        Self::default()
                    }
                },
                None => Self::default(),
            },
            Err(_) => Self::default(),
        };
        config.with_env_overrides()
    }

    /// Load an explicit file, or discover one when `path` is `None`.
    pub async fn load_with(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Ok(Self::load_from_path(path).await?.with_env_overrides()),
            None => Ok(Self::load().await),
        }
    }

    /// Load configuration from a specific file path.
    /// TOML, YAML or JSON depending on the file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::Configuration(format!("Failed to read config file: {}", e)))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

        let mut config: Config = match ext {
            "toml" => toml::from_str(&contents).map_err(|e| {
                Error::Configuration(format!("Failed to parse TOML config: {}", e))
            })?,
            "yaml" | "yml" => serde_yaml::from_str(&contents).map_err(|e| {
                Error::Configuration(format!("Failed to parse YAML config: {}", e))
            })?,
            _ => serde_json::from_str(&contents).map_err(|e| {
                Error::Configuration(format!("Failed to parse JSON config: {}", e))
            })?,
        };

        debug!("Loaded config from {}", path.display());
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Apply `YANDEX_XML_*` environment variables.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let lookup = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(server) = lookup("YANDEX_XML_SERVER") {
            match server.parse() {
                Ok(server) => self.server = server,
                Err(e) => warn!("Ignoring YANDEX_XML_SERVER: {}", e),
            }
        }
        if let Some(login) = lookup("YANDEX_XML_LOGIN") {
            self.login = Some(login);
        }
        if let Some(api_key) = lookup("YANDEX_XML_API_KEY") {
            self.api_key = Some(api_key);
        }
        if self.store.url.is_none() {
            self.store.url = lookup("REDIS_URL");
        }
        self
    }

    pub fn account(&self) -> Account {
        Account {
            server: self.server,
            login: self.login.clone(),
            api_key: self.api_key.clone(),
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_results_duration)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    /// The config file's directory, if loaded from a file.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// - Absolute paths are returned as-is
    /// - Paths starting with ~ are expanded
    /// - Relative paths are resolved relative to `base_dir`
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// SQLite store file: configured path or the user's cache directory.
    pub fn store_path(&self) -> PathBuf {
        match &self.store.path {
            Some(path) => {
                let base = self
                    .base_dir()
                    .or_else(|| std::env::current_dir().ok())
                    .unwrap_or_else(|| PathBuf::from("."));
                self.resolve_path(path, &base)
            }
            None => dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_NAME)
                .join("store.db"),
        }
    }

    pub fn redis_url(&self) -> &str {
        self.store.url.as_deref().unwrap_or(DEFAULT_REDIS_URL)
    }

    /// Open the configured store.
    pub async fn open_store(&self) -> Result<SharedStore> {
        match self.store.backend {
            StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
            StoreBackend::Sqlite => Ok(Arc::new(SqliteStore::open(&self.store_path())?)),
            #[cfg(feature = "redis-backend")]
            StoreBackend::Redis => Ok(Arc::new(
                crate::store::RedisStore::new(self.redis_url()).await?,
            )),
            #[cfg(not(feature = "redis-backend"))]
            StoreBackend::Redis => Err(Error::Configuration(
                "Redis store requires the redis-backend feature".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::store::Store;

    #[tokio::test]
    async fn test_load_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("yandex-xml.toml");
        std::fs::write(
            &path,
            r#"
server = "yandex.com.tr"
login = "alice"
api_key = "03.1:abc"
cache_results_duration = 600
pacing = "legacy"

[store]
backend = "sqlite"
path = "data/store.db"

[defaults]
lang = "tr"
limit = 20
"#,
        )
        .unwrap();

        let config = Config::load_from_path(&path).await.unwrap();
        assert_eq!(config.server, Server::Tr);
        assert_eq!(config.login.as_deref(), Some("alice"));
        assert_eq!(config.cache_ttl(), Duration::from_secs(600));
        assert_eq!(config.timeout(), Duration::from_secs(DEFAULT_REQUEST_TIMEOUT));
        assert_eq!(config.pacing, PacingMode::Legacy);
        assert_eq!(config.defaults.lang.as_deref(), Some("tr"));
        assert_eq!(config.defaults.limit, Some(20));
        assert_eq!(config.store_path(), dir.path().join("data/store.db"));
    }

    #[tokio::test]
    async fn test_load_yaml_and_json() {
        let dir = tempfile::tempdir().unwrap();

        let yaml = dir.path().join("config.yaml");
        std::fs::write(&yaml, "server: yandex.com\nstore:\n  backend: memory\n").unwrap();
        let config = Config::load_from_path(&yaml).await.unwrap();
        assert_eq!(config.server, Server::Com);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.cache_results_duration, DEFAULT_CACHE_RESULTS_DURATION);

        let json = dir.path().join("config.json");
        std::fs::write(&json, r#"{"login": "bob", "request_timeout": 5}"#).unwrap();
        let config = Config::load_from_path(&json).await.unwrap();
        assert_eq!(config.login.as_deref(), Some("bob"));
        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert_eq!(config.server, Server::Ru);
    }

    #[tokio::test]
    async fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "server = [").unwrap();
        assert!(matches!(
            Config::load_from_path(&path).await,
            Err(Error::Configuration(_))
        ));
        assert!(Config::load_from_path(&dir.path().join("missing.json"))
            .await
            .is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("YANDEX_XML_SERVER", "tr"),
            ("YANDEX_XML_LOGIN", "carol"),
            ("YANDEX_XML_API_KEY", "k"),
            ("REDIS_URL", "redis://cache:6379"),
        ]
        .into_iter()
        .collect();

        let config = Config::default().with_overrides(|name| env.get(name).map(|v| v.to_string()));
        assert_eq!(config.server, Server::Tr);
        assert_eq!(config.account().credentials().unwrap(), ("carol", "k"));
        assert_eq!(config.redis_url(), "redis://cache:6379");
    }

    #[test]
    fn test_bad_server_override_is_ignored() {
        let config = Config {
            server: Server::Com,
            ..Default::default()
        }
        .with_overrides(|name| (name == "YANDEX_XML_SERVER").then(|| "bing.com".to_string()));
        assert_eq!(config.server, Server::Com);
    }

    #[tokio::test]
    async fn test_open_memory_and_sqlite_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.store.backend = StoreBackend::Memory;
        assert!(config.open_store().await.is_ok());

        config.store.backend = StoreBackend::Sqlite;
        config.store.path = Some(dir.path().join("s.db").to_string_lossy().into_owned());
        let store = config.open_store().await.unwrap();
        store.set("k", b"v", None).await.unwrap();
        assert!(dir.path().join("s.db").exists());
    }
}
