//! Configuration loader and validator for the Compass metrics sync service.
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

use crate::sync::{CapScope, SyncOptions};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    #[serde(default)]
    pub compass: Compass,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub server: Server,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
}

/// Remote metrics API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Compass {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub begin_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

/// Paging and truncation settings for a sync job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncSettings {
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_record_cap")]
    pub record_cap: Option<usize>,
    #[serde(default)]
    pub cap_scope: CapScope,
}

/// HTTP trigger settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Server {
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_endpoint() -> String {
    crate::compass::COMPASS_API_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_page_size() -> u32 {
    100
}

fn default_record_cap() -> Option<usize> {
    Some(crate::sync::DEFAULT_RECORD_CAP)
}

fn default_listen() -> String {
    "127.0.0.1:3000".to_string()
}

impl Default for Compass {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout_secs: default_timeout_secs(),
            level: None,
            begin_date: None,
            end_date: None,
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            record_cap: default_record_cap(),
            cap_scope: CapScope::default(),
        }
    }
}

impl Default for Server {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        fs::create_dir_all(&self.app.data_dir)
    }

    /// Database URL, honoring `DATABASE_URL` when set.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL").unwrap_or_else(|_| {
            format!(
                "sqlite://{}/compass.db",
                self.app.data_dir.trim_end_matches('/')
            )
        })
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            page_size: self.sync.page_size,
            record_cap: self.sync.record_cap,
            cap_scope: self.sync.cap_scope,
        }
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server
            .listen
            .parse()
            .map_err(|_| ConfigError::Invalid("server.listen must be a socket address"))
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }

    let endpoint = cfg.compass.endpoint.trim();
    if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
        return Err(ConfigError::Invalid(
            "compass.endpoint must be an http(s) URL",
        ));
    }
    if cfg.compass.timeout_secs == 0 {
        return Err(ConfigError::Invalid("compass.timeout_secs must be > 0"));
    }
    if let (Some(begin), Some(end)) = (cfg.compass.begin_date, cfg.compass.end_date) {
        if begin > end {
            return Err(ConfigError::Invalid(
                "compass.begin_date must not be after compass.end_date",
            ));
        }
    }

    if cfg.sync.page_size == 0 {
        return Err(ConfigError::Invalid("sync.page_size must be > 0"));
    }
    if cfg.sync.record_cap == Some(0) {
        return Err(ConfigError::Invalid("sync.record_cap must be > 0 when set"));
    }

    cfg.listen_addr()?;
    Ok(())
}

/// Returns a complete example YAML document.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"

compass:
  endpoint: "https://oss-compass.org/api/graphql"
  timeout_secs: 30
  level: "repo"
  begin_date: "2023-01-01"
  end_date: "2024-12-31"

sync:
  page_size: 100
  record_cap: 5
  cap_scope: page

server:
  listen: "127.0.0.1:3000"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.sync.record_cap, Some(5));
        assert_eq!(cfg.sync.cap_scope, CapScope::Page);
        assert_eq!(cfg.compass.level.as_deref(), Some("repo"));
    }

    #[test]
    fn defaults_fill_missing_sections() {
        let cfg: Config = serde_yaml::from_str("app:\n  data_dir: ./data\n").unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.compass.endpoint, "https://oss-compass.org/api/graphql");
        assert_eq!(cfg.sync.page_size, 100);
        assert_eq!(cfg.sync.record_cap, Some(5));
        assert_eq!(cfg.server.listen, "127.0.0.1:3000");
    }

    #[test]
    fn null_record_cap_means_unlimited() {
        let cfg: Config = serde_yaml::from_str(
            "app:\n  data_dir: ./data\nsync:\n  record_cap: null\n  cap_scope: project\n",
        )
        .unwrap();
        validate(&cfg).unwrap();
        let opts = cfg.sync_options();
        assert_eq!(opts.record_cap, None);
        assert_eq!(opts.cap_scope, CapScope::Project);
    }

    #[test]
    fn invalid_sync_settings() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.sync.page_size = 0;
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("page_size")),
            _ => panic!("wrong error"),
        }

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.sync.record_cap = Some(0);
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("record_cap")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn invalid_compass_settings() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.compass.endpoint = "oss-compass.org/api/graphql".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.compass.timeout_secs = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.compass.begin_date = NaiveDate::from_ymd_opt(2025, 1, 1);
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("begin_date")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn invalid_listen_address() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.server.listen = "localhost".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn ensure_dirs_creates_data_dir() {
        let td = tempdir().unwrap();
        let data_path = td.path().join("data");
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.data_dir = data_path.to_string_lossy().to_string();
        cfg.ensure_dirs().unwrap();
        assert!(data_path.exists());
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.sync.page_size, 100);
        assert_eq!(cfg.compass.begin_date, NaiveDate::from_ymd_opt(2023, 1, 1));
    }
}
