use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Origin the application is served from; only same-origin traffic is intercepted
  pub origin: String,
  pub cache: CacheConfig,
  pub api: ApiConfig,
  pub storage: StorageConfig,
  pub sync: SyncConfig,
  pub notifications: NotificationConfig,
  pub network: NetworkConfig,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      origin: "http://localhost:3000".to_string(),
      cache: CacheConfig::default(),
      api: ApiConfig::default(),
      storage: StorageConfig::default(),
      sync: SyncConfig::default(),
      notifications: NotificationConfig::default(),
      network: NetworkConfig::default(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  pub name_prefix: String,
  /// Bumping this discards every previously cached asset and response
  pub version: u32,
  /// Root-relative URLs fetched and stored at install time
  pub static_assets: Vec<String>,
  /// Served to HTML requests when both cache and network fail
  pub offline_page: String,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      name_prefix: "crime-investigation".to_string(),
      version: 1,
      static_assets: [
        "/",
        "/index.html",
        "/static/js/bundle.js",
        "/static/css/main.css",
        "/favicon.ico",
        "/manifest.json",
        "/logo192.png",
        "/logo512.png",
      ]
      .into_iter()
      .map(String::from)
      .collect(),
      offline_page: "/offline.html".to_string(),
    }
  }
}

impl CacheConfig {
  /// Name of the current cache partition, e.g. `crime-investigation-v1`.
  pub fn partition_name(&self) -> String {
    format!("{}-v{}", self.name_prefix, self.version)
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  /// Path segment marking API traffic
  pub path_marker: String,
  pub offline_message: String,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      path_marker: "/api/".to_string(),
      offline_message: "You are offline. This data will sync when you reconnect.".to_string(),
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
  /// Directory holding the cache and queue databases and the log file
  pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  pub tag: String,
  /// Path requested to decide whether the origin is reachable
  pub probe_path: String,
  pub probe_interval_secs: u64,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      tag: "sync-pending-operations".to_string(),
      probe_path: "/".to_string(),
      probe_interval_secs: 15,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
  pub icon: String,
  pub badge: String,
}

impl Default for NotificationConfig {
  fn default() -> Self {
    Self {
      icon: "/logo192.png".to_string(),
      badge: "/badge.png".to_string(),
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
  /// Per-request timeout; requests wait indefinitely when unset
  pub timeout_secs: Option<u64>,
}

impl NetworkConfig {
  pub fn timeout(&self) -> Option<Duration> {
    self.timeout_secs.map(Duration::from_secs)
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./evidence-sync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/evidence-sync/config.yaml
  ///
  /// Falls back to built-in defaults when no file exists. `EVIDENCE_SYNC_ORIGIN`
  /// overrides the configured origin.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };

    if let Ok(origin) = std::env::var("EVIDENCE_SYNC_ORIGIN") {
      config.origin = origin;
    }

    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("evidence-sync.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("evidence-sync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))
  }

  /// Directory for databases and logs.
  pub fn data_dir(&self) -> Result<PathBuf> {
    if let Some(dir) = &self.storage.data_dir {
      return Ok(dir.clone());
    }

    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("evidence-sync"))
  }
}
