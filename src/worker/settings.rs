use color_eyre::{eyre::eyre, Result};
use url::Url;

use crate::config::Config;

/// Resolved, immutable settings shared by every event handler.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
  /// Application origin; paths are resolved against it
  pub origin: Url,
  /// Current cache partition; every other partition is stale
  pub cache_name: String,
  pub static_assets: Vec<Url>,
  pub offline_page: Url,
  pub api_marker: String,
  pub offline_message: String,
  pub sync_tag: String,
  pub notification_icon: String,
  pub notification_badge: String,
}

impl WorkerSettings {
  pub fn from_config(config: &Config) -> Result<Self> {
    let origin = Url::parse(&config.origin)
      .map_err(|e| eyre!("Invalid origin '{}': {}", config.origin, e))?;
    if origin.cannot_be_a_base() {
      return Err(eyre!("Invalid origin '{}': not a base URL", config.origin));
    }

    let resolve = |path: &str| {
      origin
        .join(path)
        .map_err(|e| eyre!("Invalid path '{}': {}", path, e))
    };

    let static_assets = config
      .cache
      .static_assets
      .iter()
      .map(|path| resolve(path))
      .collect::<Result<Vec<_>>>()?;

    Ok(Self {
      cache_name: config.cache.partition_name(),
      static_assets,
      offline_page: resolve(&config.cache.offline_page)?,
      api_marker: config.api.path_marker.clone(),
      offline_message: config.api.offline_message.clone(),
      sync_tag: config.sync.tag.clone(),
      notification_icon: config.notifications.icon.clone(),
      notification_badge: config.notifications.badge.clone(),
      origin,
    })
  }

  /// Resolve a root-relative path against the origin.
  pub fn resolve(&self, path: &str) -> Result<Url> {
    self
      .origin
      .join(path)
      .map_err(|e| eyre!("Invalid path '{}': {}", path, e))
  }
}
