//! Request classification and the two caching strategies.
//!
//! API traffic is network-first: live data wins, the cache is a fallback, and a
//! synthesized offline payload is the last resort so callers never see a failed
//! request. Everything else is cache-first: a cached copy is served without
//! touching the network.

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::CacheStore;
use crate::http::{Request, Response};
use crate::net::Network;
use crate::worker::WorkerSettings;

/// Which strategy a request gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
  /// Different origin; not intercepted at all
  CrossOrigin,
  /// Path contains the API marker; network-first
  Api,
  /// Everything else on our origin; cache-first
  Static,
}

/// Classify a request against the application origin and API marker.
pub fn classify(request: &Request, settings: &WorkerSettings) -> RequestClass {
  if request.url.origin() != settings.origin.origin() {
    RequestClass::CrossOrigin
  } else if request.url.path().contains(&settings.api_marker) {
    RequestClass::Api
  } else {
    RequestClass::Static
  }
}

/// Executes the caching strategies against a cache store and the network.
pub struct FetchInterceptor<C, N> {
  settings: Arc<WorkerSettings>,
  cache: Arc<C>,
  network: Arc<N>,
}

impl<C, N> FetchInterceptor<C, N>
where
  C: CacheStore,
  N: Network,
{
  pub fn new(settings: Arc<WorkerSettings>, cache: Arc<C>, network: Arc<N>) -> Self {
    Self {
      settings,
      cache,
      network,
    }
  }

  /// Network, then cache, then the offline payload.
  ///
  /// Only storage errors during the cache lookup can make this fail.
  pub async fn network_first(&self, request: &Request) -> Result<Response> {
    match self.network.fetch(request).await {
      Ok(response) => {
        if request.method == Method::GET {
          self.store(request, response.clone()).await;
        }
        Ok(response)
      }
      Err(e) => {
        debug!(url = %request.url, error = %e, "Network unavailable, trying cache");

        if let Some(cached) = self.cache.match_request(request)? {
          info!(url = %request.url, "Serving cached API response");
          return Ok(cached);
        }

        info!(url = %request.url, "No cached API response, returning offline payload");
        Response::offline(&self.settings.offline_message, Utc::now())
      }
    }
  }

  /// Cache, then network. Falls back to the offline page for HTML requests.
  pub async fn cache_first(&self, request: &Request) -> Result<Response> {
    if let Some(cached) = self.cache.match_request(request)? {
      debug!(url = %request.url, "Cache hit");
      return Ok(cached);
    }

    match self.network.fetch(request).await {
      Ok(response) => {
        if response.is_cacheable_asset() && request.method == Method::GET {
          self.store(request, response.clone()).await;
        } else {
          debug!(
            url = %request.url,
            status = response.status,
            kind = response.kind.as_str(),
            "Response not cacheable"
          );
        }
        Ok(response)
      }
      Err(e) if request.accepts_html() => {
        debug!(url = %request.url, error = %e, "Network unavailable, serving offline page");
        let offline_page = Request::get(self.settings.offline_page.clone());
        self.cache.match_request(&offline_page)?.ok_or_else(|| {
          eyre!(
            "Failed to fetch {} and no offline page is cached: {}",
            request.url,
            e
          )
        })
      }
      Err(e) => Err(e),
    }
  }

  /// Best-effort write into the current partition, on the blocking pool.
  /// Failures are only logged.
  async fn store(&self, request: &Request, response: Response) {
    let cache = self.cache.clone();
    let name = self.settings.cache_name.clone();
    let key = request.clone();

    let write = tokio::task::spawn_blocking(move || {
      let handle = cache.open(&name)?;
      cache.put(&handle, &key, response)
    });

    let result = match write.await {
      Ok(result) => result,
      Err(e) => Err(eyre!("Cache write task failed: {}", e)),
    };

    if let Err(e) = result {
      warn!(url = %request.url, error = %e, "Failed to cache response");
    }
  }
}
