//! Test doubles shared by the module tests.

use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use url::Url;

use crate::config::Config;
use crate::http::{Request, Response};
use crate::net::Network;
use crate::worker::WorkerSettings;

enum Scripted {
  Respond(Response),
  Fail,
}

/// Network fake with per-URL scripted outcomes.
///
/// Unscripted URLs answer 404. Every call is recorded, including failed ones.
#[derive(Default)]
pub struct ScriptedNetwork {
  routes: Mutex<HashMap<String, Scripted>>,
  calls: Mutex<Vec<(String, String)>>,
  offline: AtomicBool,
}

impl ScriptedNetwork {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn respond(&self, url: &str, response: Response) {
    self
      .routes
      .lock()
      .unwrap()
      .insert(url.to_string(), Scripted::Respond(response));
  }

  pub fn fail(&self, url: &str) {
    self
      .routes
      .lock()
      .unwrap()
      .insert(url.to_string(), Scripted::Fail);
  }

  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  /// Number of requests sent to `url`.
  pub fn calls_to(&self, url: &str) -> usize {
    self
      .calls
      .lock()
      .unwrap()
      .iter()
      .filter(|(_, u)| u == url)
      .count()
  }

  /// All requests in order, as `(method, url)`.
  pub fn calls(&self) -> Vec<(String, String)> {
    self.calls.lock().unwrap().clone()
  }
}

impl Network for ScriptedNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    let url = request.url.to_string();
    self
      .calls
      .lock()
      .unwrap()
      .push((request.method.to_string(), url.clone()));

    if self.offline.load(Ordering::SeqCst) {
      return Err(eyre!("network unreachable: {}", url));
    }

    match self.routes.lock().unwrap().get(&url) {
      Some(Scripted::Respond(response)) => Ok(response.clone()),
      Some(Scripted::Fail) => Err(eyre!("connection reset: {}", url)),
      None => Ok(Response::new(404, "not found")),
    }
  }
}

pub const ORIGIN: &str = "http://localhost:3000";

pub fn url(path: &str) -> Url {
  Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

/// Worker settings built from the default configuration.
pub fn settings() -> WorkerSettings {
  WorkerSettings::from_config(&Config::default()).unwrap()
}
