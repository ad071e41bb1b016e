//! Operations waiting to be delivered.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::http::{Headers, Request};

/// A mutating request that could not reach the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOperation {
  pub url: String,
  pub method: String,
  pub headers: Headers,
  /// Request body as sent by the application, usually JSON
  pub body: Option<String>,
}

impl PendingOperation {
  /// Capture a request for later replay.
  pub fn from_request(request: &Request) -> Result<Self> {
    let body = request
      .body
      .as_ref()
      .map(|bytes| {
        String::from_utf8(bytes.clone())
          .map_err(|e| eyre!("Cannot queue {} {}: body is not UTF-8: {}", request.method, request.url, e))
      })
      .transpose()?;

    Ok(Self {
      url: request.url.to_string(),
      method: request.method.to_string(),
      headers: request.headers.clone(),
      body,
    })
  }

  /// Rebuild the request. A stored body must be valid JSON.
  pub fn to_request(&self) -> Result<Request> {
    let url = Url::parse(&self.url).map_err(|e| eyre!("Invalid queued URL {}: {}", self.url, e))?;
    let method = Method::from_bytes(self.method.as_bytes())
      .map_err(|e| eyre!("Invalid queued method {}: {}", self.method, e))?;

    let mut request = Request::new(method, url);
    request.headers = self.headers.clone();

    if let Some(body) = &self.body {
      let json: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| eyre!("Queued body for {} {} is not valid JSON: {}", self.method, self.url, e))?;
      let bytes =
        serde_json::to_vec(&json).map_err(|e| eyre!("Failed to serialize queued body: {}", e))?;
      request.body = Some(bytes);
    }

    Ok(request)
  }
}

/// A pending operation as held by the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedOperation {
  /// Assigned by the queue, increasing in insertion order
  pub id: i64,
  pub operation: PendingOperation,
  pub queued_at: DateTime<Utc>,
}
