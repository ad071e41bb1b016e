//! Request and response values passed between the interceptor, the cache and the network.
//!
//! Responses are plain owned values: cloning one gives an independent copy that can be
//! both returned to the caller and handed to the cache store.

use chrono::{DateTime, SecondsFormat, Utc};
use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// Header set with case-insensitive (lowercased) names.
///
/// A name may carry several values (`set-cookie`, `vary`); they keep the order
/// in which they were received.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(BTreeMap<String, Vec<String>>);

impl Headers {
  pub fn new() -> Self {
    Self::default()
  }

  /// Headers for a JSON body.
  pub fn json() -> Self {
    let mut headers = Self::new();
    headers.insert("Content-Type", "application/json");
    headers
  }

  /// Set a header, replacing every previous value for the same name.
  pub fn insert(&mut self, name: &str, value: impl Into<String>) {
    self.0.insert(name.to_ascii_lowercase(), vec![value.into()]);
  }

  /// Add a value, keeping the ones already present.
  pub fn append(&mut self, name: &str, value: impl Into<String>) {
    self
      .0
      .entry(name.to_ascii_lowercase())
      .or_default()
      .push(value.into());
  }

  /// First value for `name`.
  pub fn get(&self, name: &str) -> Option<&str> {
    self
      .0
      .get(&name.to_ascii_lowercase())
      .and_then(|values| values.first())
      .map(String::as_str)
  }

  #[cfg(test)]
  pub fn get_all(&self, name: &str) -> &[String] {
    self
      .0
      .get(&name.to_ascii_lowercase())
      .map(Vec::as_slice)
      .unwrap_or(&[])
  }

  /// Every (name, value) pair; repeated names appear once per value.
  pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
    self
      .0
      .iter()
      .flat_map(|(k, values)| values.iter().map(move |v| (k.as_str(), v.as_str())))
  }

  /// Parse a `Name: value` line as given on the command line.
  pub fn parse_line(line: &str) -> Result<(String, String)> {
    let (name, value) = line
      .split_once(':')
      .ok_or_else(|| eyre!("Invalid header '{}', expected 'Name: value'", line))?;
    let name = name.trim();
    if name.is_empty() {
      return Err(eyre!("Invalid header '{}', name is empty", line));
    }
    Ok((name.to_string(), value.trim().to_string()))
  }
}

/// An outgoing request as issued by the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  pub headers: Headers,
  pub body: Option<Vec<u8>>,
}

impl Request {
  pub fn new(method: Method, url: Url) -> Self {
    Self {
      method,
      url,
      headers: Headers::new(),
      body: None,
    }
  }

  pub fn get(url: Url) -> Self {
    Self::new(Method::GET, url)
  }

  #[cfg(test)]
  pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
    self.headers.insert(name, value);
    self
  }

  #[cfg(test)]
  pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
    self.body = Some(body.into());
    self
  }

  /// Whether the caller expects an HTML document back.
  ///
  /// A request without an `Accept` header never does.
  pub fn accepts_html(&self) -> bool {
    self
      .headers
      .get("accept")
      .map(|accept| accept.contains("text/html"))
      .unwrap_or(false)
  }

  /// Anything other than GET/HEAD/OPTIONS changes server state.
  pub fn is_mutating(&self) -> bool {
    !matches!(self.method, Method::GET | Method::HEAD | Method::OPTIONS)
  }
}

/// How the response relates to the application origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
  /// Same-origin, not redirected
  Basic,
  /// Cross-origin or redirected, readable
  Cors,
  /// Cross-origin, unreadable
  Opaque,
}

impl ResponseKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Basic => "basic",
      Self::Cors => "cors",
      Self::Opaque => "opaque",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "basic" => Ok(Self::Basic),
      "cors" => Ok(Self::Cors),
      "opaque" => Ok(Self::Opaque),
      other => Err(eyre!("Unknown response kind '{}'", other)),
    }
  }
}

/// A captured response: status, headers and the full body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
  pub status: u16,
  pub headers: Headers,
  pub body: Vec<u8>,
  pub kind: ResponseKind,
}

impl Response {
  /// A same-origin response with the given status and body.
  #[cfg(test)]
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      headers: Headers::new(),
      body: body.into(),
      kind: ResponseKind::Basic,
    }
  }

  #[cfg(test)]
  pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
    self.headers.insert(name, value);
    self
  }

  #[cfg(test)]
  pub fn with_kind(mut self, kind: ResponseKind) -> Self {
    self.kind = kind;
    self
  }

  /// 2xx status.
  pub fn is_ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Eligible for the static asset cache: exactly 200 and same-origin.
  pub fn is_cacheable_asset(&self) -> bool {
    self.status == 200 && self.kind == ResponseKind::Basic
  }

  /// Synthesized answer for an API request that could not reach the network
  /// and has nothing cached. It is deliberately a 200: callers detect the
  /// degraded state through the `offline` field.
  pub fn offline(message: &str, now: DateTime<Utc>) -> Result<Self> {
    let payload = OfflinePayload {
      error: message.to_string(),
      offline: true,
      timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
    };
    let body = serde_json::to_vec(&payload)
      .map_err(|e| eyre!("Failed to serialize offline payload: {}", e))?;

    Ok(Self {
      status: 200,
      headers: Headers::json(),
      body,
      kind: ResponseKind::Basic,
    })
  }

  /// The offline marker, if this response carries one.
  pub fn offline_payload(&self) -> Option<OfflinePayload> {
    let is_json = self
      .headers
      .get("content-type")
      .map(|ct| ct.starts_with("application/json"))
      .unwrap_or(false);
    if !is_json {
      return None;
    }

    serde_json::from_slice::<OfflinePayload>(&self.body)
      .ok()
      .filter(|payload| payload.offline)
  }
}

/// Body of the synthesized offline API response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflinePayload {
  pub error: String,
  pub offline: bool,
  /// ISO-8601, UTC
  pub timestamp: String,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
  }

  #[test]
  fn test_headers_are_case_insensitive() {
    let mut headers = Headers::new();
    headers.insert("Content-Type", "text/plain");
    headers.insert("content-type", "application/json");

    assert_eq!(headers.get("CONTENT-TYPE"), Some("application/json"));
    assert_eq!(headers.iter().count(), 1);
  }

  #[test]
  fn test_repeated_headers_keep_every_value() {
    let mut headers = Headers::new();
    headers.append("Set-Cookie", "a=1");
    headers.append("set-cookie", "b=2");
    headers.append("Vary", "Accept");

    assert_eq!(headers.get("set-cookie"), Some("a=1"));
    assert_eq!(headers.get_all("SET-COOKIE"), ["a=1", "b=2"]);
    assert_eq!(headers.iter().count(), 3);
    assert!(headers.get_all("link").is_empty());

    headers.insert("set-cookie", "c=3");
    assert_eq!(headers.get_all("set-cookie"), ["c=3"]);
  }

  #[test]
  fn test_parse_header_line() {
    let (name, value) = Headers::parse_line("Authorization: Bearer abc:def").unwrap();
    assert_eq!(name, "Authorization");
    assert_eq!(value, "Bearer abc:def");

    assert!(Headers::parse_line("no-colon").is_err());
    assert!(Headers::parse_line(": value").is_err());
  }

  #[test]
  fn test_accepts_html() {
    let req = Request::get(url("http://localhost:3000/cases"))
      .with_header("Accept", "text/html,application/xhtml+xml");
    assert!(req.accepts_html());

    let req = Request::get(url("http://localhost:3000/logo192.png")).with_header("Accept", "image/*");
    assert!(!req.accepts_html());

    let req = Request::get(url("http://localhost:3000/logo192.png"));
    assert!(!req.accepts_html());
  }

  #[test]
  fn test_is_mutating() {
    let target = url("http://localhost:3000/api/cases");
    assert!(!Request::get(target.clone()).is_mutating());
    assert!(Request::new(Method::POST, target.clone()).is_mutating());
    assert!(Request::new(Method::DELETE, target).is_mutating());
  }

  #[test]
  fn test_offline_response_shape() {
    let now = Utc::now();
    let response = Response::offline("You are offline.", now).unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.headers.get("content-type"), Some("application/json"));

    let payload = response.offline_payload().expect("offline marker");
    assert!(payload.offline);
    assert!(!payload.error.is_empty());
    let parsed = DateTime::parse_from_rfc3339(&payload.timestamp).unwrap();
    assert_eq!(parsed.timestamp_millis(), now.timestamp_millis());
  }

  #[test]
  fn test_regular_json_is_not_offline() {
    let response = Response::new(200, r#"{"cases": []}"#).with_header("Content-Type", "application/json");
    assert!(response.offline_payload().is_none());

    let response = Response::new(200, r#"{"error":"x","offline":false,"timestamp":"t"}"#)
      .with_header("Content-Type", "application/json");
    assert!(response.offline_payload().is_none());
  }

  #[test]
  fn test_cacheable_asset() {
    assert!(Response::new(200, "ok").is_cacheable_asset());
    assert!(!Response::new(404, "missing").is_cacheable_asset());
    assert!(!Response::new(200, "").with_kind(ResponseKind::Opaque).is_cacheable_asset());
    assert!(!Response::new(200, "x").with_kind(ResponseKind::Cors).is_cacheable_asset());
  }
}
