//! Access to the real network.

use color_eyre::{eyre::eyre, Result};
use std::future::Future;
use std::time::Duration;
use url::{Origin, Position, Url};

use crate::http::{Headers, Request, Response, ResponseKind};

/// Anything that can send a request and hand back a complete response.
///
/// An `Err` means the request never produced a response (connection refused,
/// DNS failure, timeout). HTTP error statuses are returned as `Ok`.
pub trait Network: Send + Sync {
  fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response>> + Send;
}

/// Network access backed by reqwest.
#[derive(Clone)]
pub struct ReqwestNetwork {
  client: reqwest::Client,
  origin: Origin,
}

impl ReqwestNetwork {
  /// Create a client for the application served from `origin`.
  pub fn new(origin: &Url, timeout: Option<Duration>) -> Result<Self> {
    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = timeout {
      builder = builder.timeout(timeout);
    }
    let client = builder
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self::with_client(client, origin))
  }

  fn with_client(client: reqwest::Client, origin: &Url) -> Self {
    Self {
      client,
      origin: origin.origin(),
    }
  }
}

/// Whether the response came from somewhere other than the requested URL.
/// Fragments never reach the server, so they are ignored.
fn was_redirected(requested: &Url, final_url: &Url) -> bool {
  requested[..Position::AfterQuery] != final_url[..Position::AfterQuery]
}

impl Network for ReqwestNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    let mut builder = self
      .client
      .request(request.method.clone(), request.url.clone());
    for (name, value) in request.headers.iter() {
      builder = builder.header(name, value);
    }
    if let Some(body) = &request.body {
      builder = builder.body(body.clone());
    }

    let response = builder
      .send()
      .await
      .map_err(|e| eyre!("Request to {} failed: {}", request.url, e))?;

    let kind = if !was_redirected(&request.url, response.url()) && response.url().origin() == self.origin {
      ResponseKind::Basic
    } else {
      ResponseKind::Cors
    };

    let status = response.status().as_u16();
    let mut headers = Headers::new();
    for (name, value) in response.headers() {
      if let Ok(value) = value.to_str() {
        headers.append(name.as_str(), value);
      }
    }

    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read response body from {}: {}", request.url, e))?;

    Ok(Response {
      status,
      headers,
      body: body.to_vec(),
      kind,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;
  use tokio::io::{AsyncReadExt, AsyncWriteExt};
  use tokio::net::TcpListener;

  /// Serve raw HTTP/1.1 replies chosen by request path.
  async fn serve<F>(route: F) -> Url
  where
    F: Fn(&str) -> String + Send + Sync + 'static,
  {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let origin = Url::parse(&format!("http://{}/", listener.local_addr().unwrap())).unwrap();
    let route = Arc::new(route);

    tokio::spawn(async move {
      while let Ok((mut socket, _)) = listener.accept().await {
        let route = route.clone();
        tokio::spawn(async move {
          let mut head = Vec::new();
          let mut chunk = [0u8; 1024];
          while !head.windows(4).any(|w| w == b"\r\n\r\n") {
            match socket.read(&mut chunk).await {
              Ok(0) | Err(_) => return,
              Ok(n) => head.extend_from_slice(&chunk[..n]),
            }
          }
          let head = String::from_utf8_lossy(&head).to_string();
          let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();
          let _ = socket.write_all(route(&path).as_bytes()).await;
          let _ = socket.shutdown().await;
        });
      }
    });

    origin
  }

  fn reply(status: &str, extra_headers: &[&str], body: &str) -> String {
    let mut out = format!(
      "HTTP/1.1 {}\r\ncontent-length: {}\r\nconnection: close\r\n",
      status,
      body.len()
    );
    for header in extra_headers {
      out.push_str(header);
      out.push_str("\r\n");
    }
    out.push_str("\r\n");
    out.push_str(body);
    out
  }

  fn site(path: &str) -> String {
    match path {
      "/old" => reply("301 Moved Permanently", &["location: /index.html"], ""),
      "/cookies" => reply(
        "200 OK",
        &["set-cookie: a=1", "set-cookie: b=2", "vary: Accept", "vary: Origin"],
        "ok",
      ),
      _ => reply("200 OK", &["content-type: text/html"], "<h1>Cases</h1>"),
    }
  }

  fn network(origin: &Url) -> ReqwestNetwork {
    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    ReqwestNetwork::with_client(client, origin)
  }

  #[test]
  fn test_fragment_is_not_a_redirect() {
    let requested = Url::parse("http://localhost:3000/index.html#top").unwrap();
    let served = Url::parse("http://localhost:3000/index.html").unwrap();
    assert!(!was_redirected(&requested, &served));

    let moved = Url::parse("http://localhost:3000/index.html?v=2").unwrap();
    assert!(was_redirected(&requested, &moved));
  }

  #[tokio::test]
  async fn test_response_kind() {
    let origin = serve(site).await;
    let net = network(&origin);

    let plain = net.fetch(&Request::get(origin.join("/index.html").unwrap())).await.unwrap();
    assert_eq!(plain.status, 200);
    assert_eq!(plain.kind, ResponseKind::Basic);
    assert_eq!(plain.body, b"<h1>Cases</h1>");

    let with_fragment = net.fetch(&Request::get(origin.join("/index.html#top").unwrap())).await.unwrap();
    assert_eq!(with_fragment.kind, ResponseKind::Basic);
    assert!(with_fragment.is_cacheable_asset());

    let redirected = net.fetch(&Request::get(origin.join("/old").unwrap())).await.unwrap();
    assert_eq!(redirected.status, 200);
    assert_eq!(redirected.kind, ResponseKind::Cors);
  }

  #[tokio::test]
  async fn test_other_origin_is_cors() {
    let server = serve(site).await;
    let net = network(&Url::parse("http://localhost:3000/").unwrap());

    let response = net.fetch(&Request::get(server.join("/index.html").unwrap())).await.unwrap();
    assert_eq!(response.kind, ResponseKind::Cors);
  }

  #[tokio::test]
  async fn test_repeated_response_headers_are_kept() {
    let origin = serve(site).await;
    let net = network(&origin);

    let response = net.fetch(&Request::get(origin.join("/cookies").unwrap())).await.unwrap();
    assert_eq!(response.headers.get_all("set-cookie"), ["a=1", "b=2"]);
    assert_eq!(response.headers.get_all("vary"), ["Accept", "Origin"]);
  }

  #[tokio::test]
  async fn test_unreachable_host_is_an_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let origin = Url::parse(&format!("http://{}/", addr)).unwrap();
    let err = network(&origin).fetch(&Request::get(origin.clone())).await.unwrap_err();
    assert!(err.to_string().contains("failed"));
  }
}
