//! Application-side entry point for requests.

use chrono::Utc;
use color_eyre::Result;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::CacheStore;
use crate::http::{Request, Response};
use crate::interceptor::{classify, RequestClass};
use crate::net::Network;
use crate::notify::Platform;
use crate::queue::{OperationQueue, PendingOperation, SyncReport};
use crate::worker::{Outcome, ServiceWorker, WorkerEvent};

/// Response plus what happened to the request on the way.
#[derive(Debug)]
pub struct ClientResponse {
  pub response: Response,
  /// Set when the request was a mutation that got queued for later delivery
  pub queued_as: Option<i64>,
}

/// Sends requests through the worker and queues mutations that came back offline.
pub struct OfflineClient<C, Q, N, P> {
  worker: Arc<ServiceWorker<C, Q, N, P>>,
}

impl<C, Q, N, P> OfflineClient<C, Q, N, P>
where
  C: CacheStore,
  Q: OperationQueue,
  N: Network,
  P: Platform,
{
  pub fn new(worker: Arc<ServiceWorker<C, Q, N, P>>) -> Self {
    Self { worker }
  }

  /// Send `request` through the worker.
  ///
  /// A same-origin mutation that never reached the server is queued. That covers
  /// both the offline payload from an active worker and a plain network failure
  /// while the worker is not active (e.g. its install failed offline).
  pub async fn send(&self, request: Request) -> Result<ClientResponse> {
    let queueable =
      request.is_mutating() && classify(&request, self.worker.settings()) != RequestClass::CrossOrigin;

    let response = match self.worker.fetch(request.clone()).await {
      Ok(response) => response,
      Err(e) if queueable => {
        warn!(url = %request.url, error = %e, "Request failed without a response");
        Response::offline(&self.worker.settings().offline_message, Utc::now())?
      }
      Err(e) => return Err(e),
    };

    let queued_as = if queueable && response.offline_payload().is_some() {
      let id = self
        .worker
        .queue()
        .enqueue(PendingOperation::from_request(&request)?)?;
      info!(id, method = %request.method, url = %request.url, "Application is offline, operation queued");
      Some(id)
    } else {
      None
    };

    Ok(ClientResponse {
      response,
      queued_as,
    })
  }

  /// Ask the worker to replay queued operations registered under `tag`.
  ///
  /// `None` when nothing handles the tag.
  pub async fn request_sync(&self, tag: &str) -> Result<Option<SyncReport>> {
    let event = WorkerEvent::Sync {
      tag: tag.to_string(),
    };
    match self.worker.dispatch(event).await? {
      Outcome::Synced(report) => Ok(Some(report)),
      _ => Ok(None),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryCacheStore;
  use crate::notify::HeadlessPlatform;
  use crate::queue::MemoryOperationQueue;
  use crate::testing::{settings, url, ScriptedNetwork};
  use reqwest::Method;
  use url::Url;

  async fn client() -> OfflineClient<MemoryCacheStore, MemoryOperationQueue, ScriptedNetwork, HeadlessPlatform> {
    let cache = MemoryCacheStore::new();
    cache.open("crime-investigation-v1").unwrap();
    let worker = ServiceWorker::new(
      settings(),
      cache,
      MemoryOperationQueue::new(),
      ScriptedNetwork::new(),
      HeadlessPlatform::new(),
    );
    worker.start().await.unwrap();
    OfflineClient::new(Arc::new(worker))
  }

  #[tokio::test]
  async fn test_offline_mutation_is_queued_and_replayed() {
    let client = client().await;
    client.worker.network().set_offline(true);

    let request = Request::new(Method::POST, url("/api/cases/7/notes"))
      .with_header("Content-Type", "application/json")
      .with_body(r#"{"text":"Suspect seen near scene"}"#);
    let sent = client.send(request).await.unwrap();

    assert!(sent.response.offline_payload().is_some());
    let id = sent.queued_as.expect("queued");
    assert_eq!(client.worker.queue().drain().unwrap()[0].id, id);

    client.worker.network().set_offline(false);
    client.worker.network().respond(url("/api/cases/7/notes").as_str(), Response::new(201, "{}"));
    let report = client
      .request_sync("sync-pending-operations")
      .await
      .unwrap()
      .unwrap();
    assert_eq!(report.replayed, vec![id]);
    assert!(client.worker.queue().drain().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_offline_read_is_not_queued() {
    let client = client().await;
    client.worker.network().set_offline(true);

    let sent = client.send(Request::get(url("/api/cases"))).await.unwrap();
    assert!(sent.response.offline_payload().is_some());
    assert!(sent.queued_as.is_none());
    assert!(client.worker.queue().drain().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_online_mutation_goes_straight_through() {
    let client = client().await;
    client.worker.network().respond(url("/api/evidence").as_str(), Response::new(201, r#"{"id":3}"#));

    let sent = client
      .send(Request::new(Method::POST, url("/api/evidence")).with_body("{}"))
      .await
      .unwrap();
    assert_eq!(sent.response.status, 201);
    assert!(sent.queued_as.is_none());
  }

  #[tokio::test]
  async fn test_unknown_sync_tag_does_nothing() {
    let client = client().await;
    assert!(client.request_sync("periodic-refresh").await.unwrap().is_none());
  }

  #[tokio::test]
  async fn test_mutation_is_queued_when_worker_never_installed() {
    let network = ScriptedNetwork::new();
    network.set_offline(true);
    let worker = ServiceWorker::new(
      settings(),
      MemoryCacheStore::new(),
      MemoryOperationQueue::new(),
      network,
      HeadlessPlatform::new(),
    );
    assert!(worker.start().await.is_err());
    let client = OfflineClient::new(Arc::new(worker));

    let sent = client
      .send(Request::new(Method::POST, url("/api/cases")).with_body(r#"{"title":"Burglary"}"#))
      .await
      .unwrap();

    assert!(sent.response.offline_payload().is_some());
    let queued = client.worker.queue().drain().unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(Some(queued[0].id), sent.queued_as);
    assert_eq!(queued[0].operation.body.as_deref(), Some(r#"{"title":"Burglary"}"#));

    // Reads are not queued and still fail.
    assert!(client.send(Request::get(url("/api/cases"))).await.is_err());
    assert_eq!(client.worker.queue().drain().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_failed_cross_origin_mutation_is_not_queued() {
    let client = client().await;
    client.worker.network().set_offline(true);

    let request = Request::new(Method::POST, Url::parse("https://maps.example.com/api/pins").unwrap());
    assert!(client.send(request).await.is_err());
    assert!(client.worker.queue().drain().unwrap().is_empty());
  }
}
