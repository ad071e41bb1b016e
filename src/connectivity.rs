//! Watches whether the origin is reachable and triggers a sync when it comes back.

use color_eyre::Result;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

use crate::cache::CacheStore;
use crate::http::Request;
use crate::net::Network;
use crate::notify::Platform;
use crate::queue::OperationQueue;
use crate::worker::{Outcome, ServiceWorker, WorkerEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
  Online,
  Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
  CameOnline,
  WentOffline,
}

/// The transition between two observations, if any.
///
/// The very first observation always reports one, so a monitor that starts
/// online still delivers what earlier runs left queued.
pub fn transition(previous: Option<Connectivity>, current: Connectivity) -> Option<Transition> {
  match (previous, current) {
    (Some(Connectivity::Offline) | None, Connectivity::Online) => Some(Transition::CameOnline),
    (Some(Connectivity::Online) | None, Connectivity::Offline) => Some(Transition::WentOffline),
    _ => None,
  }
}

/// Any HTTP response from the probe URL means the origin is reachable.
pub async fn probe<N: Network + ?Sized>(network: &N, probe_url: &Url) -> Connectivity {
  match network.fetch(&Request::get(probe_url.clone())).await {
    Ok(_) => Connectivity::Online,
    Err(_) => Connectivity::Offline,
  }
}

/// Periodically probes the origin and fires the sync event on reconnect.
pub struct ConnectivityMonitor {
  probe_url: Url,
  interval: Duration,
  state: Option<Connectivity>,
}

impl ConnectivityMonitor {
  pub fn new(probe_url: Url, interval: Duration) -> Self {
    Self {
      probe_url,
      interval,
      state: None,
    }
  }

  /// Probe once, record the result and react to a transition.
  pub async fn check<C, Q, N, P>(
    &mut self,
    worker: &ServiceWorker<C, Q, N, P>,
  ) -> Result<Option<Transition>>
  where
    C: CacheStore,
    Q: OperationQueue,
    N: Network,
    P: Platform,
  {
    let current = probe(worker.network(), &self.probe_url).await;
    let change = transition(self.state, current);
    self.state = Some(current);

    match change {
      Some(Transition::CameOnline) => {
        info!("Application is online. Syncing data...");
        let tag = worker.settings().sync_tag.clone();
        if let Outcome::Synced(report) = worker.dispatch(WorkerEvent::Sync { tag }).await? {
          info!(
            replayed = report.replayed.len(),
            remaining = report.failed.len(),
            "Background sync finished"
          );
        }
      }
      Some(Transition::WentOffline) => {
        warn!("Application is offline. Operations will be queued.");
      }
      None => {}
    }

    Ok(change)
  }

  /// Run until Ctrl-C.
  pub async fn run<C, Q, N, P>(mut self, worker: &ServiceWorker<C, Q, N, P>) -> Result<()>
  where
    C: CacheStore,
    Q: OperationQueue,
    N: Network,
    P: Platform,
  {
    let mut ticker = tokio::time::interval(self.interval);
    info!(url = %self.probe_url, interval = ?self.interval, "Watching connectivity");

    loop {
      tokio::select! {
        _ = ticker.tick() => {
          if let Err(e) = self.check(worker).await {
            warn!(error = %e, "Connectivity check failed");
          }
        }
        _ = tokio::signal::ctrl_c() => {
          info!("Stopping connectivity monitor");
          return Ok(());
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryCacheStore;
  use crate::http::{Headers, Response};
  use crate::notify::HeadlessPlatform;
  use crate::queue::{MemoryOperationQueue, PendingOperation};
  use crate::testing::{settings, url, ScriptedNetwork};

  #[test]
  fn test_transitions() {
    use Connectivity::*;
    assert_eq!(transition(None, Online), Some(Transition::CameOnline));
    assert_eq!(transition(None, Offline), Some(Transition::WentOffline));
    assert_eq!(transition(Some(Online), Offline), Some(Transition::WentOffline));
    assert_eq!(transition(Some(Offline), Online), Some(Transition::CameOnline));
    assert_eq!(transition(Some(Online), Online), None);
    assert_eq!(transition(Some(Offline), Offline), None);
  }

  #[tokio::test]
  async fn test_reconnect_replays_queue() {
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
    worker
      .queue()
      .enqueue(PendingOperation {
        url: url("/api/suspects").to_string(),
        method: "POST".to_string(),
        headers: Headers::json(),
        body: Some(r#"{"name":"J. Doe"}"#.to_string()),
      })
      .unwrap();
    worker
      .network()
      .respond(url("/api/suspects").as_str(), Response::new(201, "{}"));

    let mut monitor = ConnectivityMonitor::new(url("/"), Duration::from_secs(15));

    worker.network().set_offline(true);
    assert_eq!(monitor.check(&worker).await.unwrap(), Some(Transition::WentOffline));
    assert_eq!(monitor.check(&worker).await.unwrap(), None);
    assert_eq!(worker.queue().drain().unwrap().len(), 1);

    worker.network().set_offline(false);
    assert_eq!(monitor.check(&worker).await.unwrap(), Some(Transition::CameOnline));
    assert!(worker.queue().drain().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_starting_online_replays_leftovers() {
    let queue = MemoryOperationQueue::new();
    queue
      .enqueue(PendingOperation {
        url: url("/api/cases/3").to_string(),
        method: "DELETE".to_string(),
        headers: Headers::new(),
        body: None,
      })
      .unwrap();
    let cache = MemoryCacheStore::new();
    cache.open("crime-investigation-v1").unwrap();
    let worker = ServiceWorker::new(
      settings(),
      cache,
      queue,
      ScriptedNetwork::new(),
      HeadlessPlatform::new(),
    );
    worker.start().await.unwrap();
    worker
      .network()
      .respond(url("/api/cases/3").as_str(), Response::new(204, ""));

    let mut monitor = ConnectivityMonitor::new(url("/"), Duration::from_secs(15));
    assert_eq!(monitor.check(&worker).await.unwrap(), Some(Transition::CameOnline));
    assert!(worker.queue().drain().unwrap().is_empty());

    assert_eq!(monitor.check(&worker).await.unwrap(), None);
  }
}
