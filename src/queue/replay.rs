//! Delivering queued operations once the network is back.

use color_eyre::Result;
use tracing::{debug, info, warn};

use super::storage::OperationQueue;
use crate::net::Network;

/// Outcome of one replay pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
  /// Delivered and removed from the queue
  pub replayed: Vec<i64>,
  /// Still queued for the next pass
  pub failed: Vec<i64>,
}

impl SyncReport {
  pub fn attempted(&self) -> usize {
    self.replayed.len() + self.failed.len()
  }
}

/// Replay every queued operation once, oldest first.
///
/// An operation is removed only after a 2xx response. Anything else, including a
/// body that no longer parses, leaves it queued and the pass moves on. Operations
/// enqueued while the pass runs wait for the next one.
pub async fn replay_pending<Q, N>(queue: &Q, network: &N) -> Result<SyncReport>
where
  Q: OperationQueue + ?Sized,
  N: Network,
{
  let pending = queue.drain()?;
  let mut report = SyncReport::default();

  if pending.is_empty() {
    debug!("No pending operations to sync");
    return Ok(report);
  }

  info!(count = pending.len(), "Syncing pending operations");

  for queued in pending {
    let id = queued.id;
    let op = &queued.operation;

    let request = match op.to_request() {
      Ok(request) => request,
      Err(e) => {
        warn!(id, url = %op.url, error = %e, "Failed to sync operation");
        report.failed.push(id);
        continue;
      }
    };

    match network.fetch(&request).await {
      Ok(response) if response.is_ok() => match queue.remove(id) {
        Ok(()) => {
          debug!(id, method = %op.method, url = %op.url, status = response.status, "Operation synced");
          report.replayed.push(id);
        }
        Err(e) => {
          warn!(id, error = %e, "Operation delivered but could not be removed from queue");
          report.failed.push(id);
        }
      },
      Ok(response) => {
        warn!(id, url = %op.url, status = response.status, "Server rejected queued operation");
        report.failed.push(id);
      }
      Err(e) => {
        warn!(id, url = %op.url, error = %e, "Failed to sync operation");
        report.failed.push(id);
      }
    }
  }

  info!(
    replayed = report.replayed.len(),
    remaining = report.failed.len(),
    "Sync pass finished"
  );

  Ok(report)
}
