//! Operation queue trait and its SQLite and in-memory implementations.

use chrono::{DateTime, NaiveDateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::params;
use std::path::Path;
use std::sync::Mutex;

use super::operation::{PendingOperation, QueuedOperation};
use crate::db::Database;
use crate::http::Headers;

/// FIFO store of operations awaiting delivery.
pub trait OperationQueue: Send + Sync {
  /// Append an operation and return its assigned id. Never touches the network.
  fn enqueue(&self, operation: PendingOperation) -> Result<i64>;

  /// Every queued operation, oldest first. Nothing is removed.
  fn drain(&self) -> Result<Vec<QueuedOperation>>;

  /// Remove one operation after it was delivered.
  fn remove(&self, id: i64) -> Result<()>;
}

/// Schema for the pending operation store.
const QUEUE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS pending_operations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL,
    method TEXT NOT NULL,
    headers TEXT NOT NULL,
    body TEXT,
    queued_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// Operation queue persisted in SQLite; survives restarts.
pub struct SqliteOperationQueue {
  db: Database,
}

impl SqliteOperationQueue {
  /// Open the queue database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    Ok(Self {
      db: Database::open(path, QUEUE_SCHEMA)?,
    })
  }
}

impl OperationQueue for SqliteOperationQueue {
  fn enqueue(&self, operation: PendingOperation) -> Result<i64> {
    let headers = serde_json::to_string(&operation.headers)
      .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

    let conn = self.db.conn()?;
    conn
      .execute(
        "INSERT INTO pending_operations (url, method, headers, body, queued_at)
         VALUES (?, ?, ?, ?, datetime('now'))",
        params![operation.url, operation.method, headers, operation.body],
      )
      .map_err(|e| eyre!("Failed to queue {} {}: {}", operation.method, operation.url, e))?;

    Ok(conn.last_insert_rowid())
  }

  fn drain(&self) -> Result<Vec<QueuedOperation>> {
    let conn = self.db.conn()?;
    let mut stmt = conn
      .prepare(
        "SELECT id, url, method, headers, body, queued_at FROM pending_operations ORDER BY id",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let rows = stmt
      .query_map([], |row| {
        Ok((
          row.get::<_, i64>(0)?,
          row.get::<_, String>(1)?,
          row.get::<_, String>(2)?,
          row.get::<_, String>(3)?,
          row.get::<_, Option<String>>(4)?,
          row.get::<_, String>(5)?,
        ))
      })
      .map_err(|e| eyre!("Failed to read pending operations: {}", e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read pending operation: {}", e))?;

    rows
      .into_iter()
      .map(|(id, url, method, headers, body, queued_at)| {
        let headers: Headers = serde_json::from_str(&headers)
          .map_err(|e| eyre!("Failed to deserialize headers of operation {}: {}", id, e))?;
        Ok(QueuedOperation {
          id,
          operation: PendingOperation {
            url,
            method,
            headers,
            body,
          },
          queued_at: parse_datetime(&queued_at)?,
        })
      })
      .collect()
  }

  fn remove(&self, id: i64) -> Result<()> {
    let conn = self.db.conn()?;
    conn
      .execute("DELETE FROM pending_operations WHERE id = ?", params![id])
      .map_err(|e| eyre!("Failed to remove pending operation {}: {}", id, e))?;
    Ok(())
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

/// Queue that is lost when the process exits.
#[derive(Default)]
pub struct MemoryOperationQueue {
  inner: Mutex<(i64, Vec<QueuedOperation>)>,
}

impl MemoryOperationQueue {
  pub fn new() -> Self {
    Self::default()
  }
}

impl OperationQueue for MemoryOperationQueue {
  fn enqueue(&self, operation: PendingOperation) -> Result<i64> {
    let mut inner = self.inner.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    inner.0 += 1;
    let id = inner.0;
    inner.1.push(QueuedOperation {
      id,
      operation,
      queued_at: Utc::now(),
    });
    Ok(id)
  }

  fn drain(&self) -> Result<Vec<QueuedOperation>> {
    let inner = self.inner.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(inner.1.clone())
  }

  fn remove(&self, id: i64) -> Result<()> {
    let mut inner = self.inner.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    inner.1.retain(|op| op.id != id);
    Ok(())
  }
}
