//! SQLite-backed cache store.

use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use rusqlite::{params, OptionalExtension};
use std::path::Path;

use super::key::RequestKey;
use super::store::{CacheHandle, CacheStore};
use crate::db::Database;
use crate::http::{Headers, Request, Response, ResponseKind};

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS cache_partitions (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- rowid grows with every insert or replace, so it orders entries by store time
CREATE TABLE IF NOT EXISTS cache_entries (
    partition TEXT NOT NULL,
    key_hash TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    kind TEXT NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    stored_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (partition, key_hash),
    FOREIGN KEY (partition) REFERENCES cache_partitions(name) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_key ON cache_entries(key_hash);
"#;

/// Cache partitions persisted in a SQLite database.
pub struct SqliteCacheStore {
  db: Database,
}

impl SqliteCacheStore {
  /// Open the cache database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    Ok(Self {
      db: Database::open(path, CACHE_SCHEMA)?,
    })
  }

  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self> {
    Ok(Self {
      db: Database::open_in_memory(CACHE_SCHEMA)?,
    })
  }
}

impl CacheStore for SqliteCacheStore {
  fn open(&self, name: &str) -> Result<CacheHandle> {
    let conn = self.db.conn()?;
    conn
      .execute(
        "INSERT OR IGNORE INTO cache_partitions (name) VALUES (?)",
        params![name],
      )
      .map_err(|e| eyre!("Failed to open cache partition {}: {}", name, e))?;

    Ok(CacheHandle::new(name))
  }

  fn put(&self, handle: &CacheHandle, request: &Request, response: Response) -> Result<()> {
    if request.method != Method::GET {
      return Err(eyre!(
        "Cannot cache {} {}: only GET requests are cacheable",
        request.method,
        request.url
      ));
    }

    let key = RequestKey::from_request(request);
    let headers = serde_json::to_string(&response.headers)
      .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

    let conn = self.db.conn()?;
    conn
      .execute(
        "INSERT OR IGNORE INTO cache_partitions (name) VALUES (?)",
        params![handle.name()],
      )
      .map_err(|e| eyre!("Failed to open cache partition {}: {}", handle.name(), e))?;
    conn
      .execute(
        "INSERT OR REPLACE INTO cache_entries (partition, key_hash, method, url, status, kind, headers, body, stored_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))",
        params![
          handle.name(),
          key.hash(),
          key.method,
          key.url,
          response.status,
          response.kind.as_str(),
          headers,
          response.body
        ],
      )
      .map_err(|e| eyre!("Failed to store {} in cache: {}", key.url, e))?;

    Ok(())
  }

  fn match_request(&self, request: &Request) -> Result<Option<Response>> {
    if request.method != Method::GET {
      return Ok(None);
    }

    let key = RequestKey::from_request(request);
    let conn = self.db.conn()?;

    let row: Option<(u16, String, String, Vec<u8>)> = conn
      .query_row(
        "SELECT status, kind, headers, body FROM cache_entries
         WHERE key_hash = ?
         ORDER BY rowid DESC
         LIMIT 1",
        params![key.hash()],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up {} in cache: {}", key.url, e))?;

    match row {
      Some((status, kind, headers, body)) => {
        let headers: Headers = serde_json::from_str(&headers)
          .map_err(|e| eyre!("Failed to deserialize cached headers: {}", e))?;
        Ok(Some(Response {
          status,
          headers,
          body,
          kind: ResponseKind::parse(&kind)?,
        }))
      }
      None => Ok(None),
    }
  }

  fn delete(&self, name: &str) -> Result<bool> {
    let conn = self.db.conn()?;
    let removed = conn
      .execute("DELETE FROM cache_partitions WHERE name = ?", params![name])
      .map_err(|e| eyre!("Failed to delete cache partition {}: {}", name, e))?;

    Ok(removed > 0)
  }

  fn keys(&self) -> Result<Vec<String>> {
    let conn = self.db.conn()?;
    let mut stmt = conn
      .prepare("SELECT name FROM cache_partitions ORDER BY rowid")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list cache partitions: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read cache partition name: {}", e))?;

    Ok(names)
  }
}
