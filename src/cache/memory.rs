//! In-process cache store, used with `--ephemeral` and in tests.

use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use std::collections::HashMap;
use std::sync::Mutex;

use super::key::RequestKey;
use super::store::{CacheHandle, CacheStore};
use crate::http::{Request, Response};

struct Partition {
  name: String,
  /// key hash → (write sequence, response)
  entries: HashMap<String, (u64, Response)>,
}

#[derive(Default)]
struct Inner {
  partitions: Vec<Partition>,
  next_seq: u64,
}

/// Cache store that lives only as long as the process.
#[derive(Default)]
pub struct MemoryCacheStore {
  inner: Mutex<Inner>,
}

impl MemoryCacheStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
    self.inner.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

impl Inner {
  fn partition_mut(&mut self, name: &str) -> &mut Partition {
    let index = match self.partitions.iter().position(|p| p.name == name) {
      Some(index) => index,
      None => {
        self.partitions.push(Partition {
          name: name.to_string(),
          entries: HashMap::new(),
        });
        self.partitions.len() - 1
      }
    };
    &mut self.partitions[index]
  }
}

impl CacheStore for MemoryCacheStore {
  fn open(&self, name: &str) -> Result<CacheHandle> {
    self.lock()?.partition_mut(name);
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

    let hash = RequestKey::from_request(request).hash();
    let mut inner = self.lock()?;
    inner.next_seq += 1;
    let seq = inner.next_seq;
    inner
      .partition_mut(handle.name())
      .entries
      .insert(hash, (seq, response));

    Ok(())
  }

  fn match_request(&self, request: &Request) -> Result<Option<Response>> {
    if request.method != Method::GET {
      return Ok(None);
    }

    let hash = RequestKey::from_request(request).hash();
    let inner = self.lock()?;
    Ok(
      inner
        .partitions
        .iter()
        .filter_map(|p| p.entries.get(&hash))
        .max_by_key(|(seq, _)| *seq)
        .map(|(_, response)| response.clone()),
    )
  }

  fn delete(&self, name: &str) -> Result<bool> {
    let mut inner = self.lock()?;
    let before = inner.partitions.len();
    inner.partitions.retain(|p| p.name != name);
    Ok(inner.partitions.len() != before)
  }

  fn keys(&self) -> Result<Vec<String>> {
    Ok(self.lock()?.partitions.iter().map(|p| p.name.clone()).collect())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::url;

  #[test]
  fn test_overwrite_and_cross_partition_match() {
    let store = MemoryCacheStore::new();
    let v1 = store.open("crime-investigation-v1").unwrap();
    let v2 = store.open("crime-investigation-v2").unwrap();
    let request = Request::get(url("/manifest.json"));

    store.put(&v1, &request, Response::new(200, "a")).unwrap();
    store.put(&v1, &request, Response::new(200, "b")).unwrap();
    assert_eq!(store.match_request(&request).unwrap().unwrap().body, b"b");

    store.put(&v2, &request, Response::new(200, "c")).unwrap();
    assert_eq!(store.match_request(&request).unwrap().unwrap().body, b"c");

    assert!(store.delete("crime-investigation-v2").unwrap());
    assert_eq!(store.match_request(&request).unwrap().unwrap().body, b"b");
    assert_eq!(store.keys().unwrap(), vec!["crime-investigation-v1"]);
  }
}
