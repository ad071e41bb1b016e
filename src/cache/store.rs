//! Cache store trait.

use color_eyre::Result;

use crate::http::{Request, Response};

/// Handle to an opened cache partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheHandle {
  name: String,
}

impl CacheHandle {
  pub(crate) fn new(name: &str) -> Self {
    Self {
      name: name.to_string(),
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }
}

/// Named partitions of request → response pairs.
///
/// Only GET requests are stored or matched. Implementations serialize their own
/// writes; concurrent puts for the same key leave whichever landed last. Calls
/// may block on disk, so async callers run writes on the blocking pool.
pub trait CacheStore: Send + Sync + 'static {
  /// Create the partition if needed and return a handle to it.
  fn open(&self, name: &str) -> Result<CacheHandle>;

  /// Store `response` for `request`, replacing any previous entry for the same key.
  ///
  /// The response is consumed; clone it first if it is also being returned.
  fn put(&self, handle: &CacheHandle, request: &Request, response: Response) -> Result<()>;

  /// Most recently stored response for `request` across all partitions.
  fn match_request(&self, request: &Request) -> Result<Option<Response>>;

  /// Remove a whole partition. Returns whether it existed.
  fn delete(&self, name: &str) -> Result<bool>;

  /// Partition names, oldest first.
  fn keys(&self) -> Result<Vec<String>>;
}
