//! Versioned request → response cache.
//!
//! Responses are grouped into named partitions. The partition whose name carries
//! the current version tag is the live one; activation deletes every other.

mod key;
mod memory;
mod storage;
mod store;

pub use memory::MemoryCacheStore;
pub use storage::SqliteCacheStore;
pub use store::CacheStore;
#[cfg(test)]
pub use store::CacheHandle;
