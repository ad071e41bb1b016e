//! Durable queue of mutating requests that could not be sent, and their replay.

mod operation;
mod replay;
mod storage;

pub use operation::PendingOperation;
pub use replay::{replay_pending, SyncReport};
pub use storage::{MemoryOperationQueue, OperationQueue, SqliteOperationQueue};
