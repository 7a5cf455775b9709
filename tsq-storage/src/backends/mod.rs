//! Storage service backends
//!
//! - `memory`: records held in a growable list in process memory
//! - `queue`: every call delegated to a durable queue medium
//! - `cached`: the queue backend plus a process-local read cache, warmed by a
//!   background scan of the queue

pub mod cached;
pub mod memory;
pub mod queue;

pub use cached::{CachedQueueStore, ScanState};
pub use memory::InMemoryStore;
pub use queue::{DEFAULT_QUEUE_NAME, QueueStore};
