pub mod backends;
pub mod config;
pub mod error;
pub mod medium;
pub mod r#trait;
pub mod types;

pub use backends::{CachedQueueStore, DEFAULT_QUEUE_NAME, InMemoryStore, QueueStore, ScanState};
pub use config::{MediumConfig, StorageConfig};
pub use error::{ConfigError, QueueError, Result, StorageError, ValidationError};
pub use medium::{
    FileQueueMedium, MAX_ITEM_LENGTH, MemoryQueueMedium, QueueHandle, QueueMedium, TestQueueMedium,
};
pub use r#trait::StorageService;
pub use types::{Record, RecordId};
