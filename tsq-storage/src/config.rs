use std::{path::PathBuf, sync::Arc};

use serde::Deserialize;

use crate::{
    CachedQueueStore, ConfigError, DEFAULT_QUEUE_NAME, FileQueueMedium, InMemoryStore,
    MemoryQueueMedium, QueueMedium, QueueStore, StorageService,
};

/// Configuration for the storage service
///
/// Selects one of the backends at runtime from the configuration file.
///
/// # Examples
///
/// In-memory records (the default):
/// ```ron
/// Tsq (
///     storage: Memory,
/// )
/// ```
///
/// Queue-backed records kept on disk, read through a cache:
/// ```ron
/// Tsq (
///     storage: CachedQueue(
///         queue: "TSQS",
///         medium: File(path: "/var/lib/tsq"),
///     ),
/// )
/// ```
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub enum StorageConfig {
    /// Records in a process-local list
    #[default]
    Memory,
    /// Every call delegated to a durable queue
    Queue {
        #[serde(default = "default_queue")]
        queue: String,
        #[serde(default)]
        medium: MediumConfig,
    },
    /// A durable queue read through a process-local cache
    CachedQueue {
        #[serde(default = "default_queue")]
        queue: String,
        #[serde(default)]
        medium: MediumConfig,
    },
}

/// The durable medium behind a queue-backed store.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub enum MediumConfig {
    /// Queues held in process memory
    #[default]
    Memory,
    /// One directory per queue under `path`
    File { path: PathBuf },
}

fn default_queue() -> String {
    DEFAULT_QUEUE_NAME.to_string()
}

impl MediumConfig {
    /// Build and initialise the medium.
    ///
    /// # Errors
    /// If a file medium's path is invalid, or its directory cannot be prepared
    pub fn into_medium(self) -> Result<Arc<dyn QueueMedium>, ConfigError> {
        match self {
            Self::Memory => Ok(Arc::new(MemoryQueueMedium::new())),
            Self::File { path } => {
                let medium = FileQueueMedium::builder().path(path).build()?;
                medium.init()?;
                Ok(Arc::new(medium))
            }
        }
    }
}

impl StorageConfig {
    /// Short name of the selected backend.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Queue { .. } => "queue",
            Self::CachedQueue { .. } => "cached",
        }
    }

    /// Convert the configuration into a concrete storage service
    ///
    /// The service is not yet activated; that is left to whoever binds it.
    ///
    /// # Errors
    /// If the medium cannot be prepared
    pub fn into_service(self) -> Result<Arc<dyn StorageService>, ConfigError> {
        match self {
            Self::Memory => Ok(Arc::new(InMemoryStore::new())),
            Self::Queue { queue, medium } => {
                Ok(Arc::new(QueueStore::with_queue(medium.into_medium()?, queue)))
            }
            Self::CachedQueue { queue, medium } => Ok(Arc::new(CachedQueueStore::with_queue(
                medium.into_medium()?,
                queue,
            ))),
        }
    }
}
