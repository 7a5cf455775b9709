use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::{sync::watch, task::JoinHandle};
use tsq_common::internal;

use super::queue::QueueStore;
use crate::{QueueError, QueueMedium, Record, RecordId, StorageError, StorageService};

type Cache = Arc<DashMap<RecordId, Record>>;

/// Progress of the background scan that warms the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// Not activated yet, or deactivated after the scan finished.
    Idle,
    Running,
    /// The queue's backlog at activation has been read to the end.
    Complete { cached: usize },
    /// The medium failed part way; `cached` records were cached before it did.
    Failed { cached: usize },
    /// Deactivated before the scan finished.
    Aborted,
}

impl ScanState {
    /// Whether the scan has stopped for good.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        matches!(
            self,
            Self::Complete { .. } | Self::Failed { .. } | Self::Aborted
        )
    }
}

/// Queue-backed storage with a process-local read cache
///
/// Durability is exactly that of [`QueueStore`]. On top of it, records are
/// cached by identifier:
/// - `put` writes to the queue, then caches the record under the assigned id
/// - `get` answers from the cache when it can, and otherwise reads the queue
///   and caches what it read
/// - on activation a background task reads the whole queue from its first item
///   and caches everything it finds, then stops for good
///
/// The cache is never invalidated or evicted; it lives until deactivation.
/// The same id always maps to the same record, so the write path and the
/// background scan racing on a key is harmless.
///
/// Clones share the cache and the background task.
#[derive(Debug, Clone)]
pub struct CachedQueueStore {
    store: QueueStore,
    cache: Cache,
    scanner: Arc<Mutex<Option<JoinHandle<()>>>>,
    state: Arc<watch::Sender<ScanState>>,
}

impl CachedQueueStore {
    /// A cached store over the default queue of `medium`.
    #[must_use]
    pub fn new(medium: Arc<dyn QueueMedium>) -> Self {
        Self::from_store(QueueStore::new(medium))
    }

    #[must_use]
    pub fn with_queue(medium: Arc<dyn QueueMedium>, queue: impl Into<Arc<str>>) -> Self {
        Self::from_store(QueueStore::with_queue(medium, queue))
    }

    fn from_store(store: QueueStore) -> Self {
        let (state, _) = watch::channel(ScanState::Idle);

        Self {
            store,
            cache: Arc::new(DashMap::new()),
            scanner: Arc::default(),
            state: Arc::new(state),
        }
    }

    #[must_use]
    pub fn queue(&self) -> &str {
        self.store.queue()
    }

    /// Number of cached records.
    #[must_use]
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    #[must_use]
    pub fn is_cached(&self, id: RecordId) -> bool {
        self.cache.contains_key(&id)
    }

    #[must_use]
    pub fn scan_state(&self) -> ScanState {
        *self.state.borrow()
    }

    /// Wait for the background scan to finish, returning how many records it
    /// cached.
    ///
    /// # Errors
    /// If the scan does not finish within `timeout`, was aborted, or stopped on
    /// a medium failure
    pub async fn wait_for_warm(&self, timeout: Duration) -> crate::Result<usize> {
        let mut state = self.state.subscribe();

        let finished = tokio::time::timeout(timeout, state.wait_for(ScanState::is_finished))
        .await
        .map_err(|e| StorageError::Internal(format!("Timeout waiting for background cache: {e}")))?
        .map(|s| *s)
        .map_err(|e| StorageError::Internal(format!("Background cache state lost: {e}")))?;

        match finished {
            ScanState::Complete { cached } => Ok(cached),
            ScanState::Failed { cached } => Err(StorageError::Internal(format!(
                "Background cache failed after {cached} records"
            ))),
            _ => Err(StorageError::Internal(
                "Background cache was aborted".to_string(),
            )),
        }
    }
}

#[async_trait]
impl StorageService for CachedQueueStore {
    fn name(&self) -> &'static str {
        "CachedQueueStore"
    }

    async fn get(&self, id: RecordId) -> crate::Result<Record> {
        let cached = self.cache.get(&id).map(|entry| entry.value().clone());
        if let Some(record) = cached {
            return Ok(record);
        }

        let record = self.store.read_item(id).await?;
        self.cache.insert(id, record.clone());

        Ok(record)
    }

    async fn put(&self, record: &str) -> crate::Result<RecordId> {
        let id = self.store.write_item(record).await?;
        self.cache.insert(id, record.to_string());

        Ok(id)
    }

    async fn activate(&self) -> crate::Result<()> {
        let mut scanner = self.scanner.lock();
        if scanner.is_some() {
            internal!("Background cache for {} already started", self.queue());
            return Ok(());
        }

        internal!(level = INFO, "Starting background cache for {}", self.queue());

        self.state.send_replace(ScanState::Running);
        let task = BackgroundCache {
            store: self.store.clone(),
            cache: Arc::clone(&self.cache),
            state: Arc::clone(&self.state),
        };
        *scanner = Some(tokio::spawn(task.run()));

        Ok(())
    }

    async fn deactivate(&self) -> crate::Result<()> {
        internal!(level = INFO, "Stopping background cache for {}", self.queue());

        let scanner = self.scanner.lock().take();
        if let Some(scanner) = scanner {
            scanner.abort();
            match scanner.await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => {
                    internal!("Background cache for {} aborted", self.queue());
                    self.state.send_replace(ScanState::Aborted);
                }
                Err(e) => {
                    internal!(level = WARN, "Background cache for {} failed: {e}", self.queue());
                    self.state.send_replace(ScanState::Aborted);
                }
            }
        }

        self.cache.clear();

        // Whatever a finished scan cached is gone now
        self.state.send_if_modified(|state| {
            let finished = matches!(state, ScanState::Complete { .. } | ScanState::Failed { .. });
            if finished {
                *state = ScanState::Idle;
            }
            finished
        });

        Ok(())
    }
}

/// One-shot scan of a queue's backlog into the cache.
struct BackgroundCache {
    store: QueueStore,
    cache: Cache,
    state: Arc<watch::Sender<ScanState>>,
}

impl BackgroundCache {
    /// Read the queue sequentially through a private handle, caching each item
    /// under the number the medium reports, until the queue runs out.
    async fn run(self) {
        let outcome = match self.store.open() {
            Ok(handle) => self.scan(handle).await,
            Err(e) => {
                internal!(level = WARN, "Background cache could not open {}: {e}", self.store.queue());
                ScanState::Failed { cached: 0 }
            }
        };

        internal!(
            level = DEBUG,
            "Background cache for {} finished: {outcome:?}",
            self.store.queue()
        );
        self.state.send_replace(outcome);
    }

    async fn scan(&self, mut handle: Box<dyn crate::QueueHandle>) -> ScanState {
        let mut cached = 0;

        loop {
            match handle.read_next_item().await {
                Ok((id, record)) => {
                    internal!("Caching item {id}");
                    self.cache.entry(id).or_insert(record);
                    cached += 1;
                }
                Err(QueueError::EndOfQueue(_) | QueueError::QueueNotFound(_)) => {
                    return ScanState::Complete { cached };
                }
                Err(e) => {
                    internal!(
                        level = WARN,
                        "Background cache for {} stopped early: {e}",
                        self.store.queue()
                    );
                    return ScanState::Failed { cached };
                }
            }

            tokio::task::yield_now().await;
        }
    }
}
