use std::sync::Arc;

use async_trait::async_trait;
use tsq_common::internal;
use tsq_tracing::traced;

use crate::{QueueHandle, QueueMedium, Record, RecordId, StorageService};

/// Queue every queue-backed store uses unless told otherwise.
pub const DEFAULT_QUEUE_NAME: &str = "TSQS";

/// Storage backend over a durable queue
///
/// Holds no state of its own: every `get` and `put` opens a fresh handle onto
/// the queue and delegates to it, since medium handles must never be shared
/// between concurrent callers. Identifiers are the item numbers the queue
/// assigns.
///
/// Any condition the medium reports surfaces as
/// [`StorageError::Medium`](crate::StorageError::Medium) with both response
/// codes. Nothing is retried.
#[derive(Debug, Clone)]
pub struct QueueStore {
    medium: Arc<dyn QueueMedium>,
    queue: Arc<str>,
}

impl QueueStore {
    /// A store over the [`DEFAULT_QUEUE_NAME`] queue of `medium`.
    #[must_use]
    pub fn new(medium: Arc<dyn QueueMedium>) -> Self {
        Self::with_queue(medium, DEFAULT_QUEUE_NAME)
    }

    #[must_use]
    pub fn with_queue(medium: Arc<dyn QueueMedium>, queue: impl Into<Arc<str>>) -> Self {
        Self {
            medium,
            queue: queue.into(),
        }
    }

    #[must_use]
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Open a handle for the exclusive use of one caller.
    pub(crate) fn open(&self) -> crate::Result<Box<dyn QueueHandle>> {
        Ok(self.medium.open(&self.queue)?)
    }

    #[traced(instrument(level = tracing::Level::DEBUG, skip(self)), timing(precision = "us"))]
    pub(crate) async fn read_item(&self, id: RecordId) -> crate::Result<Record> {
        Ok(self.open()?.read_item(id).await?)
    }

    #[traced(instrument(level = tracing::Level::DEBUG, skip_all), timing(precision = "us"))]
    pub(crate) async fn write_item(&self, record: &str) -> crate::Result<RecordId> {
        Ok(self.open()?.write_item(record).await?)
    }
}

#[async_trait]
impl StorageService for QueueStore {
    fn name(&self) -> &'static str {
        "QueueStore"
    }

    async fn get(&self, id: RecordId) -> crate::Result<Record> {
        self.read_item(id).await
    }

    async fn put(&self, record: &str) -> crate::Result<RecordId> {
        self.write_item(record).await
    }

    async fn activate(&self) -> crate::Result<()> {
        internal!(level = INFO, "Starting queue storage on {}", self.queue);
        Ok(())
    }

    async fn deactivate(&self) -> crate::Result<()> {
        internal!(level = INFO, "Stopping queue storage on {}", self.queue);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryQueueMedium, StorageError, TestQueueMedium, error::resp};

    #[tokio::test]
    async fn test_put_then_get() {
        let medium = TestQueueMedium::default();
        let store = QueueStore::new(Arc::new(medium.clone()));

        let id = store.put("hello").await.unwrap();
        assert_eq!(id, RecordId::FIRST);
        assert_eq!(store.get(id).await.unwrap(), "hello");
        assert_eq!(medium.inner().len(DEFAULT_QUEUE_NAME), Some(1));
    }

    #[tokio::test]
    async fn test_every_call_opens_its_own_handle() {
        let medium = TestQueueMedium::default();
        let store = QueueStore::new(Arc::new(medium.clone()));

        let id = store.put("a").await.unwrap();
        store.get(id).await.unwrap();
        store.get(id).await.unwrap();

        assert_eq!(medium.opens(), 3);
        assert_eq!(medium.writes(), 1);
        assert_eq!(medium.reads(), 2);
    }

    #[tokio::test]
    async fn test_missing_item_carries_codes() {
        let store = QueueStore::new(Arc::new(MemoryQueueMedium::new()));
        store.put("a").await.unwrap();

        let err = store.get(RecordId::new(2)).await.unwrap_err();
        assert!(matches!(err, StorageError::Medium { source: Some(_), .. }));
        assert_eq!(err.resp(), Some(resp::ITEMERR));
        assert_eq!(err.resp2(), Some(1));
    }

    #[tokio::test]
    async fn test_missing_queue() {
        let store = QueueStore::with_queue(Arc::new(MemoryQueueMedium::new()), "EMPTY");

        let err = store.get(RecordId::FIRST).await.unwrap_err();
        assert_eq!(err.resp(), Some(resp::QIDERR));
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_write_failure_surfaces() {
        let store = QueueStore::new(Arc::new(MemoryQueueMedium::new().with_max_items(1)));
        store.put("a").await.unwrap();

        let err = store.put("b").await.unwrap_err();
        assert_eq!(err.resp(), Some(resp::NOSPACE));

        // Nothing was written by the failed put
        assert!(store.get(RecordId::new(2)).await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_queue_name() {
        let store = QueueStore::with_queue(Arc::new(MemoryQueueMedium::new()), "");

        let err = store.put("a").await.unwrap_err();
        assert_eq!(err.resp(), Some(resp::INVREQ));
    }
}
