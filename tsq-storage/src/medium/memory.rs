use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;

use super::{QueueHandle, QueueMedium, check_length, validate_queue_name};
use crate::{QueueError, Record, RecordId};

type Items = Arc<RwLock<Vec<Record>>>;

/// Queue medium held in process memory
///
/// Queues are shared by every handle opened from this medium (and its clones),
/// so it behaves like an external medium for the lifetime of the process.
/// Nothing survives a restart.
///
/// Item numbers are contiguous, starting at 1 unless configured otherwise with
/// [`MemoryQueueMedium::numbering_from`].
#[derive(Debug, Clone)]
pub struct MemoryQueueMedium {
    queues: Arc<DashMap<String, Items>>,
    first_item: u32,
    max_items: Option<usize>,
}

impl Default for MemoryQueueMedium {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryQueueMedium {
    #[must_use]
    pub fn new() -> Self {
        Self {
            queues: Arc::new(DashMap::new()),
            first_item: 1,
            max_items: None,
        }
    }

    /// Number the first item of every queue `first` instead of 1.
    #[must_use]
    pub fn numbering_from(mut self, first: u32) -> Self {
        self.first_item = first.max(1);
        self
    }

    /// Limit every queue to `max_items` items.
    #[must_use]
    pub const fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = Some(max_items);
        self
    }

    /// Number of items in `queue`, or `None` if it was never written.
    #[must_use]
    pub fn len(&self, queue: &str) -> Option<usize> {
        self.queues.get(queue).map(|items| items.read().len())
    }

    fn items(&self, queue: &str) -> Option<Items> {
        self.queues.get(queue).map(|items| Arc::clone(items.value()))
    }
}

impl QueueMedium for MemoryQueueMedium {
    fn open(&self, queue: &str) -> Result<Box<dyn QueueHandle>, QueueError> {
        validate_queue_name(queue)?;

        Ok(Box::new(MemoryQueueHandle {
            medium: self.clone(),
            queue: queue.to_string(),
            cursor: 0,
        }))
    }
}

#[derive(Debug)]
struct MemoryQueueHandle {
    medium: MemoryQueueMedium,
    queue: String,
    /// Index of the next item a sequential read returns
    cursor: usize,
}

impl MemoryQueueHandle {
    fn item_number(&self, index: usize) -> Result<RecordId, QueueError> {
        u32::try_from(index)
            .ok()
            .and_then(|index| self.medium.first_item.checked_add(index))
            .map(RecordId::new)
            .ok_or_else(|| QueueError::NoSpace(self.queue.clone()))
    }

    fn index_of(&self, item: RecordId) -> Option<usize> {
        item.get()
            .checked_sub(self.medium.first_item)
            .map(|index| index as usize)
    }
}

#[async_trait]
impl QueueHandle for MemoryQueueHandle {
    fn queue(&self) -> &str {
        &self.queue
    }

    async fn write_item(&mut self, record: &str) -> Result<RecordId, QueueError> {
        check_length(record)?;

        let items = Arc::clone(
            self.medium
                .queues
                .entry(self.queue.clone())
                .or_default()
                .value(),
        );

        let mut items = items.write();
        if self.medium.max_items.is_some_and(|max| items.len() >= max) {
            return Err(QueueError::NoSpace(self.queue.clone()));
        }

        let item = self.item_number(items.len())?;
        items.push(record.to_string());

        Ok(item)
    }

    async fn read_item(&mut self, item: RecordId) -> Result<Record, QueueError> {
        let items = self
            .medium
            .items(&self.queue)
            .ok_or_else(|| QueueError::QueueNotFound(self.queue.clone()))?;

        let items = items.read();
        self.index_of(item)
            .and_then(|index| items.get(index))
            .cloned()
            .ok_or_else(|| QueueError::ItemNotFound {
                queue: self.queue.clone(),
                item,
            })
    }

    async fn read_next_item(&mut self) -> Result<(RecordId, Record), QueueError> {
        let items = self
            .medium
            .items(&self.queue)
            .ok_or_else(|| QueueError::QueueNotFound(self.queue.clone()))?;

        let record = items
            .read()
            .get(self.cursor)
            .cloned()
            .ok_or_else(|| QueueError::EndOfQueue(self.queue.clone()))?;

        let item = self.item_number(self.cursor)?;
        self.cursor += 1;

        Ok((item, record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_items_are_numbered_from_one() {
        let medium = MemoryQueueMedium::new();
        let mut handle = medium.open("TSQS").unwrap();

        assert_eq!(handle.write_item("a").await.unwrap(), RecordId::new(1));
        assert_eq!(handle.write_item("b").await.unwrap(), RecordId::new(2));
        assert_eq!(handle.read_item(RecordId::new(2)).await.unwrap(), "b");
        assert_eq!(medium.len("TSQS"), Some(2));
    }

    #[tokio::test]
    async fn test_queues_are_shared_between_handles() {
        let medium = MemoryQueueMedium::new();
        medium.open("TSQS").unwrap().write_item("shared").await.unwrap();

        let mut other = medium.clone().open("TSQS").unwrap();
        assert_eq!(other.read_item(RecordId::FIRST).await.unwrap(), "shared");
        assert_eq!(medium.len("OTHER"), None);
    }

    #[tokio::test]
    async fn test_missing_queue_and_item() {
        let medium = MemoryQueueMedium::new();
        let mut handle = medium.open("TSQS").unwrap();

        let err = handle.read_item(RecordId::FIRST).await.unwrap_err();
        assert!(matches!(err, QueueError::QueueNotFound(_)));

        handle.write_item("only").await.unwrap();
        let err = handle.read_item(RecordId::new(2)).await.unwrap_err();
        assert!(matches!(err, QueueError::ItemNotFound { item, .. } if item == RecordId::new(2)));
        let err = handle.read_item(RecordId::new(0)).await.unwrap_err();
        assert!(matches!(err, QueueError::ItemNotFound { .. }));
    }

    #[tokio::test]
    async fn test_sequential_reads_use_private_cursor() {
        let medium = MemoryQueueMedium::new().numbering_from(100);
        let mut writer = medium.open("TSQS").unwrap();
        writer.write_item("first").await.unwrap();
        writer.write_item("second").await.unwrap();

        let mut reader = medium.open("TSQS").unwrap();
        assert_eq!(
            reader.read_next_item().await.unwrap(),
            (RecordId::new(100), "first".to_string())
        );

        // A second handle starts from the beginning again
        let mut other = medium.open("TSQS").unwrap();
        assert_eq!(other.read_next_item().await.unwrap().0, RecordId::new(100));

        assert_eq!(reader.read_next_item().await.unwrap().1, "second");
        let err = reader.read_next_item().await.unwrap_err();
        assert!(matches!(err, QueueError::EndOfQueue(_)));
    }

    #[tokio::test]
    async fn test_capacity_limit() {
        let medium = MemoryQueueMedium::new().with_max_items(1);
        let mut handle = medium.open("TSQS").unwrap();

        handle.write_item("fits").await.unwrap();
        let err = handle.write_item("does not").await.unwrap_err();
        assert!(matches!(err, QueueError::NoSpace(_)));
    }

    #[test]
    fn test_open_rejects_bad_names() {
        let medium = MemoryQueueMedium::new();
        assert!(matches!(
            medium.open("../TSQS").unwrap_err(),
            QueueError::InvalidRequest(_)
        ));
    }
}
