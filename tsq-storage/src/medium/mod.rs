//! Durable queue media
//!
//! A medium holds named, append-only queues whose items are numbered by the
//! medium itself and can be read back at random or sequentially:
//! - `memory`: queues held in process memory, shared by every handle
//! - `file`: one directory per queue, one file per item
//! - `test`: an instrumented memory medium for tests
//!
//! Handles are opened per operation and never shared. Every [`QueueHandle`]
//! method takes `&mut self`, so a handle can only be driven by one caller at a
//! time.

pub mod file;
pub mod memory;

use async_trait::async_trait;

pub use file::{FileQueueMedium, FileQueueMediumBuilder};
pub use memory::MemoryQueueMedium;
pub use test::TestQueueMedium;

use crate::{QueueError, Record, RecordId};

/// Largest record, in bytes, a queue item can hold.
pub const MAX_ITEM_LENGTH: usize = 32_763;

/// Longest accepted queue name.
pub const MAX_QUEUE_NAME_LENGTH: usize = 16;

/// A store of named durable queues.
pub trait QueueMedium: Send + Sync + std::fmt::Debug {
    /// Open a fresh handle onto the named queue.
    ///
    /// Opening never creates the queue; it comes into existence on its first
    /// write.
    ///
    /// # Errors
    /// If the queue name is not acceptable to the medium
    fn open(&self, queue: &str) -> Result<Box<dyn QueueHandle>, QueueError>;
}

/// An exclusive handle onto one queue of a [`QueueMedium`].
///
/// The handle carries its own sequential read position, starting before the
/// first item.
#[async_trait]
pub trait QueueHandle: Send + std::fmt::Debug {
    /// Name of the queue this handle was opened on.
    fn queue(&self) -> &str;

    /// Append `record`, returning the item number the medium assigned.
    ///
    /// # Errors
    /// If the record is too long, the queue is full, or the medium fails
    async fn write_item(&mut self, record: &str) -> Result<RecordId, QueueError>;

    /// Read the item numbered `item`.
    ///
    /// # Errors
    /// [`QueueError::QueueNotFound`] or [`QueueError::ItemNotFound`] if there
    /// is no such item, or any medium failure
    async fn read_item(&mut self, item: RecordId) -> Result<Record, QueueError>;

    /// Read the item after the one last read through this handle, along with
    /// its item number.
    ///
    /// # Errors
    /// [`QueueError::EndOfQueue`] once every item has been read,
    /// [`QueueError::QueueNotFound`] if the queue was never written, or any
    /// medium failure
    async fn read_next_item(&mut self) -> Result<(RecordId, Record), QueueError>;
}

/// Check a queue name is usable by every medium, including as a directory name.
pub(crate) fn validate_queue_name(queue: &str) -> Result<(), QueueError> {
    if queue.is_empty() || queue.len() > MAX_QUEUE_NAME_LENGTH {
        return Err(QueueError::InvalidRequest(format!(
            "Queue name must be 1 to {MAX_QUEUE_NAME_LENGTH} bytes: {queue:?}"
        )));
    }

    if queue.contains(['/', '\\']) || queue.starts_with('.') {
        return Err(QueueError::InvalidRequest(format!(
            "Queue name contains reserved characters: {queue:?}"
        )));
    }

    Ok(())
}

pub(crate) const fn check_length(record: &str) -> Result<(), QueueError> {
    if record.len() > MAX_ITEM_LENGTH {
        return Err(QueueError::LengthError {
            len: record.len(),
            max: MAX_ITEM_LENGTH,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_name_validation() {
        assert!(validate_queue_name("TSQS").is_ok());
        assert!(validate_queue_name("a-much-longer-q").is_ok());

        assert!(validate_queue_name("").is_err());
        assert!(validate_queue_name("seventeen-chars-x").is_err());
        assert!(validate_queue_name("../etc").is_err());
        assert!(validate_queue_name("a/b").is_err());
        assert!(validate_queue_name("a\\b").is_err());
        assert!(validate_queue_name(".hidden").is_err());
    }

    #[test]
    fn test_length_check() {
        assert!(check_length("").is_ok());
        assert!(check_length(&"x".repeat(MAX_ITEM_LENGTH)).is_ok());

        let err = check_length(&"x".repeat(MAX_ITEM_LENGTH + 1)).unwrap_err();
        assert!(matches!(err, QueueError::LengthError { len, .. } if len == MAX_ITEM_LENGTH + 1));
    }
}
