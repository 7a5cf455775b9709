use std::{
    io::ErrorKind,
    path::{Component, Path, PathBuf},
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::{fs, sync::Mutex};
use tsq_common::internal;

use super::{QueueHandle, QueueMedium, check_length, validate_queue_name};
use crate::{QueueError, Record, RecordId, ValidationError};

const ITEM_EXTENSION: &str = "item";
const TEMP_PREFIX: &str = ".tmp_";

/// What is written to disk for each item.
#[derive(Debug, Serialize, Deserialize)]
struct StoredItem {
    record: Record,
    /// Milliseconds since the Unix epoch
    written_at: u64,
}

/// File-based queue medium
///
/// Each queue is a directory under the medium's root, and each item a file
/// named after its zero-padded item number, e.g. `TSQS/0000000001.item`,
/// holding the record encoded with bincode.
///
/// # Atomicity
/// Items are written to a `.tmp_` file first and renamed into place, so a
/// crash mid-write never leaves a partial item behind. Stray temporary files
/// are ignored by reads and removed by [`FileQueueMedium::init`].
///
/// # Numbering
/// Item numbers are contiguous from 1. They are assigned under a per-queue lock
/// seeded from the highest item on disk, so numbering carries on across
/// restarts. Only one process may own a root at a time.
#[derive(Debug, Clone)]
pub struct FileQueueMedium {
    root: PathBuf,
    /// Last assigned item per queue, `None` until seeded from disk
    writers: Arc<DashMap<String, Arc<Mutex<Option<u32>>>>>,
}

impl FileQueueMedium {
    /// Validate a root path for the medium
    ///
    /// # Security Checks
    /// - Rejects paths containing `..` (directory traversal)
    /// - Ensures the path is absolute
    /// - Rejects paths to sensitive system directories
    fn validate_path(path: &Path) -> Result<(), ValidationError> {
        if path.components().any(|c| c == Component::ParentDir) {
            return Err(ValidationError::ParentDir(path.display().to_string()));
        }

        if !path.is_absolute() {
            return Err(ValidationError::NotAbsolute(path.display().to_string()));
        }

        let sensitive_prefixes = [
            "/etc",
            "/bin",
            "/sbin",
            "/usr/bin",
            "/usr/sbin",
            "/boot",
            "/sys",
            "/proc",
            "/dev",
        ];

        for prefix in sensitive_prefixes {
            if path.starts_with(prefix) {
                return Err(ValidationError::SystemDirectory {
                    prefix,
                    path: path.display().to_string(),
                });
            }
        }

        Ok(())
    }

    #[must_use]
    pub fn builder() -> FileQueueMediumBuilder {
        FileQueueMediumBuilder::default()
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Prepare the root directory
    ///
    /// Creates the root if it does not exist, checks it is a directory, and
    /// removes temporary files left behind by interrupted writes.
    ///
    /// # Errors
    /// - If the root cannot be created or read
    /// - If the root exists but is not a directory
    pub fn init(&self) -> std::io::Result<()> {
        internal!("Initialising file queue medium at {}", self.root.display());

        if !self.root.try_exists()? {
            internal!("{} does not exist, creating...", self.root.display());
            std::fs::create_dir_all(&self.root)?;
        } else if !self.root.is_dir() {
            return Err(std::io::Error::new(
                ErrorKind::NotADirectory,
                format!(
                    "Expected {} to be a Directory, but it is not",
                    self.root.display()
                ),
            ));
        }

        let mut cleaned = 0;
        for queue in std::fs::read_dir(&self.root)? {
            let queue = queue?;
            if !queue.file_type()?.is_dir() {
                continue;
            }

            for entry in std::fs::read_dir(queue.path())? {
                let entry = entry?;
                if entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX) {
                    std::fs::remove_file(entry.path())?;
                    cleaned += 1;
                }
            }
        }

        if cleaned > 0 {
            internal!(
                level = INFO,
                "Cleaned up {cleaned} orphaned temporary items from {}",
                self.root.display()
            );
        }

        Ok(())
    }

    fn writer(&self, queue: &str) -> Arc<Mutex<Option<u32>>> {
        Arc::clone(self.writers.entry(queue.to_string()).or_default().value())
    }
}

impl QueueMedium for FileQueueMedium {
    fn open(&self, queue: &str) -> Result<Box<dyn QueueHandle>, QueueError> {
        validate_queue_name(queue)?;

        Ok(Box::new(FileQueueHandle {
            queue: queue.to_string(),
            dir: self.root.join(queue),
            writer: self.writer(queue),
            next: RecordId::FIRST,
        }))
    }
}

#[derive(Debug)]
struct FileQueueHandle {
    queue: String,
    dir: PathBuf,
    writer: Arc<Mutex<Option<u32>>>,
    /// Item the next sequential read returns
    next: RecordId,
}

fn item_filename(item: RecordId) -> String {
    format!("{:010}.{ITEM_EXTENSION}", item.get())
}

/// Parse an item number back out of a filename produced by [`item_filename`].
fn parse_item_filename(filename: &str) -> Option<u32> {
    if filename.starts_with(TEMP_PREFIX) {
        return None;
    }

    filename
        .strip_suffix(ITEM_EXTENSION)?
        .strip_suffix('.')?
        .parse()
        .ok()
}

impl FileQueueHandle {
    fn io_error(&self, source: std::io::Error) -> QueueError {
        QueueError::Io {
            queue: self.queue.clone(),
            source,
        }
    }

    async fn queue_exists(&self) -> Result<bool, QueueError> {
        fs::try_exists(&self.dir)
            .await
            .map_err(|e| self.io_error(e))
    }

    /// Highest item number present on disk, 0 for an empty or missing queue.
    async fn highest_on_disk(&self) -> Result<u32, QueueError> {
        if !self.queue_exists().await? {
            return Ok(0);
        }

        let mut entries = fs::read_dir(&self.dir).await.map_err(|e| self.io_error(e))?;
        let mut highest = 0;

        while let Some(entry) = entries.next_entry().await.map_err(|e| self.io_error(e))? {
            if let Some(item) = parse_item_filename(&entry.file_name().to_string_lossy()) {
                highest = highest.max(item);
            }
        }

        Ok(highest)
    }

    /// Read an item, distinguishing a missing queue from a missing item.
    async fn load(&self, item: RecordId) -> Result<Record, QueueError> {
        let path = self.dir.join(item_filename(item));

        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(if self.queue_exists().await? {
                    QueueError::ItemNotFound {
                        queue: self.queue.clone(),
                        item,
                    }
                } else {
                    QueueError::QueueNotFound(self.queue.clone())
                });
            }
            Err(e) => return Err(self.io_error(e)),
        };

        let (stored, _): (StoredItem, usize) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard()).map_err(
                |e| QueueError::Corrupted {
                    queue: self.queue.clone(),
                    item,
                    reason: e.to_string(),
                },
            )?;

        Ok(stored.record)
    }
}

#[async_trait]
impl QueueHandle for FileQueueHandle {
    fn queue(&self) -> &str {
        &self.queue
    }

    async fn write_item(&mut self, record: &str) -> Result<RecordId, QueueError> {
        check_length(record)?;

        let writer = Arc::clone(&self.writer);
        let mut last = writer.lock().await;
        let last_item = match *last {
            Some(item) => item,
            None => self.highest_on_disk().await?,
        };
        let item = last_item
            .checked_add(1)
            .map(RecordId::new)
            .ok_or_else(|| QueueError::NoSpace(self.queue.clone()))?;

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| self.io_error(e))?;

        let stored = StoredItem {
            record: record.to_string(),
            written_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
                .unwrap_or_default(),
        };
        let bytes = bincode::serde::encode_to_vec(&stored, bincode::config::standard())
            .map_err(|e| QueueError::Corrupted {
                queue: self.queue.clone(),
                item,
                reason: e.to_string(),
            })?;

        let filename = item_filename(item);
        let path = self.dir.join(&filename);
        let temp_path = self.dir.join(format!("{TEMP_PREFIX}{filename}"));

        fs::write(&temp_path, &bytes)
            .await
            .map_err(|e| self.io_error(e))?;
        fs::rename(&temp_path, &path)
            .await
            .map_err(|e| self.io_error(e))?;

        *last = Some(item.get());

        internal!(level = DEBUG, "Wrote item {item} to {}", path.display());

        Ok(item)
    }

    async fn read_item(&mut self, item: RecordId) -> Result<Record, QueueError> {
        self.load(item).await
    }

    async fn read_next_item(&mut self) -> Result<(RecordId, Record), QueueError> {
        let item = self.next;

        let record = match self.load(item).await {
            Ok(record) => record,
            Err(QueueError::ItemNotFound { .. }) => {
                return Err(QueueError::EndOfQueue(self.queue.clone()));
            }
            Err(e) => return Err(e),
        };

        if let Some(next) = item.next() {
            self.next = next;
        }

        Ok((item, record))
    }
}

/// Builder for `FileQueueMedium`
#[derive(Debug, Default)]
pub struct FileQueueMediumBuilder {
    path: PathBuf,
}

impl FileQueueMediumBuilder {
    /// Set the root directory
    #[must_use]
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    /// Build the final `FileQueueMedium`
    ///
    /// # Errors
    /// Returns an error if the path is invalid or potentially dangerous
    pub fn build(self) -> Result<FileQueueMedium, ValidationError> {
        FileQueueMedium::validate_path(&self.path)?;
        Ok(FileQueueMedium {
            root: self.path,
            writers: Arc::new(DashMap::new()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn medium(dir: &tempfile::TempDir) -> FileQueueMedium {
        let medium = FileQueueMedium::builder()
            .path(dir.path().to_path_buf())
            .build()
            .unwrap();
        medium.init().unwrap();
        medium
    }

    #[test]
    fn test_item_filenames_round_trip() {
        assert_eq!(item_filename(RecordId::new(42)), "0000000042.item");
        assert_eq!(parse_item_filename("0000000042.item"), Some(42));
        assert_eq!(parse_item_filename(".tmp_0000000042.item"), None);
        assert_eq!(parse_item_filename("0000000042.bin"), None);
        assert_eq!(parse_item_filename("junk.item"), None);
    }

    #[test]
    fn test_path_validation() {
        let err = FileQueueMedium::builder()
            .path(PathBuf::from("/var/lib/../../etc"))
            .build()
            .unwrap_err();
        assert!(matches!(err, ValidationError::ParentDir(_)));

        let err = FileQueueMedium::builder()
            .path(PathBuf::from("relative/queues"))
            .build()
            .unwrap_err();
        assert!(matches!(err, ValidationError::NotAbsolute(_)));

        let err = FileQueueMedium::builder()
            .path(PathBuf::from("/proc/queues"))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("system directory"));
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "Filesystem access")]
    async fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let medium = medium(&dir);
        let mut handle = medium.open("TSQS").unwrap();

        assert_eq!(handle.write_item("hello").await.unwrap(), RecordId::new(1));
        assert_eq!(handle.write_item("world").await.unwrap(), RecordId::new(2));
        assert_eq!(handle.read_item(RecordId::new(1)).await.unwrap(), "hello");
        assert!(dir.path().join("TSQS").join("0000000002.item").exists());
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "Filesystem access")]
    async fn test_missing_queue_and_item() {
        let dir = tempfile::tempdir().unwrap();
        let medium = medium(&dir);
        let mut handle = medium.open("TSQS").unwrap();

        let err = handle.read_item(RecordId::FIRST).await.unwrap_err();
        assert!(matches!(err, QueueError::QueueNotFound(_)));
        let err = handle.read_next_item().await.unwrap_err();
        assert!(matches!(err, QueueError::QueueNotFound(_)));

        handle.write_item("only").await.unwrap();
        let err = handle.read_item(RecordId::new(5)).await.unwrap_err();
        assert!(matches!(err, QueueError::ItemNotFound { .. }));
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "Filesystem access")]
    async fn test_numbering_survives_restart() {
        let dir = tempfile::tempdir().unwrap();

        let first = medium(&dir);
        let mut handle = first.open("TSQS").unwrap();
        handle.write_item("before").await.unwrap();
        handle.write_item("restart").await.unwrap();
        drop(first);

        let second = medium(&dir);
        let mut handle = second.open("TSQS").unwrap();
        assert_eq!(handle.write_item("after").await.unwrap(), RecordId::new(3));
        assert_eq!(handle.read_item(RecordId::new(1)).await.unwrap(), "before");
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "Filesystem access")]
    async fn test_sequential_read_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let medium = medium(&dir);
        let mut writer = medium.open("TSQS").unwrap();
        writer.write_item("a").await.unwrap();
        writer.write_item("b").await.unwrap();

        let mut reader = medium.open("TSQS").unwrap();
        assert_eq!(
            reader.read_next_item().await.unwrap(),
            (RecordId::new(1), "a".to_string())
        );
        assert_eq!(
            reader.read_next_item().await.unwrap(),
            (RecordId::new(2), "b".to_string())
        );
        assert!(matches!(
            reader.read_next_item().await.unwrap_err(),
            QueueError::EndOfQueue(_)
        ));
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "Filesystem access")]
    async fn test_init_removes_temporary_items() {
        let dir = tempfile::tempdir().unwrap();
        let queue_dir = dir.path().join("TSQS");
        std::fs::create_dir_all(&queue_dir).unwrap();
        std::fs::write(queue_dir.join(".tmp_0000000001.item"), b"partial").unwrap();

        let medium = medium(&dir);
        assert!(!queue_dir.join(".tmp_0000000001.item").exists());

        let mut handle = medium.open("TSQS").unwrap();
        assert_eq!(handle.write_item("clean").await.unwrap(), RecordId::FIRST);
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "Filesystem access")]
    async fn test_corrupted_item() {
        let dir = tempfile::tempdir().unwrap();
        let queue_dir = dir.path().join("TSQS");
        std::fs::create_dir_all(&queue_dir).unwrap();
        std::fs::write(queue_dir.join("0000000001.item"), [0xff, 0xff, 0xff]).unwrap();

        let medium = medium(&dir);
        let err = medium
            .open("TSQS")
            .unwrap()
            .read_item(RecordId::FIRST)
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Corrupted { .. }));
        assert_eq!(err.resp2(), 2);
    }
}
