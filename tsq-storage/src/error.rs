//! Error types for the tsq-storage crate.
//!
//! [`QueueError`] is what a durable queue medium reports. [`StorageError`] is
//! the single error type raised by every [`StorageService`](crate::StorageService)
//! backend; medium conditions are carried into it with both response codes
//! preserved.

use std::io;

use thiserror::Error;

use crate::RecordId;

/// Response codes reported by the durable queue medium.
pub mod resp {
    /// The request was not valid for the queue (e.g. a malformed queue name).
    pub const INVREQ: i32 = 16;
    /// The medium failed to read or write an item.
    pub const IOERR: i32 = 17;
    /// The queue cannot hold another item.
    pub const NOSPACE: i32 = 18;
    /// The record length is outside what the medium accepts.
    pub const LENGERR: i32 = 22;
    /// The requested item does not exist, or a sequential read ran off the end.
    pub const ITEMERR: i32 = 26;
    /// The named queue does not exist.
    pub const QIDERR: i32 = 44;
}

/// Abnormal conditions reported by a durable queue medium.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The queue has never been written to.
    #[error("Queue {0} does not exist")]
    QueueNotFound(String),

    /// Random read of an item number the queue does not hold.
    #[error("Item {item} does not exist in queue {queue}")]
    ItemNotFound { queue: String, item: RecordId },

    /// Sequential read past the last item.
    #[error("End of queue {0} reached")]
    EndOfQueue(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Record of {len} bytes exceeds the maximum item length of {max}")]
    LengthError { len: usize, max: usize },

    #[error("Queue {0} has no space for further items")]
    NoSpace(String),

    #[error("I/O error on queue {queue}: {source}")]
    Io {
        queue: String,
        #[source]
        source: io::Error,
    },

    #[error("Corrupted item {item} in queue {queue}: {reason}")]
    Corrupted {
        queue: String,
        item: RecordId,
        reason: String,
    },

    /// A raw condition, carried verbatim.
    #[error("Queue condition RESP={resp} RESP2={resp2}")]
    Condition { resp: i32, resp2: i32 },
}

impl QueueError {
    /// Primary response code for this condition.
    #[must_use]
    pub const fn resp(&self) -> i32 {
        match self {
            Self::QueueNotFound(_) => resp::QIDERR,
            Self::ItemNotFound { .. } | Self::EndOfQueue(_) => resp::ITEMERR,
            Self::InvalidRequest(_) => resp::INVREQ,
            Self::LengthError { .. } => resp::LENGERR,
            Self::NoSpace(_) => resp::NOSPACE,
            Self::Io { .. } | Self::Corrupted { .. } => resp::IOERR,
            Self::Condition { resp, .. } => *resp,
        }
    }

    /// Secondary response code, qualifying [`QueueError::resp`].
    #[must_use]
    pub const fn resp2(&self) -> i32 {
        match self {
            Self::EndOfQueue(_) | Self::Corrupted { .. } => 2,
            Self::Condition { resp2, .. } => *resp2,
            _ => 1,
        }
    }
}

/// The error raised by storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The in-memory store has no record at this identifier.
    #[error("Record {id} is out of range for a store of {len} records")]
    OutOfRange { id: RecordId, len: usize },

    /// The durable medium reported an abnormal condition.
    #[error("Durable medium failure RESP={resp} RESP2={resp2}")]
    Medium {
        resp: i32,
        resp2: i32,
        #[source]
        source: Option<QueueError>,
    },

    /// Internal error (lock poisoning, etc.).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StorageError {
    /// A medium failure with the given codes and no underlying cause.
    #[must_use]
    pub const fn medium(resp: i32, resp2: i32) -> Self {
        Self::Medium {
            resp,
            resp2,
            source: None,
        }
    }

    #[must_use]
    pub const fn resp(&self) -> Option<i32> {
        match self {
            Self::Medium { resp, .. } => Some(*resp),
            _ => None,
        }
    }

    #[must_use]
    pub const fn resp2(&self) -> Option<i32> {
        match self {
            Self::Medium { resp2, .. } => Some(*resp2),
            _ => None,
        }
    }

    /// Returns `true` if the identifier simply has no record behind it.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        match self {
            Self::OutOfRange { .. } => true,
            Self::Medium { resp, .. } => *resp == resp::ITEMERR || *resp == resp::QIDERR,
            Self::Internal(_) => false,
        }
    }
}

impl From<QueueError> for StorageError {
    fn from(err: QueueError) -> Self {
        Self::Medium {
            resp: err.resp(),
            resp2: err.resp2(),
            source: Some(err),
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for StorageError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Self::Internal(format!("Lock poisoned: {e}"))
    }
}

/// File medium path validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Queue path cannot contain '..' components: {0}")]
    ParentDir(String),

    #[error("Queue path must be absolute: {0}")]
    NotAbsolute(String),

    #[error("Queue path cannot be in system directory {prefix}: {path}")]
    SystemDirectory { prefix: &'static str, path: String },
}

/// Errors building a storage service from configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid storage configuration: {0}")]
    Validation(#[from] ValidationError),

    #[error("I/O error preparing storage: {0}")]
    Io(#[from] io::Error),
}

/// Specialized `Result` type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
