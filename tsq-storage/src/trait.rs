use async_trait::async_trait;

use crate::{Record, RecordId, Result};

/// Storage of opaque records under backend-assigned sequential identifiers.
///
/// For every backend, a record written by [`put`](StorageService::put) is
/// returned unchanged by [`get`](StorageService::get) with the identifier `put`
/// handed back, as soon as `put` returns.
///
/// The lifecycle host calls [`activate`](StorageService::activate) once before
/// the first `get`/`put`, and [`deactivate`](StorageService::deactivate) once
/// after the last. Deactivation releases in-process state only; anything the
/// backend wrote to a durable medium stays there.
#[async_trait]
pub trait StorageService: Send + Sync + std::fmt::Debug {
    /// Short name used when logging bindings.
    fn name(&self) -> &'static str;

    /// Fetch the record stored under `id`.
    ///
    /// # Errors
    /// If `id` does not correspond to a stored record, or the medium fails
    async fn get(&self, id: RecordId) -> Result<Record>;

    /// Store `record`, returning the identifier assigned to it.
    ///
    /// Either an identifier is returned or nothing was written.
    ///
    /// # Errors
    /// If the underlying durable write fails
    async fn put(&self, record: &str) -> Result<RecordId>;

    /// One-time setup when this instance becomes the active binding.
    ///
    /// # Errors
    /// If the backend cannot start
    async fn activate(&self) -> Result<()> {
        Ok(())
    }

    /// Release in-process state when this instance stops being bound.
    ///
    /// # Errors
    /// If the backend cannot shut down cleanly
    async fn deactivate(&self) -> Result<()> {
        Ok(())
    }
}
