//! Insert gateway: persistence behind a small capability trait.
//!
//! The HTTP layer only ever talks to [`MeasurementStore`], so handlers can be
//! exercised against [`MemoryStore`] without a database. [`SqliteStore`] is the
//! production backend.

mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::Measurement;

/// Storage failures. Callers should treat these as opaque.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open database at {path}: {source}")]
    #[cfg(feature = "sqlite")]
    Open {
        path: std::path::PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("constraint violated: {0}")]
    Constraint(String),

    #[error("store is closed")]
    Closed,

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("failed to encode sub-document: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("database error: {0}")]
    #[cfg(feature = "sqlite")]
    Sqlite(rusqlite::Error),
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(rusqlite::ErrorCode::ConstraintViolation) => StoreError::Constraint(err.to_string()),
            _ => StoreError::Sqlite(err),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Write-side capability of a measurement store.
///
/// Inserts are not idempotent: a retried request produces a second row unless
/// its `uuid` collides with an existing one.
#[async_trait]
pub trait MeasurementStore: Send + Sync {
    /// Persist one record and return it with its assigned `id`.
    ///
    /// Any `id` already set on `record` is ignored.
    async fn insert(&self, record: Measurement) -> StoreResult<Measurement>;

    /// Create the measurements table when it does not exist yet.
    async fn create_table_if_not_exists(&self) -> StoreResult<()>;

    /// Cheap round-trip proving the store can serve requests.
    async fn health_check(&self) -> StoreResult<()>;

    async fn close(&self) -> StoreResult<()>;
}
