use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{MeasurementStore, StoreError, StoreResult};
use crate::model::Measurement;

/// In-process store keeping rows in a `Vec`.
///
/// Mirrors the SQLite backend's observable behaviour: ids start at 1 and
/// increase, and a repeated `uuid` is a constraint violation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    rows: Vec<Measurement>,
    uuids: HashSet<String>,
    table_created: bool,
    closed: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored row, in insertion order.
    pub fn rows(&self) -> Vec<Measurement> {
        self.inner
            .lock()
            .map(|inner| inner.rows.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|inner| inner.rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn table_created(&self) -> bool {
        self.inner
            .lock()
            .map(|inner| inner.table_created)
            .unwrap_or(false)
    }

    fn with_inner<T>(&self, f: impl FnOnce(&mut Inner) -> StoreResult<T>) -> StoreResult<T> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))?;
        if inner.closed {
            return Err(StoreError::Closed);
        }
        f(&mut inner)
    }
}

#[async_trait]
impl MeasurementStore for MemoryStore {
    async fn insert(&self, mut record: Measurement) -> StoreResult<Measurement> {
        self.with_inner(|inner| {
            if let Some(uuid) = &record.uuid {
                if !inner.uuids.insert(uuid.clone()) {
                    return Err(StoreError::Constraint(format!(
                        "duplicate measurement uuid {uuid}"
                    )));
                }
            }
            record.id = i64::try_from(inner.rows.len())
                .map_err(|_| StoreError::Unavailable("memory store full".into()))?
                + 1;
            inner.rows.push(record.clone());
            Ok(record)
        })
    }

    async fn create_table_if_not_exists(&self) -> StoreResult<()> {
        self.with_inner(|inner| {
            inner.table_created = true;
            Ok(())
        })
    }

    async fn health_check(&self) -> StoreResult<()> {
        self.with_inner(|_| Ok(()))
    }

    async fn close(&self) -> StoreResult<()> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))?;
        inner.closed = true;
        Ok(())
    }
}
