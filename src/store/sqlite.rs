//! SQLite-backed measurement store.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{Connection, params};
use tracing::{debug, info};

use super::{MeasurementStore, StoreError, StoreResult};
use crate::model::Measurement;

const CREATE_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS measurements (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp   TEXT,
    uuid        TEXT UNIQUE,
    browser_id  TEXT NOT NULL,
    device_type TEXT NOT NULL DEFAULT '',
    notes       TEXT NOT NULL DEFAULT '',
    client_info TEXT,
    server_info TEXT,
    download    REAL NOT NULL,
    upload      REAL NOT NULL,
    latency     INTEGER NOT NULL,
    results     TEXT NOT NULL
)";

const INSERT: &str = r"
INSERT INTO measurements (
    timestamp, uuid, browser_id, device_type, notes,
    client_info, server_info, download, upload, latency, results
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)";

/// Measurement store on a single SQLite connection.
///
/// The connection is not `Sync`, so it sits behind a mutex and every call runs
/// on tokio's blocking pool. `close` drops the connection; later calls fail
/// with [`StoreError::Closed`].
///
/// The nested `clientInfo`, `serverInfo` and `results` blocks are stored as
/// JSON text.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
    conn: Arc<Mutex<Option<Connection>>>,
}

impl SqliteStore {
    /// Open or create a database file. `":memory:"` opens a private in-memory
    /// database.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if path.as_os_str() == ":memory:" {
            return Self::open_in_memory();
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|err| {
                StoreError::Unavailable(format!("cannot create {}: {err}", parent.display()))
            })?;
        }

        debug!("Opening measurement database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| StoreError::Open {
            path: path.clone(),
            source,
        })?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        info!("Measurement database opened at {}", path.display());
        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(Some(conn))),
        })
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let path = PathBuf::from(":memory:");
        let conn = Connection::open_in_memory().map_err(|source| StoreError::Open {
            path: path.clone(),
            source,
        })?;
        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(Some(conn))),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> StoreResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| StoreError::Unavailable("connection lock poisoned".into()))?;
            match guard.as_ref() {
                Some(conn) => f(conn),
                None => Err(StoreError::Closed),
            }
        })
        .await
        .map_err(|err| StoreError::Unavailable(format!("blocking task failed: {err}")))?
    }
}

fn insert_row(conn: &Connection, record: &Measurement) -> StoreResult<i64> {
    let client_info = record
        .client_info
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let server_info = record
        .server_info
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let results = serde_json::to_string(&record.results)?;

    conn.execute(
        INSERT,
        params![
            record.timestamp.map(|ts| ts.to_rfc3339()),
            record.uuid,
            record.browser_id,
            record.device_type,
            record.notes,
            client_info,
            server_info,
            record.download,
            record.upload,
            record.latency,
            results,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

#[async_trait]
impl MeasurementStore for SqliteStore {
    async fn insert(&self, mut record: Measurement) -> StoreResult<Measurement> {
        self.with_conn(move |conn| {
            record.id = insert_row(conn, &record)?;
            debug!(id = record.id, browser_id = %record.browser_id, "Inserted measurement");
            Ok(record)
        })
        .await
    }

    async fn create_table_if_not_exists(&self) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute(CREATE_TABLE, [])?;
            Ok(())
        })
        .await
    }

    async fn health_check(&self) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
        .await
    }

    async fn close(&self) -> StoreResult<()> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Unavailable("connection lock poisoned".into()))?;
            match guard.take() {
                Some(conn) => conn.close().map_err(|(_, err)| StoreError::from(err)),
                None => Ok(()),
            }
        })
        .await
        .map_err(|err| StoreError::Unavailable(format!("blocking task failed: {err}")))?
    }
}
