use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;
use tokio::task;
use crate::config::Config;
use crate::error::{Result, GrailError};

pub mod backfill;
pub mod records;
pub mod schema;

pub use backfill::{backfill, BackfillReport};
pub use records::{count_documents, document_exists, get_document, StoredDocument};
pub use schema::{ensure_schema, SchemaReport, TABLE};

/// Default wait for a locked database before giving up
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Database connection wrapper
#[derive(Debug, Clone)]
pub struct Db {
    path: std::path::PathBuf,
    busy_timeout: Duration,
}

impl Db {
    /// Create a new database connection manager
    pub fn new<P: AsRef<Path>>(db_path: P) -> Self {
        Self {
            path: db_path.as_ref().to_path_buf(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    /// Build from loaded configuration
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.db_path())
            .with_busy_timeout(Duration::from_millis(config.database.busy_timeout_ms))
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a new database connection with the standard pragmas
    pub fn open_connection(&self) -> Result<Connection> {
        open_with_pragmas(&self.path, self.busy_timeout)
    }

    /// Open the store, ensure the schema and return what changed.
    ///
    /// Any failure here is fatal for the invocation: it runs before a single
    /// file is read.
    pub async fn connect(&self) -> Result<SchemaReport> {
        self.with_connection(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .map_err(|e| GrailError::StoreUnavailable(e.to_string()))?;
            ensure_schema(conn)
        })
        .await
    }

    /// Execute a closure with a database connection in a blocking task
    pub async fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let path = self.path.clone();
        let busy_timeout = self.busy_timeout;
        task::spawn_blocking(move || {
            let mut conn = open_with_pragmas(&path, busy_timeout)?;
            f(&mut conn)
        })
        .await
        .map_err(|e| GrailError::StoreUnavailable(format!("database task failed: {}", e)))?
    }
}

fn open_with_pragmas(path: &Path, busy_timeout: Duration) -> Result<Connection> {
    let conn = Connection::open(path).map_err(|e| {
        GrailError::StoreUnavailable(format!("cannot open {}: {}", path.display(), e))
    })?;

    conn.busy_timeout(busy_timeout)?;

    // WAL: readers never block a batch writer
    conn.execute_batch(
        "PRAGMA journal_mode = WAL; \
         PRAGMA synchronous = NORMAL; \
         PRAGMA foreign_keys = ON; \
         PRAGMA temp_store = MEMORY;"
    )?;

    Ok(conn)
}
