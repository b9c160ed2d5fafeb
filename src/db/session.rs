use crate::db::executor::{execute, ExecutionError, QueryRunner, TabularResult};
use crate::db::introspector::{introspect, IntrospectError};
use crate::db::schema::SchemaContext;
use async_trait::async_trait;
use duckdb::{AccessMode, Config, Connection};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("database file not found: {0}")]
    Missing(PathBuf),
    #[error("failed to open database {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: duckdb::Error,
    },
    #[error(transparent)]
    Introspect(#[from] IntrospectError),
    #[error("database worker failed: {0}")]
    Worker(String),
}

/// One connection to one project database, owned by a single question.
///
/// Blocking DuckDB work runs on tokio's blocking pool; the connection is
/// closed when the session and any in-flight worker holding it are dropped.
pub struct DbSession {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl DbSession {
    pub fn open(path: &Path, read_only: bool) -> Result<Self, SessionError> {
        // DuckDB would happily create a missing file in read-write mode
        if !path.is_file() {
            return Err(SessionError::Missing(path.to_path_buf()));
        }

        let open_err = |source| SessionError::Open {
            path: path.to_path_buf(),
            source,
        };

        let conn = if read_only {
            let config = Config::default()
                .access_mode(AccessMode::ReadOnly)
                .map_err(open_err)?;
            Connection::open_with_flags(path, config).map_err(open_err)?
        } else {
            Connection::open(path).map_err(open_err)?
        };

        debug!("Opened session on {} (read_only={})", path.display(), read_only);
        Ok(Self {
            path: path.to_path_buf(),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn introspect(&self, sample_rows: usize) -> Result<SchemaContext, SessionError> {
        self.with_connection(move |conn| introspect(conn, sample_rows))
            .await
            .map_err(SessionError::Worker)?
            .map_err(SessionError::from)
    }

    pub async fn execute(&self, sql: &str) -> Result<TabularResult, ExecutionError> {
        let sql = sql.to_string();
        self.with_connection(move |conn| execute(conn, &sql))
            .await
            .map_err(ExecutionError::new)?
    }

    async fn with_connection<T, F>(&self, f: F) -> Result<T, String>
    where
        F: FnOnce(&Connection) -> T + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            // A panic in an earlier worker leaves the connection itself usable
            let guard = conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            f(&guard)
        })
        .await
        .map_err(|e| e.to_string())
    }
}

#[async_trait]
impl QueryRunner for DbSession {
    async fn run(&self, sql: &str) -> Result<TabularResult, ExecutionError> {
        self.execute(sql).await
    }
}

impl Drop for DbSession {
    fn drop(&mut self) {
        debug!("Closing session on {}", self.path.display());
    }
}
