use duckdb::Connection;
use r2d2::ManageConnection;
use std::sync::Mutex;

/// r2d2 manager for the application database (conversation log).
///
/// Every pooled connection is cloned from one root connection so they all
/// share a single database instance instead of opening the file repeatedly.
pub struct DuckDBConnectionManager {
    root: Mutex<Connection>,
}

impl DuckDBConnectionManager {
    pub fn new(connection_string: &str) -> Result<Self, duckdb::Error> {
        Ok(Self {
            root: Mutex::new(Connection::open(connection_string)?),
        })
    }

    pub fn in_memory() -> Result<Self, duckdb::Error> {
        Ok(Self {
            root: Mutex::new(Connection::open_in_memory()?),
        })
    }
}

impl ManageConnection for DuckDBConnectionManager {
    type Connection = Connection;
    type Error = duckdb::Error;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        let root = self
            .root
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        root.try_clone()
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        conn.execute_batch("SELECT 1")
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}
