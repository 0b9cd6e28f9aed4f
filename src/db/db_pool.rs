use duckdb::Connection;
use r2d2::{ManageConnection, Pool};
use std::sync::Mutex;

use crate::config::DatabaseConfig;

/// r2d2 manager handing out connections to one DuckDB database.
///
/// The database is opened on the first `connect`; later connections are clones
/// of that root handle, so every pooled connection sees the same instance (this
/// also makes `:memory:` targets shareable).
pub struct DuckDBConnectionManager {
    connection_string: String,
    root: Mutex<Option<Connection>>,
}

impl DuckDBConnectionManager {
    pub fn new(connection_string: String) -> Self {
        Self {
            connection_string,
            root: Mutex::new(None),
        }
    }
}

impl ManageConnection for DuckDBConnectionManager {
    type Connection = Connection;
    type Error = duckdb::Error;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        let mut root = self.root.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(conn) = root.as_ref() {
            return conn.try_clone();
        }

        let conn = Connection::open(&self.connection_string)?;
        let handle = conn.try_clone()?;
        *root = Some(conn);
        Ok(handle)
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        conn.execute_batch("SELECT 1")?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

/// Builds the shared pool without connecting; the first checkout opens the database.
pub fn build_pool(config: &DatabaseConfig) -> Pool<DuckDBConnectionManager> {
    let manager = DuckDBConnectionManager::new(config.connection_string.clone());
    Pool::builder()
        .max_size(config.pool_size as u32)
        .min_idle(Some(0))
        .connection_timeout(config.connect_timeout())
        .build_unchecked(manager)
}
