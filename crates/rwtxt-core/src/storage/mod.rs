//! Storage layer
//!
//! Owns the single SQLite connection and the lock that serializes access to
//! it.
//!
//! ## Locking
//!
//! The connection sits behind one process-wide mutex. Each public store
//! operation takes the guard once, runs all of its statements, and drops the
//! guard on every exit path. There is no unlocked read path and no
//! acquisition timeout; a caller waiting on the lock blocks its thread.

pub mod error;
pub mod schema;

use std::path::{Path, PathBuf};

use parking_lot::{Mutex, MutexGuard};
use rusqlite::Connection;
use tracing::debug;

pub use error::{ErrorKind, SaveStep, StoreError, StoreResult};
pub use schema::{init_schema, PUBLIC_DOMAIN, SCHEMA_VERSION};

/// The database connection and its lock
pub struct Database {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl Database {
    /// Open or create the database file and make sure the schema exists
    ///
    /// Fails if the engine cannot create the schema, including the
    /// full-text table.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDirectory {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path)?;
        init_schema(&conn)?;
        debug!("opened database at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// Path of the database file, `None` when in memory
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Take the store-wide lock
    ///
    /// The connection is only reachable through the returned guard.
    pub fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }

    /// Close the connection, reporting any error SQLite raises
    pub fn close(self) -> StoreResult<()> {
        let conn = self.conn.into_inner();
        conn.close().map_err(|(_, e)| StoreError::Database(e))
    }
}
