//! Unified storage interface
//!
//! `Store` is the handle callers hold. It is cheap to clone; all clones share
//! one connection and one lock. Operations are grouped by component:
//!
//! - domains: [`crate::domains`]
//! - access keys: [`crate::keys`]
//! - files and search: [`crate::files`], [`crate::search`]
//! - blobs and resized images: [`crate::blobs`]
//! - export: [`crate::export`]
//!
//! ## Usage
//!
//! ```ignore
//! let store = Store::open(Config::load()?)?;
//!
//! store.create_domain("notes", "secret")?;
//! let key = store.issue_key("notes", "secret")?;
//!
//! let file = File::new("todo", "- buy milk").in_domain("notes");
//! store.save(&file)?;
//! let hits = store.find("milk", "notes")?;
//! ```

use std::sync::Arc;

use parking_lot::MutexGuard;
use rusqlite::Connection;
use tracing::debug;

use crate::config::Config;
use crate::storage::{Database, StoreResult};

/// Handle to an rwtxt database
#[derive(Clone)]
pub struct Store {
    db: Arc<Database>,
    config: Config,
}

impl Store {
    /// Open the database named by `config`, creating it if needed
    pub fn open(config: Config) -> StoreResult<Self> {
        let db = Database::open(&config.database_path())?;
        Ok(Self {
            db: Arc::new(db),
            config,
        })
    }

    /// Open an in-memory store with default configuration
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::open_in_memory_with_config(Config::default())
    }

    /// Open an in-memory store (for testing)
    pub fn open_in_memory_with_config(config: Config) -> StoreResult<Self> {
        Ok(Self {
            db: Arc::new(Database::open_in_memory()?),
            config,
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Close the connection
    ///
    /// The connection is only closed when this is the last handle; other
    /// clones keep it open until they are dropped.
    pub fn close(self) -> StoreResult<()> {
        match Arc::try_unwrap(self.db) {
            Ok(db) => db.close(),
            Err(_) => {
                debug!("store still shared; connection closes with the last handle");
                Ok(())
            }
        }
    }

    /// Take the store-wide lock for the duration of one operation
    pub(crate) fn lock(&self) -> MutexGuard<'_, Connection> {
        self.db.lock()
    }
}

/// Helpers for tests in this crate and its dependents
#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    use super::*;

    /// In-memory store with a cheap password cost
    pub fn test_store() -> Store {
        let config = Config {
            password_cost: 4,
            ..Config::default()
        };
        Store::open_in_memory_with_config(config).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::File;
    use tempfile::TempDir;

    fn test_config(temp_dir: &TempDir) -> Config {
        Config {
            data_dir: temp_dir.path().to_path_buf(),
            password_cost: 4,
            ..Config::default()
        }
    }

    #[test]
    fn test_open_creates_database() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir);

        let store = Store::open(config.clone()).unwrap();
        assert!(config.database_path().exists());
        store.close().unwrap();
    }

    #[test]
    fn test_data_persists_across_reopens() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir);

        let file = File::new("persist", "Persistent text");
        {
            let store = Store::open(config.clone()).unwrap();
            store.save(&file).unwrap();
            store.close().unwrap();
        }

        let store = Store::open(config).unwrap();
        let found = store.get(&file.id, "public").unwrap();
        assert_eq!(found[0].data, "Persistent text");
        assert!(store.lookup_domain("public").is_ok());
    }

    #[test]
    fn test_close_with_other_handles() {
        let store = test_support::test_store();
        let other = store.clone();
        store.close().unwrap();

        // The remaining handle still works
        assert!(other.lookup_domain("public").is_ok());
        other.close().unwrap();
    }
}
