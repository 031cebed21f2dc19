//! rwtxt Core Library
//!
//! Storage core for rwtxt, a multi-tenant, versioned text store. Documents
//! ("files") belong to isolated namespaces ("domains"), keep their full
//! edit history, and are searchable with SQLite FTS5.
//!
//! # Architecture
//!
//! - **SQLite**: one embedded database behind one store-wide lock
//! - **VersionedText**: diff-based history stored as JSON on each file row
//! - **FTS5**: a mirror of each file's current text for search
//!
//! # Quick Start
//!
//! ```text
//! let store = Store::open(Config::load()?)?;
//!
//! store.create_domain("notes", "secret")?;
//! let key = store.issue_key("notes", "secret")?;
//!
//! let file = store.new_file("todo", "- buy milk").in_domain("notes");
//! store.save(&file)?;
//!
//! let hits = store.find("milk", "notes")?;
//! ```
//!
//! # Modules
//!
//! - `store`: Unified storage interface (main entry point)
//! - `domains`: Domain creation, lookup and authentication
//! - `keys`: Access keys and the detached key toucher
//! - `files`: File save, lookup and listings
//! - `search`: Full-text search and index maintenance
//! - `blobs`: Uploads and resized images
//! - `export`: Zip archives of posts and uploads
//! - `versioned_text`: Text history
//! - `models`: Records returned by the store
//! - `storage`: Connection, schema and errors
//! - `config`: Application configuration

pub mod blobs;
pub mod config;
pub mod domains;
pub mod export;
pub mod files;
pub mod keys;
pub mod models;
pub mod search;
pub mod secrets;
pub mod storage;
pub mod store;
pub mod versioned_text;

pub use config::Config;
pub use export::ExportArchive;
pub use keys::{parse_key_list, KeyToucher};
pub use models::{
    Blob, DomainInfo, DomainOptions, File, FileMatch, IndexReport, KeyOwner, SearchHit,
};
pub use storage::{ErrorKind, SaveStep, StoreError, StoreResult, PUBLIC_DOMAIN};
pub use store::Store;
pub use versioned_text::{Chunk, VersionError, VersionedText};
