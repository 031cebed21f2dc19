//! SQLite schema
//!
//! Five tables plus one FTS5 virtual table. Every statement is
//! `IF NOT EXISTS`, so initialization is safe to run on every open.
//!
//! ## Tables
//!
//! - `files` - one row per document; history is a JSON column
//! - `files_fts` - full-text mirror of each file's current text
//! - `domains` - tenant namespaces; options is a JSON column
//! - `access_keys` - bearer tokens bound to a domain
//! - `blobs` - uploaded binary payloads
//! - `resized_images` - derived image renditions

use rusqlite::{params, Connection, OptionalExtension, Result};
use tracing::info;

use crate::models::DomainOptions;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Name of the domain that always exists
pub const PUBLIC_DOMAIN: &str = "public";

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Schema version tracking
        CREATE TABLE IF NOT EXISTS schema_info (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS files (
            id TEXT NOT NULL PRIMARY KEY,
            domain_id INTEGER NOT NULL,
            slug TEXT NOT NULL DEFAULT '',
            created_at INTEGER NOT NULL,
            modified_at INTEGER NOT NULL,
            history TEXT,
            views INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS domains (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            hashed_pass TEXT,
            is_public INTEGER NOT NULL DEFAULT 0,
            options TEXT
        );

        CREATE TABLE IF NOT EXISTS access_keys (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            domain_id INTEGER NOT NULL,
            key TEXT NOT NULL,
            last_used INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS blobs (
            id TEXT NOT NULL PRIMARY KEY,
            name TEXT NOT NULL DEFAULT '',
            data BLOB,
            views INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS resized_images (
            id TEXT NOT NULL PRIMARY KEY,
            name TEXT NOT NULL DEFAULT '',
            data BLOB,
            views INTEGER NOT NULL DEFAULT 0
        );

        -- Slug resolution is always scoped to a domain
        CREATE INDEX IF NOT EXISTS idx_files_slug_domain ON files(slug, domain_id);
        CREATE INDEX IF NOT EXISTS idx_files_domain_modified ON files(domain_id, modified_at);

        -- Domain names are unique regardless of case
        CREATE UNIQUE INDEX IF NOT EXISTS idx_domains_name ON domains(name COLLATE NOCASE);

        CREATE INDEX IF NOT EXISTS idx_access_keys_key ON access_keys(key);

        -- Full-text search over each file's current text
        CREATE VIRTUAL TABLE IF NOT EXISTS files_fts USING fts5(
            id UNINDEXED,
            data
        );
        "#,
    )?;

    conn.execute(
        "INSERT OR REPLACE INTO schema_info (key, value) VALUES ('version', ?)",
        [SCHEMA_VERSION.to_string()],
    )?;

    ensure_public_domain(conn)?;

    Ok(())
}

/// Create the public domain with no password if it is missing
fn ensure_public_domain(conn: &Connection) -> Result<()> {
    let exists = conn
        .query_row(
            "SELECT id FROM domains WHERE name = ? COLLATE NOCASE",
            params![PUBLIC_DOMAIN],
            |row| row.get::<_, i64>(0),
        )
        .optional()?
        .is_some();
    if exists {
        return Ok(());
    }

    // Stored as an empty hash: only the empty password signs in.
    let options = serde_json::to_string(&DomainOptions::default())
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
    conn.execute(
        "INSERT INTO domains (name, hashed_pass, is_public, options) VALUES (?, '', 1, ?)",
        params![PUBLIC_DOMAIN, options],
    )?;
    info!("created '{}' domain", PUBLIC_DOMAIN);
    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<Option<i32>> {
    let mut stmt = conn.prepare("SELECT value FROM schema_info WHERE key = 'version'")?;
    let result: Result<String> = stmt.query_row([], |row| row.get(0));

    match result {
        Ok(version_str) => Ok(version_str.parse().ok()),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(conn: &Connection, kind: &str) -> Vec<String> {
        conn.prepare("SELECT name FROM sqlite_master WHERE type = ? ORDER BY name")
            .unwrap()
            .query_map([kind], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect()
    }

    #[test]
    fn test_init_schema() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let tables = names(&conn, "table");
        for table in ["files", "domains", "access_keys", "blobs", "resized_images", "files_fts"] {
            assert!(tables.contains(&table.to_string()), "missing {}", table);
        }

        let indexes = names(&conn, "index");
        assert!(indexes.contains(&"idx_files_slug_domain".to_string()));
        assert!(indexes.contains(&"idx_domains_name".to_string()));
    }

    #[test]
    fn test_init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();

        let publics: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM domains WHERE name = 'public'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(publics, 1);
        assert_eq!(get_schema_version(&conn).unwrap(), Some(SCHEMA_VERSION));
    }

    #[test]
    fn test_public_domain_is_public() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let (is_public, hash): (i64, String) = conn
            .query_row(
                "SELECT is_public, hashed_pass FROM domains WHERE name = 'public'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(is_public, 1);
        assert!(hash.is_empty());
    }

    #[test]
    fn test_domain_names_unique_case_insensitive() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let err = conn
            .execute("INSERT INTO domains (name) VALUES ('PUBLIC')", [])
            .unwrap_err();
        assert!(err.to_string().contains("UNIQUE"));
    }
}
