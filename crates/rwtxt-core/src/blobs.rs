//! Blob and resized-image cache
//!
//! Uploads and their resized renditions are opaque byte payloads keyed by
//! id. Both tables have the same shape and share one implementation. Every
//! successful read bumps the view counter of the row it read; a failed
//! bump is logged and does not fail the read.

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, warn};

use crate::models::Blob;
use crate::storage::{StoreError, StoreResult};
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlobTable {
    Blobs,
    ResizedImages,
}

impl BlobTable {
    fn name(self) -> &'static str {
        match self {
            BlobTable::Blobs => "blobs",
            BlobTable::ResizedImages => "resized_images",
        }
    }
}

fn save_into(conn: &Connection, table: BlobTable, id: &str, name: &str, data: &[u8]) -> StoreResult<()> {
    if id.is_empty() {
        return Err(StoreError::Validation("blob id cannot be empty".into()));
    }
    let sql = format!(
        r#"
        INSERT INTO {} (id, name, data, views) VALUES (?1, ?2, ?3, 0)
        ON CONFLICT(id) DO UPDATE SET name = excluded.name, data = excluded.data
        "#,
        table.name()
    );
    conn.execute(&sql, params![id, name, data])?;
    debug!("stored {} bytes in {} as '{}'", data.len(), table.name(), id);
    Ok(())
}

fn read_from(conn: &Connection, table: BlobTable, id: &str) -> StoreResult<Blob> {
    let sql = format!("SELECT name, data, views FROM {} WHERE id = ?", table.name());
    let blob = conn
        .query_row(&sql, params![id], |row| {
            Ok(Blob {
                id: id.to_string(),
                name: row.get(0)?,
                data: row.get::<_, Option<Vec<u8>>>(1)?.unwrap_or_default(),
                views: row.get(2)?,
            })
        })
        .optional()?
        .ok_or_else(|| StoreError::BlobNotFound(id.to_string()))?;

    let bump = format!("UPDATE {} SET views = views + 1 WHERE id = ?", table.name());
    if let Err(e) = conn.execute(&bump, params![id]) {
        warn!("failed to count view of '{}' in {}: {}", id, table.name(), e);
    }
    Ok(blob)
}

impl Store {
    /// Store an upload, replacing any payload with the same id
    pub fn save_blob(&self, id: &str, name: &str, data: &[u8]) -> StoreResult<()> {
        let conn = self.lock();
        save_into(&conn, BlobTable::Blobs, id, name, data)
    }

    /// Fetch an upload and count the view
    pub fn get_blob(&self, id: &str) -> StoreResult<Blob> {
        let conn = self.lock();
        read_from(&conn, BlobTable::Blobs, id)
    }

    /// Store a resized rendition
    pub fn save_resized_image(&self, id: &str, name: &str, data: &[u8]) -> StoreResult<()> {
        let conn = self.lock();
        save_into(&conn, BlobTable::ResizedImages, id, name, data)
    }

    /// Fetch a resized rendition and count the view
    pub fn get_resized_image(&self, id: &str) -> StoreResult<Blob> {
        let conn = self.lock();
        read_from(&conn, BlobTable::ResizedImages, id)
    }

    /// Ids of every upload, sorted
    pub fn blob_ids(&self) -> StoreResult<Vec<String>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT id FROM blobs ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }
}
