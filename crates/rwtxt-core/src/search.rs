//! Full-text search
//!
//! `files_fts` mirrors the current text of each file, one row per file id.
//! Saves keep it in step; [`Store::check_index`] and
//! [`Store::rebuild_index`] find and repair any drift left by a save that
//! failed between its row and index writes.

use rusqlite::{params, Connection};
use tracing::{info, warn};

use crate::files::{from_millis, scope};
use crate::models::{IndexReport, SearchHit};
use crate::storage::{StoreError, StoreResult};
use crate::store::Store;
use crate::versioned_text::VersionedText;

/// Write `text` as the index row for `id`, inserting it if the id was never
/// indexed
pub(crate) fn sync_index(conn: &Connection, id: &str, text: &str) -> rusqlite::Result<()> {
    let updated = conn.execute(
        "UPDATE files_fts SET data = ?2 WHERE id = ?1",
        params![id, text],
    )?;
    if updated == 0 {
        conn.execute(
            "INSERT INTO files_fts (id, data) VALUES (?1, ?2)",
            params![id, text],
        )?;
    }
    Ok(())
}

/// Map a MATCH failure caused by the query text to `InvalidQuery`
fn match_error(query: &str, err: rusqlite::Error) -> StoreError {
    if let rusqlite::Error::SqliteFailure(_, Some(msg)) = &err {
        if msg.starts_with("fts5:") || msg.starts_with("no such column") {
            return StoreError::InvalidQuery(format!("{:?}: {}", query, msg));
        }
    }
    StoreError::Database(err)
}

fn single_column(conn: &Connection, sql: &str) -> StoreResult<Vec<String>> {
    let mut stmt = conn.prepare(sql)?;
    let values = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(values)
}

impl Store {
    /// Search the files of one domain
    ///
    /// `query` uses the FTS5 match grammar (terms, `prefix*`, `"phrases"`,
    /// `AND`/`OR`/`NOT`). Hits come back most recently modified first, each
    /// with a snippet around the matched terms.
    pub fn find(&self, query: &str, domain: &str) -> StoreResult<Vec<SearchHit>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.lock();
        let mut stmt = conn.prepare(
            r#"
            SELECT files.id, files.slug, domains.name, files.created_at, files.modified_at,
                   files.views, snippet(files_fts, 1, '<b>', '</b>', '...', 30)
            FROM files_fts
            INNER JOIN files ON files.id = files_fts.id
            INNER JOIN domains ON files.domain_id = domains.id
            WHERE files_fts.data MATCH ?1 AND domains.name = ?2
            ORDER BY files.modified_at DESC, files.rowid DESC
            "#,
        )?;

        let hits = stmt
            .query_map(params![query, scope(domain)], |row| {
                Ok(SearchHit {
                    id: row.get(0)?,
                    slug: row.get(1)?,
                    domain: row.get(2)?,
                    created: from_millis(row.get(3)?),
                    modified: from_millis(row.get(4)?),
                    views: row.get(5)?,
                    snippet: row.get(6)?,
                })
            })
            .map_err(|e| match_error(query, e))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| match_error(query, e))?;
        Ok(hits)
    }

    /// Compare the file table with the search index
    pub fn check_index(&self) -> StoreResult<IndexReport> {
        let conn = self.lock();
        Ok(IndexReport {
            missing: single_column(
                &conn,
                "SELECT id FROM files WHERE id NOT IN (SELECT id FROM files_fts) ORDER BY id",
            )?,
            orphaned: single_column(
                &conn,
                "SELECT DISTINCT id FROM files_fts WHERE id NOT IN (SELECT id FROM files) ORDER BY id",
            )?,
            duplicated: single_column(
                &conn,
                "SELECT id FROM files_fts GROUP BY id HAVING COUNT(*) > 1 ORDER BY id",
            )?,
        })
    }

    /// Rebuild the search index from stored histories
    ///
    /// Returns the number of files indexed. Files whose history cannot be
    /// decoded are left out and logged.
    pub fn rebuild_index(&self) -> StoreResult<usize> {
        let conn = self.lock();
        let tx = conn.unchecked_transaction()?;

        let rows = {
            let mut stmt = tx.prepare("SELECT id, history FROM files")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        tx.execute("DELETE FROM files_fts", [])?;
        let mut indexed = 0;
        for (id, history) in rows {
            let text = match history.as_deref() {
                None | Some("") => String::new(),
                Some(json) => match serde_json::from_str::<VersionedText>(json) {
                    Ok(history) => history.current().to_string(),
                    Err(e) => {
                        warn!("not indexing file '{}': unreadable history: {}", id, e);
                        continue;
                    }
                },
            };
            tx.execute(
                "INSERT INTO files_fts (id, data) VALUES (?1, ?2)",
                params![id, text],
            )?;
            indexed += 1;
        }
        tx.commit()?;

        info!("rebuilt search index for {} files", indexed);
        Ok(indexed)
    }
}
