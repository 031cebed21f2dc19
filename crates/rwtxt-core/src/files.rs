//! File repository
//!
//! Documents live in the `files` table with their history serialized as
//! JSON. Every save writes the row and then mirrors the current text into
//! the full-text index. The two writes commit separately; a failure between
//! them is reported with the step that failed, and repeating the save
//! converges.
//!
//! Files with empty text stay addressable by id but drop out of listings
//! and search.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use tracing::debug;

use crate::domains::{domain_id, normalize_name};
use crate::models::{File, FileMatch};
use crate::search::sync_index;
use crate::secrets::is_file_id;
use crate::storage::{SaveStep, StoreError, StoreResult, PUBLIC_DOMAIN};
use crate::store::Store;
use crate::versioned_text::VersionedText;

/// Columns selected for every file read, in `FileRow` order
const FILE_COLUMNS: &str = "files.id, files.slug, domains.name, files.created_at, \
                            files.modified_at, files.history, files.views";

/// Raw file row from the database
struct FileRow {
    id: String,
    slug: String,
    domain: String,
    created_at: i64,
    modified_at: i64,
    history: Option<String>,
    views: i64,
}

impl FileRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            slug: row.get(1)?,
            domain: row.get(2)?,
            created_at: row.get(3)?,
            modified_at: row.get(4)?,
            history: row.get(5)?,
            views: row.get(6)?,
        })
    }

    fn into_file(self) -> StoreResult<File> {
        let history = decode_history(self.history.as_deref())?;
        Ok(File {
            id: self.id,
            slug: self.slug,
            domain: self.domain,
            created: from_millis(self.created_at),
            modified: from_millis(self.modified_at),
            data: history.current().to_string(),
            history,
            views: self.views,
        })
    }
}

fn decode_history(raw: Option<&str>) -> StoreResult<VersionedText> {
    match raw {
        None | Some("") => Ok(VersionedText::default()),
        Some(json) => Ok(serde_json::from_str(json)?),
    }
}

pub(crate) fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

/// Domain name to scope by; empty means public
pub(crate) fn scope(domain: &str) -> String {
    let name = normalize_name(domain);
    if name.is_empty() {
        PUBLIC_DOMAIN.to_string()
    } else {
        name
    }
}

fn query_files(conn: &Connection, sql: &str, params: &[&dyn ToSql]) -> StoreResult<Vec<File>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, FileRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(FileRow::into_file).collect()
}

fn file_by_id(conn: &Connection, id: &str) -> StoreResult<Option<File>> {
    let sql = format!(
        "SELECT {} FROM files INNER JOIN domains ON files.domain_id = domains.id WHERE files.id = ?",
        FILE_COLUMNS
    );
    conn.query_row(&sql, params![id], FileRow::from_row)
        .optional()?
        .map(FileRow::into_file)
        .transpose()
}

/// Listing order for the non-empty files of a domain
enum Listing {
    Created,
    Modified,
    Views,
}

impl Listing {
    fn order_by(&self) -> &'static str {
        match self {
            Listing::Created => "files.created_at DESC, files.rowid DESC",
            Listing::Modified => "files.modified_at DESC, files.rowid DESC",
            Listing::Views => "files.views DESC, files.modified_at DESC",
        }
    }

    fn by_time(order_by_created: bool) -> Self {
        if order_by_created {
            Listing::Created
        } else {
            Listing::Modified
        }
    }
}

/// The stored row a save merges into
struct ExistingRow {
    domain_id: i64,
    domain: String,
    created_at: i64,
    history: Option<String>,
    views: i64,
}

fn load_existing(conn: &Connection, id: &str) -> rusqlite::Result<Option<ExistingRow>> {
    conn.query_row(
        r#"
        SELECT files.domain_id, domains.name, files.created_at, files.history, files.views
        FROM files
        LEFT JOIN domains ON files.domain_id = domains.id
        WHERE files.id = ?
        "#,
        params![id],
        |row| {
            Ok(ExistingRow {
                domain_id: row.get(0)?,
                domain: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                created_at: row.get(2)?,
                history: row.get(3)?,
                views: row.get(4)?,
            })
        },
    )
    .optional()
}

impl Store {
    /// Build a new, unsaved file in the public domain
    pub fn new_file(&self, slug: &str, data: &str) -> File {
        File::new(slug, data)
    }

    /// Save a file, extending its stored history
    ///
    /// The incoming text is appended to the history already in the
    /// database, not to `file.history`. Saving unchanged text adds no
    /// version but still refreshes the modification time. A file stays in
    /// the domain it was first saved to.
    pub fn save(&self, file: &File) -> StoreResult<File> {
        let domain = file.domain_or_public();
        let conn = self.lock();
        let domain_id = domain_id(&conn, &domain)?;

        let existing = load_existing(&conn, &file.id)
            .map_err(|e| StoreError::at_step(&file.id, SaveStep::LoadHistory, e))?;

        let now = Utc::now().timestamp_millis();
        let (history, created_at, views) = match existing {
            Some(row) => {
                if row.domain_id != domain_id {
                    return Err(StoreError::DomainMismatch {
                        id: file.id.clone(),
                        expected: row.domain,
                        requested: domain,
                    });
                }
                let mut history = decode_history(row.history.as_deref())
                    .map_err(|e| StoreError::at_step(&file.id, SaveStep::LoadHistory, e))?;
                history.update(file.data.as_str());
                (history, row.created_at, row.views)
            }
            None => (
                VersionedText::new(file.data.as_str()),
                file.created.timestamp_millis(),
                0,
            ),
        };

        let encoded = serde_json::to_string(&history)
            .map_err(|e| StoreError::at_step(&file.id, SaveStep::UpsertRow, e))?;
        conn.execute(
            r#"
            INSERT INTO files (id, domain_id, slug, created_at, modified_at, history, views)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)
            ON CONFLICT(id) DO UPDATE SET
                slug = excluded.slug,
                modified_at = excluded.modified_at,
                history = excluded.history
            "#,
            params![file.id, domain_id, file.slug, created_at, now, encoded],
        )
        .map_err(|e| StoreError::at_step(&file.id, SaveStep::UpsertRow, e))?;

        sync_index(&conn, &file.id, history.current())
            .map_err(|e| StoreError::at_step(&file.id, SaveStep::SyncIndex, e))?;

        debug!("saved file '{}' in '{}' ({} versions)", file.id, domain, history.len());

        Ok(File {
            id: file.id.clone(),
            slug: file.slug.clone(),
            domain,
            created: from_millis(created_at),
            modified: from_millis(now),
            data: history.current().to_string(),
            history,
            views,
        })
    }

    /// Fetch a file by id, or every file with that slug in `domain`
    ///
    /// Slug matches come back most recently modified first.
    pub fn get(&self, id_or_slug: &str, domain: &str) -> StoreResult<Vec<File>> {
        let conn = self.lock();

        if is_file_id(id_or_slug) {
            if let Some(file) = file_by_id(&conn, id_or_slug)? {
                return Ok(vec![file]);
            }
        }

        let sql = format!(
            r#"
            SELECT {}
            FROM files
            INNER JOIN domains ON files.domain_id = domains.id
            WHERE files.slug = ? AND domains.name = ?
            ORDER BY files.modified_at DESC, files.rowid DESC
            "#,
            FILE_COLUMNS
        );
        let files = query_files(&conn, &sql, params![id_or_slug, scope(domain)])?;
        if files.is_empty() {
            return Err(StoreError::FileNotFound(id_or_slug.to_string()));
        }
        Ok(files)
    }

    /// Every non-empty file in a domain, newest first
    pub fn get_all(&self, domain: &str, order_by_created: bool) -> StoreResult<Vec<File>> {
        self.list(domain, Listing::by_time(order_by_created), None)
    }

    /// The `n` newest non-empty files in a domain
    pub fn get_top_x(&self, domain: &str, n: usize, order_by_created: bool) -> StoreResult<Vec<File>> {
        self.list(domain, Listing::by_time(order_by_created), Some(n))
    }

    /// The `n` most viewed non-empty files in a domain
    pub fn get_top_x_most_viewed(&self, domain: &str, n: usize) -> StoreResult<Vec<File>> {
        self.list(domain, Listing::Views, Some(n))
    }

    fn list(&self, domain: &str, order: Listing, limit: Option<usize>) -> StoreResult<Vec<File>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM files
            INNER JOIN files_fts ON files.id = files_fts.id
            INNER JOIN domains ON files.domain_id = domains.id
            WHERE domains.name = ?1 AND LENGTH(files_fts.data) > 0
            ORDER BY {}
            LIMIT ?2
            "#,
            FILE_COLUMNS,
            order.order_by()
        );
        // SQLite treats a negative limit as no limit
        let limit = limit.map_or(-1, |n| i64::try_from(n).unwrap_or(i64::MAX));

        let conn = self.lock();
        query_files(&conn, &sql, params![scope(domain), limit])
    }

    /// Add one view to a file
    pub fn update_views(&self, file: &File) -> StoreResult<()> {
        let conn = self.lock();
        let updated = conn.execute(
            "UPDATE files SET views = views + 1 WHERE id = ?",
            params![file.id],
        )?;
        if updated == 0 {
            return Err(StoreError::FileNotFound(file.id.clone()));
        }
        Ok(())
    }

    /// Check for an id or slug in `domain` without loading content
    ///
    /// A slug shared by several files resolves to the most recently
    /// modified one and sets `many`.
    pub fn exists(&self, id_or_slug: &str, domain: &str) -> StoreResult<Option<FileMatch>> {
        let domain = scope(domain);
        let conn = self.lock();

        let by_id = conn
            .query_row(
                r#"
                SELECT files.id FROM files
                INNER JOIN domains ON files.domain_id = domains.id
                WHERE files.id = ? AND domains.name = ?
                "#,
                params![id_or_slug, domain],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        if let Some(id) = by_id {
            return Ok(Some(FileMatch { id, many: false }));
        }

        let mut stmt = conn.prepare(
            r#"
            SELECT files.id FROM files
            INNER JOIN domains ON files.domain_id = domains.id
            WHERE files.slug = ? AND domains.name = ?
            ORDER BY files.modified_at DESC, files.rowid DESC
            LIMIT 2
            "#,
        )?;
        let ids = stmt
            .query_map(params![id_or_slug, domain], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ids.first().map(|id| FileMatch {
            id: id.clone(),
            many: ids.len() > 1,
        }))
    }

    /// Most recent modification time across every domain
    pub fn last_modified(&self) -> StoreResult<Option<DateTime<Utc>>> {
        let conn = self.lock();
        let millis: Option<i64> =
            conn.query_row("SELECT MAX(modified_at) FROM files", [], |row| row.get(0))?;
        Ok(millis.map(from_millis))
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::storage::ErrorKind;
    use crate::store::test_support::test_store;

    #[test]
    fn test_save_and_get_round_trip() {
        let store = test_store();
        store.create_domain("notes", "").unwrap();

        let file = store.new_file("todo", "- buy milk").in_domain("notes");
        let saved = store.save(&file).unwrap();
        assert_eq!(saved.domain, "notes");

        let found = store.get(&file.id, "notes").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, file.id);
        assert_eq!(found[0].slug, "todo");
        assert_eq!(found[0].data, "- buy milk");
        assert_eq!(found[0].domain, "notes");
    }

    #[test]
    fn test_first_save_keeps_created_time() {
        let store = test_store();
        let mut file = File::new("dated", "text");
        file.created = DateTime::parse_from_rfc3339("2020-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        let saved = store.save(&file).unwrap();
        assert_eq!(saved.created, file.created);
        assert_eq!(store.get(&file.id, "public").unwrap()[0].created, file.created);

        // Later saves keep the stored creation time
        let mut later = file.clone();
        later.created = Utc::now();
        later.data = "more text".to_string();
        assert_eq!(store.save(&later).unwrap().created, file.created);
    }

    #[test]
    fn test_save_over_unreadable_history_fails() {
        let store = test_store();
        let mut file = File::new("damaged", "v1");
        store.save(&file).unwrap();
        file.data = "v2".to_string();
        store.save(&file).unwrap();

        let truncated = {
            let conn = store.lock();
            let raw: String = conn
                .query_row("SELECT history FROM files WHERE id = ?", [&file.id], |row| {
                    row.get(0)
                })
                .unwrap();
            let truncated = raw[..raw.len() - 1].to_string();
            conn.execute(
                "UPDATE files SET history = ? WHERE id = ?",
                params![truncated, file.id],
            )
            .unwrap();
            truncated
        };

        file.data = "v3".to_string();
        let err = store.save(&file).unwrap_err();
        assert!(matches!(
            err,
            StoreError::SaveStep {
                step: SaveStep::LoadHistory,
                ..
            }
        ));
        assert!(!err.is_retryable());

        let conn = store.lock();
        let stored: String = conn
            .query_row("SELECT history FROM files WHERE id = ?", [&file.id], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(stored, truncated);
    }

    #[test]
    fn test_save_to_missing_domain() {
        let store = test_store();
        let file = File::new("a", "b").in_domain("nowhere");
        let err = store.save(&file).unwrap_err();
        assert!(matches!(err, StoreError::DomainNotFound(_)));
    }

    #[test]
    fn test_history_grows_with_each_save() {
        let store = test_store();
        let mut file = File::new("draft", "one");
        let texts = ["one", "one two", "two", "", "three"];

        for text in texts {
            file.data = text.to_string();
            store.save(&file).unwrap();
        }

        let stored = store.get(&file.id, "").unwrap().remove(0);
        assert_eq!(stored.history.len(), texts.len());
        assert_eq!(stored.data, "three");
        for (i, text) in texts.iter().enumerate() {
            assert_eq!(stored.history.version(i).unwrap(), *text);
        }
        stored.history.verify().unwrap();
    }

    #[test]
    fn test_save_merges_into_stored_history() {
        let store = test_store();
        let file = File::new("shared", "first");
        store.save(&file).unwrap();

        // A stale copy still carries only its own history
        let mut stale = file.clone();
        stale.data = "second".to_string();
        let saved = store.save(&stale).unwrap();

        assert_eq!(saved.history.len(), 2);
        assert_eq!(saved.history.version(0).unwrap(), "first");
    }

    #[test]
    fn test_unchanged_save_adds_no_version() {
        let store = test_store();
        let file = File::new("same", "text");

        let first = store.save(&file).unwrap();
        let second = store.save(&file).unwrap();

        assert_eq!(second.history.len(), 1);
        assert_eq!(second.history.versions(), first.history.versions());
        assert!(second.modified >= first.modified);
        assert_eq!(second.created, first.created);
    }

    #[test]
    fn test_domain_is_fixed_at_first_save() {
        let store = test_store();
        store.create_domain("notes", "").unwrap();
        let file = File::new("a", "b");
        store.save(&file).unwrap();

        let moved = file.clone().in_domain("notes");
        let err = store.save(&moved).unwrap_err();
        assert!(matches!(err, StoreError::DomainMismatch { .. }));
        assert_eq!(err.kind(), ErrorKind::Validation);

        assert_eq!(store.get(&file.id, "").unwrap()[0].domain, "public");
    }

    #[test]
    fn test_slug_collision_most_recent_first() {
        let store = test_store();
        let older = File::new("dup", "older");
        let newer = File::new("dup", "newer");
        store.save(&older).unwrap();
        store.save(&newer).unwrap();

        let found = store.get("dup", "public").unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id, newer.id);

        let found = store.exists("dup", "public").unwrap().unwrap();
        assert_eq!(found.id, newer.id);
        assert!(found.many);
    }

    #[test]
    fn test_slug_is_scoped_to_domain() {
        let store = test_store();
        store.create_domain("notes", "").unwrap();
        store.save(&File::new("page", "public page")).unwrap();

        let err = store.get("page", "notes").unwrap_err();
        assert!(matches!(err, StoreError::FileNotFound(_)));
        assert!(store.exists("page", "notes").unwrap().is_none());
    }

    #[test]
    fn test_get_by_id_ignores_domain() {
        let store = test_store();
        store.create_domain("notes", "").unwrap();
        let file = File::new("page", "text").in_domain("notes");
        store.save(&file).unwrap();

        let found = store.get(&file.id, "public").unwrap();
        assert_eq!(found[0].domain, "notes");
    }

    #[test]
    fn test_exists_by_id_is_scoped() {
        let store = test_store();
        store.create_domain("notes", "").unwrap();
        let file = File::new("page", "text").in_domain("notes");
        store.save(&file).unwrap();

        let found = store.exists(&file.id, "notes").unwrap().unwrap();
        assert_eq!(found, FileMatch { id: file.id.clone(), many: false });
        assert!(store.exists(&file.id, "public").unwrap().is_none());
    }

    #[test]
    fn test_get_missing() {
        let store = test_store();
        let err = store.get("nothing-here", "public").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_empty_files_are_not_listed() {
        let store = test_store();
        let empty = File::new("blank", "");
        let full = File::new("full", "content");
        store.save(&empty).unwrap();
        store.save(&full).unwrap();

        let listed: Vec<_> = store
            .get_all("public", false)
            .unwrap()
            .into_iter()
            .map(|f| f.id)
            .collect();
        assert_eq!(listed, vec![full.id.clone()]);

        let direct = store.get(&empty.id, "public").unwrap();
        assert_eq!(direct[0].data, "");
    }

    #[test]
    fn test_listing_orders() {
        let store = test_store();
        let a = File::new("a", "alpha");
        let b = File::new("b", "beta");
        store.save(&a).unwrap();
        store.save(&b).unwrap();

        // Touch `a` again so it is the most recently modified
        let mut a2 = a.clone();
        a2.data = "alpha 2".to_string();
        thread::sleep(std::time::Duration::from_millis(5));
        store.save(&a2).unwrap();

        let by_modified = store.get_all("public", false).unwrap();
        assert_eq!(by_modified[0].id, a.id);

        let by_created = store.get_all("public", true).unwrap();
        assert_eq!(by_created[0].id, b.id);

        let top = store.get_top_x("public", 1, false).unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].id, a.id);
    }

    #[test]
    fn test_most_viewed() {
        let store = test_store();
        let quiet = File::new("quiet", "q");
        let popular = File::new("popular", "p");
        store.save(&quiet).unwrap();
        store.save(&popular).unwrap();

        for _ in 0..3 {
            store.update_views(&popular).unwrap();
        }
        store.update_views(&quiet).unwrap();

        let top = store.get_top_x_most_viewed("public", 10).unwrap();
        assert_eq!(top[0].id, popular.id);
        assert_eq!(top[0].views, 3);
        assert_eq!(top[1].views, 1);
    }

    #[test]
    fn test_update_views_missing_file() {
        let store = test_store();
        let err = store.update_views(&File::new("x", "y")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_last_modified() {
        let store = test_store();
        assert!(store.last_modified().unwrap().is_none());

        let saved = store.save(&File::new("a", "b")).unwrap();
        assert_eq!(store.last_modified().unwrap(), Some(saved.modified));
    }

    #[test]
    fn test_concurrent_saves_of_one_file() {
        let store = test_store();
        let file = File::new("race", "start");
        store.save(&file).unwrap();

        let inputs: Vec<String> = (0..8).map(|i| format!("writer {}", i)).collect();
        let handles: Vec<_> = inputs
            .iter()
            .cloned()
            .map(|text| {
                let store = store.clone();
                let mut file = file.clone();
                thread::spawn(move || {
                    file.data = text;
                    store.save(&file).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stored = store.get(&file.id, "public").unwrap().remove(0);
        assert!(inputs.contains(&stored.data));
        assert_eq!(stored.history.len(), inputs.len() + 1);
        stored.history.verify().unwrap();
        assert!(store.check_index().unwrap().is_consistent());
    }
}
