//! Domain directory
//!
//! Tenant namespaces: creation, lookup, update and password
//! authentication. Names are matched case-insensitively and stored
//! lower-cased.

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{info, warn};

use crate::models::{DomainInfo, DomainOptions};
use crate::secrets::{hash_password, verify_password};
use crate::storage::{StoreError, StoreResult};
use crate::store::Store;

/// A domain row including its password hash
pub(crate) struct DomainRow {
    pub id: i64,
    pub name: String,
    pub hashed_pass: String,
    pub is_public: bool,
    pub options: DomainOptions,
}

impl DomainRow {
    fn into_info(self) -> DomainInfo {
        DomainInfo {
            id: self.id,
            name: self.name,
            is_public: self.is_public,
            options: self.options,
        }
    }
}

/// Trim and lower-case a domain name
pub(crate) fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

pub(crate) fn find_domain(conn: &Connection, name: &str) -> StoreResult<Option<DomainRow>> {
    let row = conn
        .query_row(
            "SELECT id, name, hashed_pass, is_public, options FROM domains WHERE name = ? COLLATE NOCASE",
            params![name],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                ))
            },
        )
        .optional()?;

    Ok(row.map(|(id, name, hashed_pass, is_public, options)| DomainRow {
        id,
        options: decode_options(&name, options.as_deref()),
        name,
        hashed_pass: hashed_pass.unwrap_or_default(),
        is_public: is_public.unwrap_or(0) == 1,
    }))
}

/// Resolve a domain name to its id
pub(crate) fn domain_id(conn: &Connection, name: &str) -> StoreResult<i64> {
    find_domain(conn, name)?
        .map(|row| row.id)
        .ok_or_else(|| StoreError::DomainNotFound(name.to_string()))
}

fn decode_options(domain: &str, raw: Option<&str>) -> DomainOptions {
    match raw {
        None | Some("") => DomainOptions::default(),
        Some(json) => serde_json::from_str(json).unwrap_or_else(|e| {
            warn!("ignoring unreadable options for domain '{}': {}", domain, e);
            DomainOptions::default()
        }),
    }
}

impl Store {
    /// Create a private domain
    ///
    /// An empty password means the domain signs in with an empty password.
    pub fn create_domain(&self, name: &str, password: &str) -> StoreResult<DomainInfo> {
        let name = normalize_name(name);
        if name.is_empty() {
            return Err(StoreError::Validation("domain name cannot be empty".into()));
        }
        if name.contains('/') {
            return Err(StoreError::Validation(format!(
                "domain name '{}' cannot contain '/'",
                name
            )));
        }

        let hashed = hash_password(password, self.config().password_cost)?;
        let options = serde_json::to_string(&DomainOptions::default())?;

        let conn = self.lock();
        if find_domain(&conn, &name)?.is_some() {
            return Err(StoreError::AlreadyExists(name));
        }
        conn.execute(
            "INSERT INTO domains (name, hashed_pass, is_public, options) VALUES (?, ?, 0, ?)",
            params![name, hashed, options],
        )?;
        let id = conn.last_insert_rowid();
        info!("created domain '{}'", name);

        Ok(DomainInfo {
            id,
            name,
            is_public: false,
            options: DomainOptions::default(),
        })
    }

    /// Look up a domain by name
    pub fn lookup_domain(&self, name: &str) -> StoreResult<DomainInfo> {
        let name = normalize_name(name);
        let conn = self.lock();
        find_domain(&conn, &name)?
            .map(DomainRow::into_info)
            .ok_or(StoreError::DomainNotFound(name))
    }

    /// Update visibility and options, and the password when one is given
    pub fn update_domain(
        &self,
        name: &str,
        password: &str,
        is_public: bool,
        options: &DomainOptions,
    ) -> StoreResult<()> {
        let name = normalize_name(name);
        let hashed = if password.is_empty() {
            None
        } else {
            Some(hash_password(password, self.config().password_cost)?)
        };
        let options = serde_json::to_string(options)?;

        let conn = self.lock();
        let id = domain_id(&conn, &name)?;
        match hashed {
            Some(hashed) => conn.execute(
                "UPDATE domains SET hashed_pass = ?, is_public = ?, options = ? WHERE id = ?",
                params![hashed, is_public, options, id],
            )?,
            None => conn.execute(
                "UPDATE domains SET is_public = ?, options = ? WHERE id = ?",
                params![is_public, options, id],
            )?,
        };
        Ok(())
    }

    /// Check a domain password
    ///
    /// The lock is held until the hash is compared, as in `issue_key`, so
    /// the returned settings belong to the row the password matched.
    pub fn authenticate_domain(&self, name: &str, password: &str) -> StoreResult<DomainInfo> {
        let name = normalize_name(name);
        let conn = self.lock();
        let row = find_domain(&conn, &name)?
            .ok_or_else(|| StoreError::DomainNotFound(name.clone()))?;

        if !verify_password(password, &row.hashed_pass) {
            return Err(StoreError::InvalidCredentials(name));
        }
        Ok(row.into_info())
    }

    /// All domain names, sorted
    pub fn list_domains(&self) -> StoreResult<Vec<String>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT name FROM domains ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }
}
