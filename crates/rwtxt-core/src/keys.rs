//! Access key registry
//!
//! An access key is a bearer token bound to one domain, issued after a
//! successful password check. Clients present keys as a comma-separated
//! cookie value, one key per signed-in domain.
//!
//! Refreshing a key's last-used time is advisory bookkeeping. It can be
//! handed to a [`KeyToucher`], which runs it on a detached task so the
//! request that presented the keys never waits on it.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domains::{find_domain, normalize_name};
use crate::models::KeyOwner;
use crate::secrets::{new_access_key, verify_password};
use crate::storage::{StoreError, StoreResult};
use crate::store::Store;

/// Pending touch batches the worker will queue before dropping new ones
const TOUCH_QUEUE_DEPTH: usize = 64;

/// Split a cookie value into access keys
pub fn parse_key_list(cookie: &str) -> Vec<String> {
    cookie
        .split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(String::from)
        .collect()
}

impl Store {
    /// Check the domain password and issue a new access key
    ///
    /// The lock is held across the password check so the key is bound to
    /// the row that was verified.
    pub fn issue_key(&self, domain: &str, password: &str) -> StoreResult<String> {
        let name = normalize_name(domain);
        let conn = self.lock();

        let row = find_domain(&conn, &name)?
            .ok_or_else(|| StoreError::DomainNotFound(name.clone()))?;
        if !verify_password(password, &row.hashed_pass) {
            return Err(StoreError::InvalidCredentials(name));
        }

        let key = new_access_key();
        conn.execute(
            "INSERT INTO access_keys (domain_id, key, last_used) VALUES (?, ?, ?)",
            params![row.id, key, Utc::now().timestamp_millis()],
        )?;
        debug!("issued access key for domain '{}'", row.name);
        Ok(key)
    }

    /// Find the domain a key grants
    pub fn resolve_key(&self, key: &str) -> StoreResult<KeyOwner> {
        let conn = self.lock();
        let row = conn
            .query_row(
                r#"
                SELECT domains.id, domains.name, access_keys.last_used
                FROM access_keys
                INNER JOIN domains ON access_keys.domain_id = domains.id
                WHERE access_keys.key = ?
                "#,
                params![key],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((domain_id, Some(domain), last_used)) if !domain.is_empty() => Ok(KeyOwner {
                domain_id,
                domain,
                last_used: DateTime::from_timestamp_millis(last_used).unwrap_or_else(Utc::now),
            }),
            _ => Err(StoreError::KeyNotFound),
        }
    }

    /// Resolve every valid key, skipping unknown ones
    ///
    /// Returns `(key, owner)` pairs in the order the keys were given.
    pub fn resolve_keys(&self, keys: &[String]) -> Vec<(String, KeyOwner)> {
        keys.iter()
            .filter_map(|key| match self.resolve_key(key) {
                Ok(owner) => Some((key.clone(), owner)),
                Err(e) => {
                    debug!("skipping access key: {}", e);
                    None
                }
            })
            .collect()
    }

    /// Set last-used to now for each key
    ///
    /// Every key is attempted; failures are logged and reported together.
    /// Unknown keys are not an error.
    pub fn touch_keys(&self, keys: &[String]) -> StoreResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let now = Utc::now().timestamp_millis();
        let conn = self.lock();

        let mut failed = 0;
        for key in keys {
            if let Err(e) = conn.execute(
                "UPDATE access_keys SET last_used = ? WHERE key = ?",
                params![now, key],
            ) {
                warn!("failed to touch access key: {}", e);
                failed += 1;
            }
        }

        if failed > 0 {
            return Err(StoreError::KeyTouch {
                failed,
                total: keys.len(),
            });
        }
        Ok(())
    }
}

/// Hands key touches to a detached worker
///
/// Dropping every `KeyToucher` clone stops the worker once its queue is
/// drained.
#[derive(Clone)]
pub struct KeyToucher {
    tx: mpsc::Sender<Vec<String>>,
}

impl KeyToucher {
    /// Spawn the worker on the current tokio runtime
    pub fn spawn(store: Store) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(TOUCH_QUEUE_DEPTH);
        let handle = tokio::spawn(touch_loop(store, rx));
        (Self { tx }, handle)
    }

    /// Queue keys for a last-used refresh without waiting
    ///
    /// The batch is dropped if the queue is full or the worker is gone.
    pub fn touch(&self, keys: Vec<String>) {
        if keys.is_empty() {
            return;
        }
        if let Err(e) = self.tx.try_send(keys) {
            debug!("dropping key touch: {}", e);
        }
    }
}

async fn touch_loop(store: Store, mut rx: mpsc::Receiver<Vec<String>>) {
    while let Some(keys) = rx.recv().await {
        let store = store.clone();
        match tokio::task::spawn_blocking(move || store.touch_keys(&keys)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("key touch failed: {}", e),
            Err(e) => warn!("key touch task panicked: {}", e),
        }
    }
    debug!("key toucher stopped");
}
