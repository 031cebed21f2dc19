//! Storage error handling
//!
//! Every storage operation returns a `StoreResult`. Variants fall into the
//! coarse categories callers branch on (see [`ErrorKind`]); the variants
//! themselves carry enough context for logging and retries.

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::versioned_text::VersionError;

/// Coarse error categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    InvalidCredentials,
    Validation,
    Storage,
}

/// Step of a file save, reported when that step fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStep {
    /// Reading the stored history to merge into
    LoadHistory,
    /// Writing the file row
    UpsertRow,
    /// Writing the full-text index row
    SyncIndex,
}

impl fmt::Display for SaveStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SaveStep::LoadHistory => "load history",
            SaveStep::UpsertRow => "upsert row",
            SaveStep::SyncIndex => "sync index",
        };
        f.write_str(name)
    }
}

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Domain does not exist
    #[error("domain '{0}' does not exist")]
    DomainNotFound(String),

    /// No file matches an id or slug
    #[error("no files with id or slug '{0}'")]
    FileNotFound(String),

    /// Access key is unknown or its domain is gone
    #[error("access key is not valid")]
    KeyNotFound,

    /// Blob or cached image does not exist
    #[error("no blob with id '{0}'")]
    BlobNotFound(String),

    /// Domain name is taken
    #[error("domain '{0}' already exists")]
    AlreadyExists(String),

    /// Password does not match
    #[error("incorrect password to log into domain '{0}'")]
    InvalidCredentials(String),

    /// Caller passed unusable input
    #[error("invalid input: {0}")]
    Validation(String),

    /// A save named a different domain than the one the file was created in
    #[error("file '{id}' belongs to domain '{expected}', not '{requested}'")]
    DomainMismatch {
        id: String,
        expected: String,
        requested: String,
    },

    /// Full-text engine rejected the query grammar
    #[error("invalid search query: {0}")]
    InvalidQuery(String),

    /// One step of a multi-step save failed; earlier steps stay committed
    #[error("save of file '{id}' failed at step '{step}': {source}")]
    SaveStep {
        id: String,
        step: SaveStep,
        #[source]
        source: Box<StoreError>,
    },

    /// Failed to create data directory
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to read or write a file outside the database
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Writing an export archive failed
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// A gzip-compressed upload did not decompress
    #[error("upload '{id}' is not valid gzip: {source}")]
    Decompress {
        id: String,
        #[source]
        source: io::Error,
    },

    /// Some access keys could not be touched
    #[error("failed to update {failed} of {total} access keys")]
    KeyTouch { failed: usize, total: usize },

    /// SQLite database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Stored JSON could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored history does not replay
    #[error("History error: {0}")]
    History(#[from] VersionError),

    /// Password hashing failed
    #[error("Password hashing error: {0}")]
    Password(#[from] bcrypt::BcryptError),
}

impl StoreError {
    /// Map to the coarse category callers branch on
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::DomainNotFound(_)
            | StoreError::FileNotFound(_)
            | StoreError::KeyNotFound
            | StoreError::BlobNotFound(_) => ErrorKind::NotFound,
            StoreError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            StoreError::InvalidCredentials(_) => ErrorKind::InvalidCredentials,
            StoreError::Validation(_)
            | StoreError::DomainMismatch { .. }
            | StoreError::InvalidQuery(_) => ErrorKind::Validation,
            StoreError::SaveStep { source, .. } => source.kind(),
            _ => ErrorKind::Storage,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Whether repeating the same call can be expected to converge
    ///
    /// A save that stopped on a stored history that does not decode will
    /// stop there again.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::SaveStep { source, .. } => !source.is_damaged_history(),
            _ => matches!(
                self,
                StoreError::Database(rusqlite::Error::SqliteFailure(e, _))
                    if matches!(
                        e.code,
                        rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                    )
            ),
        }
    }

    fn is_damaged_history(&self) -> bool {
        matches!(self, StoreError::Serialization(_) | StoreError::History(_))
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            StoreError::SaveStep { source, .. } if source.is_damaged_history() => {
                Some("The stored history of this file is damaged and was left untouched. Restore it from a backup before saving again.")
            }
            StoreError::SaveStep { .. } => {
                Some("Retry the save with the same id and content; saves are idempotent.")
            }
            StoreError::CreateDirectory { .. } => {
                Some("Check that the parent directory exists and you have write permissions.")
            }
            StoreError::History(_) => {
                Some("The stored history is damaged. Restore the file row from a backup.")
            }
            StoreError::InvalidQuery(_) => {
                Some("Quote phrases with double quotes and avoid unbalanced operators.")
            }
            _ => None,
        }
    }

    pub(crate) fn at_step(id: &str, step: SaveStep, source: impl Into<StoreError>) -> Self {
        StoreError::SaveStep {
            id: id.to_string(),
            step,
            source: Box::new(source.into()),
        }
    }
}

/// Result type for storage operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(
            StoreError::DomainNotFound("x".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(StoreError::KeyNotFound.kind(), ErrorKind::NotFound);
        assert_eq!(
            StoreError::AlreadyExists("x".into()).kind(),
            ErrorKind::AlreadyExists
        );
        assert_eq!(
            StoreError::InvalidCredentials("x".into()).kind(),
            ErrorKind::InvalidCredentials
        );
        assert_eq!(
            StoreError::InvalidQuery("bad".into()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            StoreError::KeyTouch { failed: 1, total: 2 }.kind(),
            ErrorKind::Storage
        );
    }

    #[test]
    fn test_save_step_is_retryable_storage_failure() {
        let err = StoreError::at_step(
            "abc",
            SaveStep::SyncIndex,
            rusqlite::Error::QueryReturnedNoRows,
        );

        assert_eq!(err.kind(), ErrorKind::Storage);
        assert!(err.is_retryable());
        assert!(err.recovery_suggestion().is_some());

        let msg = err.to_string();
        assert!(msg.contains("sync index"));
        assert!(msg.contains("abc"));
    }

    #[test]
    fn test_damaged_history_is_not_retryable() {
        let decode = serde_json::from_str::<u32>("{").unwrap_err();
        let err = StoreError::at_step("abc", SaveStep::LoadHistory, decode);

        assert_eq!(err.kind(), ErrorKind::Storage);
        assert!(!err.is_retryable());
        let hint = err.recovery_suggestion().unwrap();
        assert!(hint.contains("backup"));
    }

    #[test]
    fn test_save_step_keeps_inner_kind() {
        let err = StoreError::at_step(
            "abc",
            SaveStep::LoadHistory,
            StoreError::DomainMismatch {
                id: "abc".into(),
                expected: "public".into(),
                requested: "notes".into(),
            },
        );
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_error_display() {
        let err = StoreError::CreateDirectory {
            path: PathBuf::from("/test/dir"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };

        let msg = err.to_string();
        assert!(msg.contains("/test/dir"));
        assert!(!err.is_retryable());
    }
}
