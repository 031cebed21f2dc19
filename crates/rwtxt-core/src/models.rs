//! Data models for rwtxt
//!
//! Records returned by the store. Nothing here touches the database.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::secrets::new_file_id;
use crate::storage::PUBLIC_DOMAIN;
use crate::versioned_text::VersionedText;

/// Date format used for display, e.g. `3:04pm Jan 2 2006`
const DISPLAY_DATE_FORMAT: &str = "%-I:%M%P %b %-d %Y";

/// A document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct File {
    /// Random 10-character id, unique across all domains
    pub id: String,
    /// Human-chosen path segment; not unique
    pub slug: String,
    /// Owning domain name; empty means `public`
    pub domain: String,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    /// Current text
    pub data: String,
    /// Edit history
    pub history: VersionedText,
    pub views: i64,
}

impl File {
    /// Create a new, unsaved file in the public domain
    pub fn new(slug: impl Into<String>, data: impl Into<String>) -> Self {
        let data = data.into();
        let now = Utc::now();
        Self {
            id: new_file_id(),
            slug: slug.into(),
            domain: String::new(),
            created: now,
            modified: now,
            history: VersionedText::new(data.clone()),
            data,
            views: 0,
        }
    }

    /// Set the owning domain
    pub fn in_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    /// Domain name the file is saved under
    pub fn domain_or_public(&self) -> String {
        let domain = self.domain.trim().to_lowercase();
        if domain.is_empty() {
            PUBLIC_DOMAIN.to_string()
        } else {
            domain
        }
    }

    /// Drop text and history, keeping metadata for listings
    pub fn strip_content(&mut self) {
        self.data.clear();
        self.history = VersionedText::default();
    }

    /// Creation time in a zone `utc_offset_hours` east of UTC
    pub fn created_display(&self, utc_offset_hours: i32) -> String {
        format_date(self.created, utc_offset_hours)
    }

    /// Modification time in a zone `utc_offset_hours` east of UTC
    pub fn modified_display(&self, utc_offset_hours: i32) -> String {
        format_date(self.modified, utc_offset_hours)
    }
}

/// Format a timestamp in a zone `utc_offset_hours` east of UTC
pub fn format_date(at: DateTime<Utc>, utc_offset_hours: i32) -> String {
    match FixedOffset::east_opt(utc_offset_hours * 3600) {
        Some(offset) => at.with_timezone(&offset).format(DISPLAY_DATE_FORMAT).to_string(),
        None => at.format(DISPLAY_DATE_FORMAT).to_string(),
    }
}

/// Per-domain display customization
///
/// Stored as JSON; unknown fields are ignored and missing ones default.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct DomainOptions {
    /// Number of most-viewed files to show on the front page
    pub most_edited: usize,
    /// Number of recently modified files to show
    pub most_recent: usize,
    /// Number of recently created files to show
    pub last_created: usize,
    pub css: String,
    pub custom_intro: String,
    pub custom_title: String,
    pub show_search: bool,
}

/// A tenant namespace as seen by callers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DomainInfo {
    pub id: i64,
    pub name: String,
    pub is_public: bool,
    pub options: DomainOptions,
}

/// The domain an access key grants
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyOwner {
    pub domain_id: i64,
    pub domain: String,
    pub last_used: DateTime<Utc>,
}

/// Result of an id-or-slug existence check
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileMatch {
    /// Id of the file (the most recently modified when a slug matches many)
    pub id: String,
    /// A slug matched more than one file
    pub many: bool,
}

/// A full-text search result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchHit {
    pub id: String,
    pub slug: String,
    pub domain: String,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub views: i64,
    /// Text around the matches, terms wrapped in `<b>`/`</b>`, cut with `...`
    pub snippet: String,
}

/// A binary payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Blob {
    pub id: String,
    pub name: String,
    #[serde(skip)]
    pub data: Vec<u8>,
    /// View count before this read
    pub views: i64,
}

/// Differences between the file table and the full-text index
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexReport {
    /// File ids with no index row
    pub missing: Vec<String>,
    /// Index ids with no file row
    pub orphaned: Vec<String>,
    /// Ids with more than one index row
    pub duplicated: Vec<String>,
}

impl IndexReport {
    pub fn is_consistent(&self) -> bool {
        self.missing.is_empty() && self.orphaned.is_empty() && self.duplicated.is_empty()
    }
}
