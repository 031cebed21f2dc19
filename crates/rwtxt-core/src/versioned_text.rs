//! Diff-based text history
//!
//! A `VersionedText` holds the current text of a document together with an
//! ordered list of deltas. Replaying the deltas from the empty string
//! reproduces every version the document ever had, and the last replay
//! result is always equal to the current text.
//!
//! Deltas are computed with a Myers shortest-edit diff over Unicode scalar
//! values. Very large rewrites fall back to a single delete + insert of the
//! changed region, which is still exact, just not minimal.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Edit distance beyond which the diff stops searching for a minimal script.
const MAX_EDIT_DISTANCE: isize = 1024;

/// Errors raised while replaying history
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    /// Requested version does not exist
    #[error("version {index} out of range (history has {len} versions)")]
    OutOfRange { index: usize, len: usize },

    /// A delta does not fit the text it is being applied to
    #[error("delta for version {index} does not apply: {details}")]
    BadDelta { index: usize, details: String },

    /// Replaying all deltas does not reproduce the current text
    #[error("history replay does not match current text")]
    Diverged,
}

/// A single delta operation, counted in chars
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    Retain(usize),
    Delete(usize),
    Insert(String),
}

/// A run of text in a diff between two versions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Chunk {
    Equal(String),
    Delete(String),
    Insert(String),
}

/// One recorded edit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    /// When the edit was recorded
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// Operations turning the previous version into this one
    #[serde(default)]
    pub delta: Vec<Op>,
}

/// Append-only text history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct VersionedText {
    current: String,
    versions: Vec<Version>,
}

impl VersionedText {
    /// Start a history whose first version is `text`
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let delta = delta_from_chunks(&diff("", &text));
        Self {
            current: text,
            versions: vec![Version {
                timestamp: now(),
                delta,
            }],
        }
    }

    /// Record `text` as a new version
    ///
    /// Returns false without touching the history when `text` equals the
    /// current text.
    pub fn update(&mut self, text: impl Into<String>) -> bool {
        let text = text.into();
        if text == self.current && !self.versions.is_empty() {
            return false;
        }
        let delta = delta_from_chunks(&diff(&self.current, &text));
        let now = now();
        let timestamp = match self.versions.last() {
            // keep timestamps strictly ordered even when the clock does not move
            Some(last) if last.timestamp >= now => {
                last.timestamp + chrono::Duration::milliseconds(1)
            }
            _ => now,
        };
        self.versions.push(Version { timestamp, delta });
        self.current = text;
        true
    }

    /// The latest text
    pub fn current(&self) -> &str {
        &self.current
    }

    /// Number of recorded versions
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Recorded versions, oldest first
    pub fn versions(&self) -> &[Version] {
        &self.versions
    }

    /// Timestamps of every version, oldest first
    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        self.versions.iter().map(|v| v.timestamp).collect()
    }

    /// Reconstruct the text of version `index` (0 is the first version)
    pub fn version(&self, index: usize) -> Result<String, VersionError> {
        if index >= self.versions.len() {
            return Err(VersionError::OutOfRange {
                index,
                len: self.versions.len(),
            });
        }
        let mut text = String::new();
        for (i, version) in self.versions[..=index].iter().enumerate() {
            text = apply_delta(&text, &version.delta)
                .map_err(|details| VersionError::BadDelta { index: i, details })?;
        }
        Ok(text)
    }

    /// Text as it stood at `timestamp`, or `None` if the history starts later
    pub fn at(&self, timestamp: DateTime<Utc>) -> Result<Option<String>, VersionError> {
        match self
            .versions
            .iter()
            .rposition(|v| v.timestamp <= timestamp)
        {
            Some(index) => self.version(index).map(Some),
            None => Ok(None),
        }
    }

    /// Diff between two versions
    pub fn diff(&self, from: usize, to: usize) -> Result<Vec<Chunk>, VersionError> {
        let old = self.version(from)?;
        let new = self.version(to)?;
        Ok(diff(&old, &new))
    }

    /// Characters inserted plus deleted by each version
    pub fn change_sizes(&self) -> Vec<usize> {
        self.versions
            .iter()
            .map(|v| {
                v.delta
                    .iter()
                    .map(|op| match op {
                        Op::Retain(_) => 0,
                        Op::Delete(n) => *n,
                        Op::Insert(s) => s.chars().count(),
                    })
                    .sum()
            })
            .collect()
    }

    /// Replay the whole history and check it ends at the current text
    pub fn verify(&self) -> Result<(), VersionError> {
        if self.versions.is_empty() {
            return if self.current.is_empty() {
                Ok(())
            } else {
                Err(VersionError::Diverged)
            };
        }
        let replayed = self.version(self.versions.len() - 1)?;
        if replayed == self.current {
            Ok(())
        } else {
            Err(VersionError::Diverged)
        }
    }
}

/// Current time at the millisecond precision versions are stored with
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Compute a character-level diff from `old` to `new`
pub fn diff(old: &str, new: &str) -> Vec<Chunk> {
    let a: Vec<char> = old.chars().collect();
    let b: Vec<char> = new.chars().collect();

    let prefix = a.iter().zip(&b).take_while(|(x, y)| x == y).count();
    let suffix = a[prefix..]
        .iter()
        .rev()
        .zip(b[prefix..].iter().rev())
        .take_while(|(x, y)| x == y)
        .count();

    let a_mid = &a[prefix..a.len() - suffix];
    let b_mid = &b[prefix..b.len() - suffix];

    let mut edits = Vec::with_capacity(a.len().max(b.len()));
    edits.extend(a[..prefix].iter().map(|&c| Edit::Equal(c)));
    match shortest_edit(a_mid, b_mid) {
        Some(middle) => edits.extend(middle),
        None => {
            edits.extend(a_mid.iter().map(|&c| Edit::Delete(c)));
            edits.extend(b_mid.iter().map(|&c| Edit::Insert(c)));
        }
    }
    edits.extend(a[a.len() - suffix..].iter().map(|&c| Edit::Equal(c)));

    coalesce(edits)
}

#[derive(Debug, Clone, Copy)]
enum Edit {
    Equal(char),
    Delete(char),
    Insert(char),
}

/// Myers O((N+M)D) diff; `None` when D exceeds `MAX_EDIT_DISTANCE`
fn shortest_edit(a: &[char], b: &[char]) -> Option<Vec<Edit>> {
    let n = a.len() as isize;
    let m = b.len() as isize;
    if n == 0 && m == 0 {
        return Some(Vec::new());
    }

    let max = (n + m).min(MAX_EDIT_DISTANCE);
    let offset = max + 1;
    let idx = |k: isize| (offset + k) as usize;

    let mut v = vec![0isize; (2 * max + 3) as usize];
    let mut trace: Vec<Vec<isize>> = Vec::new();

    for d in 0..=max {
        trace.push(v.clone());
        let mut k = -d;
        while k <= d {
            let down = k == -d || (k != d && v[idx(k - 1)] < v[idx(k + 1)]);
            let mut x = if down { v[idx(k + 1)] } else { v[idx(k - 1)] + 1 };
            let mut y = x - k;
            while x < n && y < m && a[x as usize] == b[y as usize] {
                x += 1;
                y += 1;
            }
            v[idx(k)] = x;
            if x >= n && y >= m {
                return Some(backtrack(a, b, &trace, offset));
            }
            k += 2;
        }
    }
    None
}

fn backtrack(a: &[char], b: &[char], trace: &[Vec<isize>], offset: isize) -> Vec<Edit> {
    let idx = |k: isize| (offset + k) as usize;
    let mut x = a.len() as isize;
    let mut y = b.len() as isize;
    let mut edits = Vec::new();

    for (d, v) in trace.iter().enumerate().rev() {
        let d = d as isize;
        let k = x - y;
        let prev_k = if k == -d || (k != d && v[idx(k - 1)] < v[idx(k + 1)]) {
            k + 1
        } else {
            k - 1
        };
        let prev_x = v[idx(prev_k)];
        let prev_y = prev_x - prev_k;

        while x > prev_x && y > prev_y {
            edits.push(Edit::Equal(a[(x - 1) as usize]));
            x -= 1;
            y -= 1;
        }
        if d > 0 {
            if x == prev_x {
                edits.push(Edit::Insert(b[(y - 1) as usize]));
            } else {
                edits.push(Edit::Delete(a[(x - 1) as usize]));
            }
        }
        x = prev_x;
        y = prev_y;
    }

    edits.reverse();
    edits
}

fn coalesce(edits: Vec<Edit>) -> Vec<Chunk> {
    let mut chunks: Vec<Chunk> = Vec::new();
    for edit in edits {
        match (chunks.last_mut(), edit) {
            (Some(Chunk::Equal(s)), Edit::Equal(c))
            | (Some(Chunk::Delete(s)), Edit::Delete(c))
            | (Some(Chunk::Insert(s)), Edit::Insert(c)) => s.push(c),
            (_, Edit::Equal(c)) => chunks.push(Chunk::Equal(c.to_string())),
            (_, Edit::Delete(c)) => chunks.push(Chunk::Delete(c.to_string())),
            (_, Edit::Insert(c)) => chunks.push(Chunk::Insert(c.to_string())),
        }
    }
    chunks
}

fn delta_from_chunks(chunks: &[Chunk]) -> Vec<Op> {
    chunks
        .iter()
        .map(|chunk| match chunk {
            Chunk::Equal(s) => Op::Retain(s.chars().count()),
            Chunk::Delete(s) => Op::Delete(s.chars().count()),
            Chunk::Insert(s) => Op::Insert(s.clone()),
        })
        .collect()
}

fn apply_delta(text: &str, delta: &[Op]) -> Result<String, String> {
    let mut chars = text.chars();
    let mut out = String::with_capacity(text.len());
    for op in delta {
        match op {
            Op::Retain(n) => {
                for _ in 0..*n {
                    let c = chars
                        .next()
                        .ok_or_else(|| format!("retain of {} runs past end of text", n))?;
                    out.push(c);
                }
            }
            Op::Delete(n) => {
                for _ in 0..*n {
                    chars
                        .next()
                        .ok_or_else(|| format!("delete of {} runs past end of text", n))?;
                }
            }
            Op::Insert(s) => out.push_str(s),
        }
    }
    if chars.next().is_some() {
        return Err("delta leaves unconsumed text".to_string());
    }
    Ok(out)
}
