//! Entries returned by a directory listing.

use crate::services::backend::ObjectSummary;
use chrono::{DateTime, SecondsFormat, Timelike, Utc};
use serde::{Serialize, Serializer};

/// A virtual folder: a common prefix one level below the listed prefix.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct FolderEntry {
    /// Last non-empty segment of the prefix (`"b"` for `"a/b/"`).
    pub name: String,

    /// Full prefix including the trailing slash.
    pub path: String,
}

/// A single object directly below the listed prefix.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub path: String,

    /// Size in bytes.
    pub size: u64,

    /// ISO-8601 with an explicit `+00:00` offset; fractional seconds only
    /// when present, in microseconds.
    #[serde(rename = "lastModified", serialize_with = "serialize_iso8601")]
    pub last_modified: DateTime<Utc>,
}

/// One level of the bucket hierarchy.
#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Listing {
    pub folders: Vec<FolderEntry>,
    pub files: Vec<FileEntry>,
}

fn serialize_iso8601<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    let format = if ts.nanosecond() == 0 {
        SecondsFormat::Secs
    } else {
        SecondsFormat::Micros
    };
    serializer.serialize_str(&ts.to_rfc3339_opts(format, false))
}

impl FolderEntry {
    pub fn from_prefix(prefix: &str) -> Self {
        let name = prefix
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        Self {
            name,
            path: prefix.to_string(),
        }
    }
}

impl FileEntry {
    /// Build a file entry, or `None` for folder placeholder keys ending in `/`.
    pub fn from_summary(summary: ObjectSummary) -> Option<Self> {
        if summary.key.ends_with('/') {
            return None;
        }
        let name = summary
            .key
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        Some(Self {
            name,
            path: summary.key,
            size: summary.size,
            last_modified: summary.last_modified,
        })
    }
}
