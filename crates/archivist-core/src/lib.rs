//! Core types and error definitions for the archivist pipeline.
//!
//! This crate provides the foundational types shared across all archivist
//! crates: the error taxonomy, session identifiers, accepted file references
//! and the collaborator traits the pipeline calls out to.
//!
//! # Main types
//!
//! - [`ArchivistError`] — Unified error enum for all archivist subsystems.
//! - [`ArchivistResult`] — Convenience alias for `Result<T, ArchivistError>`.
//! - [`OwnerId`] — Identity of the user owning a session.
//! - [`ProcessId`] — Timestamp-derived session discriminator.
//! - [`FileRef`] — A staged upload accepted into a session.

/// Error taxonomy.
pub mod error;
/// Collaborator traits implemented by transports.
pub mod transport;

pub use error::{ArchivistError, ArchivistResult};
pub use transport::{
    ArtifactSink, Authorizer, Delivery, FileSource, LocalFileSource, MenuButton, Notifier,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Default ceiling on the cumulative size of a session's files (20 GiB).
pub const DEFAULT_MAX_TOTAL_SIZE: u64 = 20 * 1024 * 1024 * 1024;

/// Default maximum size of a single delivered part (2 GiB).
pub const DEFAULT_MAX_PART_SIZE: u64 = 2 * 1024 * 1024 * 1024;

/// Extension every archive name must carry.
pub const ARCHIVE_EXTENSION: &str = "zip";

/// Name used when the owner never sets one.
pub const DEFAULT_ARCHIVE_NAME: &str = "archive.zip";

// --- Identifiers ---

/// Identity of the user that owns a session (a chat user id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub i64);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OwnerId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(OwnerId)
    }
}

impl From<i64> for OwnerId {
    fn from(id: i64) -> Self {
        OwnerId(id)
    }
}

/// Timestamp-derived identifier that namespaces a session's staging storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(String);

impl ProcessId {
    /// Derives the identifier from a UTC timestamp as `YYYYMMDDHHMMSS`.
    pub fn from_timestamp(at: DateTime<Utc>) -> Self {
        ProcessId(at.format("%Y%m%d%H%M%S").to_string())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// --- Files ---

/// A staged upload that has been accepted into a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    /// Location of the staged copy.
    pub path: PathBuf,
    /// Name the entry is stored under inside the archive.
    pub stored_name: String,
    /// Size of the staged copy in bytes.
    pub size: u64,
}

impl FileRef {
    /// Creates a new file reference.
    pub fn new(path: impl Into<PathBuf>, stored_name: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            stored_name: stored_name.into(),
            size,
        }
    }
}

/// Renders a byte count for humans, base 1024, up to gigabytes.
///
/// Zero renders as `0B`; other values carry at most two decimals.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0B".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let text = format!("{:.2}", (value * 100.0).round() / 100.0);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    format!("{text} {}", UNITS[unit])
}
