//! Archive construction and splitting.
//!
//! # Main types
//!
//! - [`ArchiveBuilder`] — Builds one deflate-compressed, optionally
//!   AES-encrypted zip artifact from staged files.
//! - [`Artifact`] — The built archive on disk.
//! - [`PartSplitter`] — Streams an oversized artifact into numbered parts.
//! - [`Part`] — One slice of a split artifact.

/// Archive building.
pub mod builder;
/// Fixed-size part splitting.
pub mod splitter;

pub use builder::{ArchiveBuilder, Artifact};
pub use splitter::{needs_split, Part, PartSplitter};
