//! Security primitives for archivist.
//!
//! # Main types
//!
//! - [`AllowList`] — Append-only file of authorized user ids.
//! - [`Sanitizer`] — Cleans text input and upload file names.

/// Allow-list authorization.
pub mod allowlist;
/// Input sanitization utilities.
pub mod sanitizer;

pub use allowlist::{AllowList, AuthorizeOutcome};
pub use sanitizer::{SanitizeResult, Sanitizer};
