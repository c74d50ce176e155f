//! Session state for the archivist pipeline.
//!
//! A session accumulates staged uploads for one owner under a size ceiling,
//! together with the archive name and optional password chosen for them.
//!
//! # Main types
//!
//! - [`SizeBudget`] — Cumulative byte tracking against a ceiling.
//! - [`Session`] — One owner's in-progress archive request.
//! - [`SessionStore`] — Owner-keyed session map with per-session locking.
//! - [`StagingArea`] — On-disk staging directories and their reclamation.

/// Size ceiling checks.
pub mod budget;
/// Session state and lifecycle phases.
pub mod session;
/// Staging storage layout.
pub mod staging;
/// Session storage.
pub mod store;

pub use budget::{try_reserve, SizeBudget};
pub use session::{validate_archive_name, AwaitingInput, Session, SessionPhase};
pub use staging::StagingArea;
pub use store::{InMemorySessionStore, SessionHandle, SessionStore};
