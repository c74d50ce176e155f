//! The archivist session pipeline.
//!
//! Ties sessions, staging, archiving and delivery together into the
//! per-owner state machine, and routes chat events into it.
//!
//! # Main types
//!
//! - [`SessionPipeline`] — Open, accumulate, configure, build, deliver, close.
//! - [`Dispatcher`] — Authorization, command routing and per-owner workers.
//! - [`spawn_idle_reaper`] — Background reclamation of abandoned sessions.

/// Event routing.
pub mod dispatcher;
/// User-facing texts.
pub mod messages;
/// The session state machine.
pub mod pipeline;
/// Idle-session reclamation.
pub mod reaper;

pub use dispatcher::Dispatcher;
pub use pipeline::{PipelineConfig, SessionPipeline, SessionStatus};
pub use reaper::spawn_idle_reaper;
