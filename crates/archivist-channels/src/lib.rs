//! Chat transports for the archivist pipeline.
//!
//! Provides the inbound event model shared by all transports, the
//! [`Channel`] trait combining the pipeline's outbound collaborators, and
//! concrete implementations.
//!
//! # Main types
//!
//! - [`Channel`] — Notifier + artifact sink + callback acknowledgement.
//! - [`ChannelEvent`] — Events produced by a transport's receive loop.
//! - [`TelegramChannel`] — Telegram Bot API adapter.
//! - [`LocalChannel`] — Delivers into a local directory; used offline.

/// Core channel trait and inbound message types.
pub mod channel;
/// Local directory channel.
pub mod local;
/// Telegram channel integration.
pub mod telegram;

pub use channel::{parse_command, Channel, ChannelEvent, ChannelMessage, IncomingFile, MessageContent};
pub use local::LocalChannel;
pub use telegram::{TelegramChannel, TelegramFileSource};
