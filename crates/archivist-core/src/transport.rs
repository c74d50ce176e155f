//! Collaborator traits the pipeline calls into.
//!
//! These live in `archivist-core` so that transports (`archivist-channels`),
//! the allow-list (`archivist-security`) and the pipeline can share them
//! without circular dependencies.

use crate::{ArchivistResult, OwnerId};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Byte source for an inbound upload.
///
/// The pipeline hands the source a staging path; the source persists its
/// bytes there and reports how many were written.
#[async_trait]
pub trait FileSource: Send + Sync {
    async fn save_to(&self, dest: &Path) -> ArchivistResult<u64>;
}

/// A file already on the local disk.
#[derive(Debug, Clone)]
pub struct LocalFileSource {
    path: PathBuf,
}

impl LocalFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl FileSource for LocalFileSource {
    async fn save_to(&self, dest: &Path) -> ArchivistResult<u64> {
        Ok(tokio::fs::copy(&self.path, dest).await?)
    }
}

/// One button of an inline menu attached to a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuButton {
    /// Text shown on the button.
    pub label: String,
    /// Opaque action string reported back when the button is pressed.
    pub action: String,
}

impl MenuButton {
    pub fn new(label: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: action.into(),
        }
    }
}

/// Status and error messages sent to an owner.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, owner: OwnerId, text: &str) -> ArchivistResult<()>;

    /// Sends a message with an inline menu. Transports without menus fall
    /// back to plain text.
    async fn notify_with_menu(
        &self,
        owner: OwnerId,
        text: &str,
        _menu: &[Vec<MenuButton>],
    ) -> ArchivistResult<()> {
        self.notify(owner, text).await
    }
}

/// A file handed to the transport for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// File to send.
    pub path: PathBuf,
    /// Text shown with the file.
    pub caption: String,
}

/// Delivers finished artifacts and parts to their owner.
///
/// Returning `Ok` is the delivery confirmation; the pipeline never deletes
/// a file before it.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    async fn deliver(&self, owner: OwnerId, delivery: &Delivery) -> ArchivistResult<()>;
}

/// Allow-list lookup.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn is_authorized(&self, owner: OwnerId) -> ArchivistResult<bool>;
}
