use crate::channel::Channel;
use archivist_core::{ArchivistError, ArchivistResult, ArtifactSink, Delivery, Notifier, OwnerId};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::PathBuf;
use tracing::info;

/// Channel that delivers into a local directory and logs notifications.
///
/// Used by the `pack` subcommand and by tests. Delivered files are moved
/// out of the staging area, so callers must tolerate the source being gone
/// after a successful delivery.
pub struct LocalChannel {
    output_dir: PathBuf,
    notifications: Mutex<Vec<(OwnerId, String)>>,
    delivered: Mutex<Vec<Delivery>>,
}

impl LocalChannel {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            notifications: Mutex::new(Vec::new()),
            delivered: Mutex::new(Vec::new()),
        }
    }

    /// Every notification sent so far, oldest first.
    pub fn notifications(&self) -> Vec<(OwnerId, String)> {
        self.notifications.lock().clone()
    }

    /// Deliveries with their paths rewritten to the output directory.
    pub fn delivered(&self) -> Vec<Delivery> {
        self.delivered.lock().clone()
    }
}

#[async_trait]
impl Notifier for LocalChannel {
    async fn notify(&self, owner: OwnerId, text: &str) -> ArchivistResult<()> {
        info!(owner = %owner, "{text}");
        self.notifications.lock().push((owner, text.to_string()));
        Ok(())
    }
}

#[async_trait]
impl ArtifactSink for LocalChannel {
    async fn deliver(&self, owner: OwnerId, delivery: &Delivery) -> ArchivistResult<()> {
        let file_name = delivery.path.file_name().ok_or_else(|| {
            ArchivistError::Delivery(format!("Not a file: {}", delivery.path.display()))
        })?;
        tokio::fs::create_dir_all(&self.output_dir).await?;
        let target = self.output_dir.join(file_name);

        // Staging may sit on another filesystem.
        if tokio::fs::rename(&delivery.path, &target).await.is_err() {
            tokio::fs::copy(&delivery.path, &target).await?;
            tokio::fs::remove_file(&delivery.path).await?;
        }

        info!(owner = %owner, file = %target.display(), caption = %delivery.caption, "Delivered");
        self.delivered.lock().push(Delivery {
            path: target,
            caption: delivery.caption.clone(),
        });
        Ok(())
    }
}

#[async_trait]
impl Channel for LocalChannel {
    fn name(&self) -> &str {
        "local"
    }
}
