use crate::messages;
use archivist_archive::{needs_split, ArchiveBuilder, Artifact, PartSplitter};
use archivist_core::{
    ArchivistError, ArchivistResult, ArtifactSink, Delivery, FileRef, FileSource, Notifier,
    OwnerId, DEFAULT_MAX_PART_SIZE, DEFAULT_MAX_TOTAL_SIZE,
};
use archivist_security::{SanitizeResult, Sanitizer};
use archivist_session::{
    AwaitingInput, Session, SessionHandle, SessionPhase, SessionStore, StagingArea,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Limits and locations used by [`SessionPipeline`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Ceiling on the cumulative size of a session's accepted files.
    pub max_total_size: u64,
    /// Largest artifact delivered in one piece; bigger ones are split.
    pub max_part_size: u64,
    pub staging_root: PathBuf,
    /// Sessions without activity for this long are closed by the reaper.
    pub idle_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_total_size: DEFAULT_MAX_TOTAL_SIZE,
            max_part_size: DEFAULT_MAX_PART_SIZE,
            staging_root: PathBuf::from("staging"),
            idle_timeout: Duration::from_secs(3600),
        }
    }
}

/// Snapshot returned by [`SessionPipeline::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub files: usize,
    pub total_size: u64,
    pub ceiling: u64,
    pub archive_name: String,
    pub password_set: bool,
    pub phase: SessionPhase,
}

/// Drives sessions from open through build and delivery to close.
///
/// Every operation takes the session's lock for its whole duration, so
/// operations on one owner's session never interleave. Recoverable
/// failures are reported to the owner through the notifier and returned
/// to the caller; none of them ends the process.
pub struct SessionPipeline {
    config: PipelineConfig,
    store: Arc<dyn SessionStore>,
    staging: StagingArea,
    builder: ArchiveBuilder,
    sanitizer: Sanitizer,
    notifier: Arc<dyn Notifier>,
    sink: Arc<dyn ArtifactSink>,
}

impl SessionPipeline {
    pub fn new(
        config: PipelineConfig,
        store: Arc<dyn SessionStore>,
        notifier: Arc<dyn Notifier>,
        sink: Arc<dyn ArtifactSink>,
    ) -> Self {
        Self {
            staging: StagingArea::new(config.staging_root.clone()),
            config,
            store,
            builder: ArchiveBuilder::new(),
            sanitizer: Sanitizer::default(),
            notifier,
            sink,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }

    /// Removes staging directories left behind by an earlier run.
    pub async fn sweep_orphans(&self) -> ArchivistResult<usize> {
        let removed = self.staging.sweep_orphans().await?;
        if removed > 0 {
            info!(removed, root = %self.staging.root().display(), "Swept orphaned staging");
        }
        Ok(removed)
    }

    pub async fn has_session(&self, owner: OwnerId) -> bool {
        self.store.get(owner).await.is_ok()
    }

    /// Opens a fresh session, closing and reclaiming any previous one.
    pub async fn open(&self, owner: OwnerId, now: DateTime<Utc>) -> ArchivistResult<SessionHandle> {
        let (handle, previous) = self.store.open(owner, now).await;
        if let Some(previous) = previous {
            let mut old = previous.lock().await;
            old.close();
            self.reclaim(&old).await;
            info!(owner = %owner, process = %old.process_id, "Previous session discarded");
        }
        info!(owner = %owner, "Session opened");
        self.tell(owner, &messages::session_opened(self.config.max_total_size))
            .await;
        Ok(handle)
    }

    /// Stages one upload and adds it to the owner's session.
    ///
    /// The declared size is checked before anything is downloaded and the
    /// written size once the bytes are on disk; a rejected upload leaves no
    /// staged copy behind.
    pub async fn add_file(
        &self,
        owner: OwnerId,
        display_name: &str,
        declared_size: u64,
        source: &dyn FileSource,
    ) -> ArchivistResult<u64> {
        let result = self
            .try_add_file(owner, display_name, declared_size, source)
            .await;
        self.report(owner, result).await
    }

    async fn try_add_file(
        &self,
        owner: OwnerId,
        display_name: &str,
        declared_size: u64,
        source: &dyn FileSource,
    ) -> ArchivistResult<u64> {
        let handle = self.store.get(owner).await?;
        let mut session = handle.lock().await;
        session.check_budget(declared_size)?;

        let name = self.sanitizer.sanitize_file_name(display_name);
        let (path, stored_name) = self.staging.prepare_upload(&session, &name).await?;
        let written = match source.save_to(&path).await {
            Ok(written) => written,
            Err(e) => {
                discard(&path).await;
                return Err(e);
            }
        };

        let total = match session.accept_file(FileRef::new(&path, &stored_name, written)) {
            Ok(total) => total,
            Err(e) => {
                discard(&path).await;
                return Err(e);
            }
        };
        session.touch(Utc::now());
        info!(owner = %owner, file = %stored_name, bytes = written, total, "File staged");
        drop(session);

        self.tell(owner, &messages::file_saved(&stored_name, total))
            .await;
        Ok(total)
    }

    /// Shows the configuration menu for an open session.
    pub async fn show_menu(&self, owner: OwnerId) -> ArchivistResult<()> {
        let result = async {
            let handle = self.store.get(owner).await?;
            let session = handle.lock().await;
            session.ensure_accumulating()?;
            Ok::<_, ArchivistError>(())
        }
        .await;
        self.report(owner, result).await?;

        if let Err(e) = self
            .notifier
            .notify_with_menu(owner, messages::CONFIGURE_MENU, &messages::configure_menu())
            .await
        {
            warn!(owner = %owner, error = %e, "Failed to send menu");
        }
        Ok(())
    }

    /// Marks the session as waiting for a name or password.
    pub async fn request_input(&self, owner: OwnerId, kind: AwaitingInput) -> ArchivistResult<()> {
        let result = async {
            let handle = self.store.get(owner).await?;
            let mut session = handle.lock().await;
            session.await_input(kind)?;
            session.touch(Utc::now());
            Ok::<_, ArchivistError>(())
        }
        .await;
        self.report(owner, result).await?;

        let prompt = match kind {
            AwaitingInput::ArchiveName => messages::ASK_NAME,
            AwaitingInput::Password => messages::ASK_PASSWORD,
        };
        self.tell(owner, prompt).await;
        Ok(())
    }

    /// Applies free text to whatever value the session is awaiting.
    ///
    /// Returns `false` when nothing was awaited. `/skip` while a password
    /// is awaited clears the password. An invalid name or rejected input
    /// keeps the session waiting for another attempt.
    pub async fn provide_input(&self, owner: OwnerId, text: &str) -> ArchivistResult<bool> {
        let result = self.try_provide_input(owner, text).await;
        let reply = self.report(owner, result).await?;
        match reply {
            Some(reply) => {
                self.tell(owner, &reply).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn try_provide_input(&self, owner: OwnerId, text: &str) -> ArchivistResult<Option<String>> {
        let Ok(handle) = self.store.get(owner).await else {
            return Ok(None);
        };
        let mut session = handle.lock().await;
        let Some(awaiting) = session.awaiting() else {
            return Ok(None);
        };
        let text = match self.sanitizer.sanitize(text) {
            SanitizeResult::Clean(text) | SanitizeResult::Cleaned(text) => text,
            SanitizeResult::Rejected(reason) => {
                session.touch(Utc::now());
                return Err(ArchivistError::InvalidInput(reason));
            }
        };

        let reply = match awaiting {
            AwaitingInput::ArchiveName => {
                session.set_archive_name(&text)?;
                messages::name_set(&text)
            }
            AwaitingInput::Password if text == "/skip" || text.is_empty() => {
                session.set_password(None)?;
                messages::PASSWORD_REMOVED.to_string()
            }
            AwaitingInput::Password => {
                let reply = messages::password_set(&text);
                session.set_password(Some(text))?;
                reply
            }
        };
        session.touch(Utc::now());
        Ok(Some(reply))
    }

    /// Sets the archive name directly.
    pub async fn set_name(&self, owner: OwnerId, name: &str) -> ArchivistResult<()> {
        let result = self.store.set_name(owner, name).await;
        self.report(owner, result).await?;
        self.touch(owner).await;
        self.tell(owner, &messages::name_set(name)).await;
        Ok(())
    }

    /// Sets or clears the archive password directly.
    pub async fn set_password(&self, owner: OwnerId, password: Option<String>) -> ArchivistResult<()> {
        let reply = match password.as_deref() {
            Some(p) if !p.is_empty() => messages::password_set(p),
            _ => messages::PASSWORD_REMOVED.to_string(),
        };
        let result = self.store.set_password(owner, password).await;
        self.report(owner, result).await?;
        self.touch(owner).await;
        self.tell(owner, &reply).await;
        Ok(())
    }

    /// Builds the archive and delivers it, split into parts when it is
    /// larger than the part limit.
    ///
    /// On success the session is closed and its staging reclaimed. A build
    /// or split failure purges the artifact and any parts and returns the
    /// session to `Open` with its files. A delivery failure keeps whatever
    /// was not yet delivered and also returns the session to `Open`.
    pub async fn build_and_deliver(&self, owner: OwnerId) -> ArchivistResult<Artifact> {
        let handle = match self.store.get(owner).await {
            Ok(handle) => handle,
            Err(e) => return Err(self.reject(owner, e).await),
        };
        let mut session = handle.lock().await;
        if let Err(e) = session.begin_build() {
            return Err(self.reject(owner, e).await);
        }

        let dest = self.staging.artifact_path(&session);
        info!(
            owner = %owner,
            files = session.files().len(),
            bytes = session.total_size(),
            archive = %session.archive_name(),
            "Building archive"
        );
        let artifact = match self
            .builder
            .build(session.files(), session.password(), &dest)
            .await
        {
            Ok(artifact) => artifact,
            Err(e) => {
                session.resume_accumulating();
                session.touch(Utc::now());
                warn!(owner = %owner, error = %e, "Archive build failed");
                self.tell(owner, &messages::build_failed(&e)).await;
                return Err(e);
            }
        };

        session.begin_delivery();
        if let Err(e) = self.deliver(&session, &artifact).await {
            session.resume_accumulating();
            session.touch(Utc::now());
            if matches!(e, ArchivistError::Delivery(_)) {
                warn!(owner = %owner, error = %e, "Archive delivery failed");
                self.tell(owner, &messages::delivery_failed(&e)).await;
            } else {
                purge_artifact(&artifact.path).await;
                warn!(owner = %owner, error = %e, "Archive split failed");
                self.tell(owner, &messages::build_failed(&e)).await;
            }
            return Err(e);
        }

        session.close();
        self.store.close_handle(owner, &handle).await;
        self.reclaim(&session).await;
        info!(owner = %owner, archive = %artifact.name, bytes = artifact.size, "Session delivered");
        Ok(artifact)
    }

    async fn deliver(&self, session: &Session, artifact: &Artifact) -> ArchivistResult<()> {
        let owner = session.owner;
        if !needs_split(artifact.size, self.config.max_part_size) {
            let delivery = Delivery {
                path: artifact.path.clone(),
                caption: messages::artifact_caption(&artifact.name, session.password()),
            };
            self.send(owner, &delivery).await?;
            discard(&artifact.path).await;
            return Ok(());
        }

        self.tell(owner, &messages::splitting(self.config.max_part_size))
            .await;
        let mut splitter = PartSplitter::new(&artifact.path, self.config.max_part_size)?;
        while let Some(part) = splitter.next_part().await? {
            let delivery = Delivery {
                path: part.path.clone(),
                caption: messages::part_caption(part.index, &part.artifact_name),
            };
            self.send(owner, &delivery).await?;
            discard(&part.path).await;
            debug!(owner = %owner, part = part.index, bytes = part.size, "Part delivered");
        }
        Ok(())
    }

    /// Hands one file to the sink. Any sink failure counts as a delivery
    /// failure, whatever error the sink reported.
    async fn send(&self, owner: OwnerId, delivery: &Delivery) -> ArchivistResult<()> {
        self.sink
            .deliver(owner, delivery)
            .await
            .map_err(|e| match e {
                ArchivistError::Delivery(_) => e,
                other => ArchivistError::Delivery(other.to_string()),
            })
    }

    /// Closes the owner's session and reclaims its staging. Returns whether
    /// there was a session to cancel.
    pub async fn cancel(&self, owner: OwnerId) -> ArchivistResult<bool> {
        let Ok(handle) = self.store.get(owner).await else {
            self.tell(owner, messages::NOTHING_TO_CANCEL).await;
            return Ok(false);
        };
        let mut session = handle.lock().await;
        session.close();
        self.store.close_handle(owner, &handle).await;
        self.reclaim(&session).await;
        drop(session);

        info!(owner = %owner, "Session cancelled");
        self.tell(owner, messages::CANCELLED).await;
        Ok(true)
    }

    /// Reports the session's contents. Fails with `Busy` while a build is
    /// running rather than waiting for it.
    pub async fn status(&self, owner: OwnerId) -> ArchivistResult<SessionStatus> {
        let result = async {
            let handle = self.store.get(owner).await?;
            let session = handle
                .try_lock()
                .map_err(|_| ArchivistError::Busy(owner))?;
            Ok::<_, ArchivistError>(SessionStatus {
                files: session.files().len(),
                total_size: session.total_size(),
                ceiling: session.ceiling(),
                archive_name: session.archive_name().to_string(),
                password_set: session.password().is_some(),
                phase: session.phase(),
            })
        }
        .await;
        let status = self.report(owner, result).await?;

        self.tell(
            owner,
            &messages::status(
                status.files,
                status.total_size,
                status.ceiling,
                &status.archive_name,
                status.password_set,
            ),
        )
        .await;
        Ok(status)
    }

    /// Closes every accumulating session idle for longer than the
    /// configured timeout. Sessions that are building or delivering are
    /// left alone. Returns how many were closed.
    pub async fn reap_idle(&self, now: DateTime<Utc>) -> usize {
        let timeout = chrono::Duration::from_std(self.config.idle_timeout)
            .unwrap_or_else(|_| chrono::Duration::days(36_500));
        let mut reaped = 0;

        for (owner, handle) in self.store.list().await {
            let Ok(mut session) = handle.try_lock() else {
                continue;
            };
            if session.ensure_accumulating().is_err() || !session.is_idle(now, timeout) {
                continue;
            }
            session.close();
            self.store.close_handle(owner, &handle).await;
            self.reclaim(&session).await;
            drop(session);

            info!(owner = %owner, "Idle session reaped");
            self.tell(owner, messages::IDLE_EXPIRED).await;
            reaped += 1;
        }
        reaped
    }

    async fn touch(&self, owner: OwnerId) {
        if let Ok(handle) = self.store.get(owner).await {
            handle.lock().await.touch(Utc::now());
        }
    }

    async fn reclaim(&self, session: &Session) {
        if let Err(e) = self.staging.reclaim(session).await {
            warn!(owner = %session.owner, error = %e, "Failed to reclaim staging");
        }
    }

    /// Notifies the owner of a rejected request and hands the error back.
    async fn reject(&self, owner: OwnerId, err: ArchivistError) -> ArchivistError {
        debug!(owner = %owner, error = %err, "Request rejected");
        self.tell(owner, &messages::rejection(&err)).await;
        err
    }

    async fn report<T>(&self, owner: OwnerId, result: ArchivistResult<T>) -> ArchivistResult<T> {
        match result {
            Ok(value) => Ok(value),
            Err(e) => Err(self.reject(owner, e).await),
        }
    }

    /// Best-effort notification; a failed send is logged, not propagated.
    async fn tell(&self, owner: OwnerId, text: &str) {
        if let Err(e) = self.notifier.notify(owner, text).await {
            warn!(owner = %owner, error = %e, "Notification failed");
        }
    }
}

/// Removes a staged or delivered file. A sink that moved the file away
/// already did the job.
async fn discard(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove file"),
    }
}

/// Removes an artifact together with every `.partN` cut from it.
async fn purge_artifact(artifact: &Path) {
    discard(artifact).await;
    let (Some(dir), Some(name)) = (artifact.parent(), artifact.file_name()) else {
        return;
    };
    let prefix = format!("{}.part", name.to_string_lossy());
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Failed to list staging for purge");
            return;
        }
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if !entry.file_name().to_string_lossy().starts_with(&prefix) {
            continue;
        }
        let removed = match entry.file_type().await {
            Ok(kind) if kind.is_dir() => tokio::fs::remove_dir_all(&path).await,
            _ => tokio::fs::remove_file(&path).await,
        };
        if let Err(e) = removed {
            warn!(path = %path.display(), error = %e, "Failed to purge part");
        }
    }
}
