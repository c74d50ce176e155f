use crate::session::Session;
use archivist_core::ArchivistResult;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Prefix shared by every session staging directory.
const STAGING_PREFIX: &str = "temp_";

/// Ephemeral on-disk area holding uploads, artifacts and parts.
///
/// Layout under `root`:
///
/// ```text
/// temp_<owner>_<process_id>/
///     files/<stored name>     staged uploads
///     <archive name>          built artifact
///     <archive name>.partN    parts of an oversized artifact
/// ```
#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn session_dir(&self, session: &Session) -> PathBuf {
        self.root.join(session.staging_dir_name())
    }

    pub fn files_dir(&self, session: &Session) -> PathBuf {
        self.session_dir(session).join("files")
    }

    pub fn artifact_path(&self, session: &Session) -> PathBuf {
        self.session_dir(session).join(session.archive_name())
    }

    /// Reserves a staging path for an upload.
    ///
    /// Only the base name of `display_name` is kept; a name already used in
    /// the session gets a ` (n)` suffix so archive entries stay unique.
    /// Returns the target path and the stored name.
    pub async fn prepare_upload(
        &self,
        session: &Session,
        display_name: &str,
    ) -> ArchivistResult<(PathBuf, String)> {
        let dir = self.files_dir(session);
        tokio::fs::create_dir_all(&dir).await?;

        let base = base_name(display_name);
        let mut candidate = base.clone();
        let mut n = 0;
        while session.has_stored_name(&candidate)
            || tokio::fs::try_exists(dir.join(&candidate)).await?
        {
            n += 1;
            candidate = numbered(&base, n);
        }
        Ok((dir.join(&candidate), candidate))
    }

    /// Deletes the session's staging directory. Returns whether anything
    /// was removed.
    pub async fn reclaim(&self, session: &Session) -> ArchivistResult<bool> {
        let dir = self.session_dir(session);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                info!(owner = %session.owner, dir = %dir.display(), "Staging reclaimed");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Removes staging directories left behind by a previous process.
    pub async fn sweep_orphans(&self) -> ArchivistResult<usize> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let is_staging = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(STAGING_PREFIX));
            if !is_staging || !entry.file_type().await?.is_dir() {
                continue;
            }
            match tokio::fs::remove_dir_all(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %entry.path().display(), error = %e, "Orphan sweep failed"),
            }
        }
        Ok(removed)
    }
}

/// Base name of an upload, with path components and separators dropped.
fn base_name(display_name: &str) -> String {
    let last = display_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    match last {
        "" | "." | ".." => "file".to_string(),
        name => name.to_string(),
    }
}

/// `report.pdf` -> `report (2).pdf`; dotfiles and extensionless names get
/// the suffix at the end.
fn numbered(base: &str, n: usize) -> String {
    match base.rfind('.') {
        Some(dot) if dot > 0 => format!("{} ({n}){}", &base[..dot], &base[dot..]),
        _ => format!("{base} ({n})"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use archivist_core::{FileRef, OwnerId};
    use chrono::Utc;

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("a.txt"), "a.txt");
        assert_eq!(base_name("../../etc/passwd"), "passwd");
        assert_eq!(base_name("C:\\docs\\report.pdf"), "report.pdf");
        assert_eq!(base_name("dir/"), "file");
        assert_eq!(base_name(".."), "file");
    }

    #[test]
    fn test_numbered() {
        assert_eq!(numbered("report.pdf", 2), "report (2).pdf");
        assert_eq!(numbered("README", 1), "README (1)");
        assert_eq!(numbered(".env", 1), ".env (1)");
    }

    #[tokio::test]
    async fn test_prepare_upload_deduplicates() {
        let tmp = tempfile::tempdir().unwrap();
        let staging = StagingArea::new(tmp.path());
        let mut session = Session::new(OwnerId(3), 100, Utc::now());

        let (path, name) = staging.prepare_upload(&session, "a.txt").await.unwrap();
        assert_eq!(name, "a.txt");
        assert_eq!(path, staging.files_dir(&session).join("a.txt"));
        session.accept_file(FileRef::new(&path, &name, 0)).unwrap();

        let (_, second) = staging.prepare_upload(&session, "a.txt").await.unwrap();
        assert_eq!(second, "a (1).txt");
    }

    #[tokio::test]
    async fn test_reclaim_removes_session_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let staging = StagingArea::new(tmp.path());
        let session = Session::new(OwnerId(3), 100, Utc::now());

        assert!(!staging.reclaim(&session).await.unwrap());

        let (path, _) = staging.prepare_upload(&session, "x.bin").await.unwrap();
        tokio::fs::write(&path, b"data").await.unwrap();
        assert!(staging.reclaim(&session).await.unwrap());
        assert!(!staging.session_dir(&session).exists());
    }

    #[tokio::test]
    async fn test_sweep_orphans_only_touches_staging_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let staging = StagingArea::new(tmp.path());
        tokio::fs::create_dir_all(tmp.path().join("temp_1_20240101000000/files"))
            .await
            .unwrap();
        tokio::fs::create_dir_all(tmp.path().join("keep")).await.unwrap();
        tokio::fs::write(tmp.path().join("temp_note.txt"), b"x")
            .await
            .unwrap();

        assert_eq!(staging.sweep_orphans().await.unwrap(), 1);
        assert!(tmp.path().join("keep").exists());
        assert!(tmp.path().join("temp_note.txt").exists());
    }

    #[tokio::test]
    async fn test_sweep_missing_root() {
        let tmp = tempfile::tempdir().unwrap();
        let staging = StagingArea::new(tmp.path().join("absent"));
        assert_eq!(staging.sweep_orphans().await.unwrap(), 0);
    }
}
