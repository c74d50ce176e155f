use crate::budget::SizeBudget;
use archivist_core::{
    ArchivistError, ArchivistResult, FileRef, OwnerId, ProcessId, ARCHIVE_EXTENSION,
    DEFAULT_ARCHIVE_NAME,
};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

#[allow(clippy::expect_used)]
static ARCHIVE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^[A-Za-z0-9_-]+\.{ARCHIVE_EXTENSION}$"))
        .expect("archive name pattern is valid")
});

/// Validates an archive name against `[A-Za-z0-9_-]+.zip`.
pub fn validate_archive_name(name: &str) -> ArchivistResult<()> {
    if ARCHIVE_NAME.is_match(name) {
        Ok(())
    } else {
        Err(ArchivistError::InvalidName(name.to_string()))
    }
}

/// Configuration value the session is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AwaitingInput {
    ArchiveName,
    Password,
}

/// Lifecycle phase of a session.
///
/// `Open` and `Configuring` are both accumulating: they accept files and
/// configuration edits. A session that is not in the store is idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Open,
    Configuring(AwaitingInput),
    Building,
    Delivering,
    Closed,
}

/// One owner's in-progress archive request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub owner: OwnerId,
    pub process_id: ProcessId,
    files: Vec<FileRef>,
    budget: SizeBudget,
    archive_name: String,
    password: Option<String>,
    phase: SessionPhase,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    /// Creates an open session; `now` also seeds the process id.
    pub fn new(owner: OwnerId, ceiling: u64, now: DateTime<Utc>) -> Self {
        Self {
            owner,
            process_id: ProcessId::from_timestamp(now),
            files: Vec::new(),
            budget: SizeBudget::new(ceiling),
            archive_name: DEFAULT_ARCHIVE_NAME.to_string(),
            password: None,
            phase: SessionPhase::Open,
            created_at: now,
            last_activity: now,
        }
    }

    /// Directory name namespacing this session's staging storage.
    pub fn staging_dir_name(&self) -> String {
        format!("temp_{}_{}", self.owner, self.process_id)
    }

    pub fn files(&self) -> &[FileRef] {
        &self.files
    }

    pub fn total_size(&self) -> u64 {
        self.budget.used()
    }

    pub fn ceiling(&self) -> u64 {
        self.budget.ceiling()
    }

    pub fn archive_name(&self) -> &str {
        &self.archive_name
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// The configuration value currently awaited, if any.
    pub fn awaiting(&self) -> Option<AwaitingInput> {
        match self.phase {
            SessionPhase::Configuring(kind) => Some(kind),
            _ => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.phase == SessionPhase::Closed
    }

    /// Fails unless the session accepts files and configuration edits.
    pub fn ensure_accumulating(&self) -> ArchivistResult<()> {
        match self.phase {
            SessionPhase::Open | SessionPhase::Configuring(_) => Ok(()),
            SessionPhase::Building | SessionPhase::Delivering => {
                Err(ArchivistError::Busy(self.owner))
            }
            SessionPhase::Closed => Err(ArchivistError::NoActiveSession(self.owner)),
        }
    }

    /// Checks `incoming` bytes against the remaining budget without committing.
    pub fn check_budget(&self, incoming: u64) -> ArchivistResult<u64> {
        self.ensure_accumulating()?;
        self.budget.check(incoming)
    }

    /// Appends a staged file and returns the new total.
    pub fn accept_file(&mut self, file: FileRef) -> ArchivistResult<u64> {
        self.ensure_accumulating()?;
        let total = self.budget.commit(file.size)?;
        self.files.push(file);
        Ok(total)
    }

    /// Whether a stored name is already taken by an accepted file.
    pub fn has_stored_name(&self, name: &str) -> bool {
        self.files.iter().any(|f| f.stored_name == name)
    }

    /// Marks the session as waiting for a configuration value.
    pub fn await_input(&mut self, kind: AwaitingInput) -> ArchivistResult<()> {
        self.ensure_accumulating()?;
        self.phase = SessionPhase::Configuring(kind);
        Ok(())
    }

    /// Sets the archive name. An invalid name leaves the session unchanged.
    pub fn set_archive_name(&mut self, name: &str) -> ArchivistResult<()> {
        self.ensure_accumulating()?;
        validate_archive_name(name)?;
        self.archive_name = name.to_string();
        if self.awaiting() == Some(AwaitingInput::ArchiveName) {
            self.phase = SessionPhase::Open;
        }
        Ok(())
    }

    /// Sets or clears the password. An empty password clears it.
    pub fn set_password(&mut self, password: Option<String>) -> ArchivistResult<()> {
        self.ensure_accumulating()?;
        self.password = password.filter(|p| !p.is_empty());
        if self.awaiting() == Some(AwaitingInput::Password) {
            self.phase = SessionPhase::Open;
        }
        Ok(())
    }

    /// Enters `Building`. Requires at least one file.
    pub fn begin_build(&mut self) -> ArchivistResult<()> {
        self.ensure_accumulating()?;
        if self.files.is_empty() {
            return Err(ArchivistError::EmptyInput);
        }
        self.phase = SessionPhase::Building;
        Ok(())
    }

    /// Enters `Delivering` after a successful build.
    pub fn begin_delivery(&mut self) {
        if self.phase == SessionPhase::Building {
            self.phase = SessionPhase::Delivering;
        }
    }

    /// Returns to `Open` with files retained after a failed build or delivery.
    pub fn resume_accumulating(&mut self) {
        if matches!(
            self.phase,
            SessionPhase::Building | SessionPhase::Delivering
        ) {
            self.phase = SessionPhase::Open;
        }
    }

    pub fn close(&mut self) {
        self.phase = SessionPhase::Closed;
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity = now;
    }

    /// Whether the session has seen no activity for longer than `timeout`.
    pub fn is_idle(&self, now: DateTime<Utc>, timeout: chrono::Duration) -> bool {
        now - self.last_activity > timeout
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(OwnerId(7), 100, Utc::now())
    }

    #[test]
    fn test_archive_name_validation() {
        assert!(validate_archive_name("data.zip").is_ok());
        assert!(validate_archive_name("my-archive_1.zip").is_ok());
        assert!(validate_archive_name("data.tar").is_err());
        assert!(validate_archive_name("../evil.zip").is_err());
        assert!(validate_archive_name("no extension").is_err());
        assert!(validate_archive_name(".zip").is_err());
        assert!(validate_archive_name("a.zip\n").is_err());
    }

    #[test]
    fn test_new_session_defaults() {
        let s = session();
        assert_eq!(s.phase(), SessionPhase::Open);
        assert_eq!(s.archive_name(), "archive.zip");
        assert!(s.password().is_none());
        assert_eq!(s.total_size(), 0);
        assert_eq!(
            s.staging_dir_name(),
            format!("temp_7_{}", s.process_id.as_str())
        );
    }

    #[test]
    fn test_accept_file_updates_total() {
        let mut s = session();
        assert_eq!(s.accept_file(FileRef::new("/a", "a", 60)).unwrap(), 60);
        assert!(s.accept_file(FileRef::new("/b", "b", 41)).is_err());
        assert_eq!(s.total_size(), 60);
        assert_eq!(s.files().len(), 1);
        assert!(s.has_stored_name("a"));
    }

    #[test]
    fn test_configuring_flow() {
        let mut s = session();
        s.await_input(AwaitingInput::ArchiveName).unwrap();
        assert_eq!(s.awaiting(), Some(AwaitingInput::ArchiveName));

        // Invalid value keeps the session waiting.
        assert!(s.set_archive_name("bad name").is_err());
        assert_eq!(s.awaiting(), Some(AwaitingInput::ArchiveName));

        s.set_archive_name("out.zip").unwrap();
        assert_eq!(s.phase(), SessionPhase::Open);
        assert_eq!(s.archive_name(), "out.zip");

        s.await_input(AwaitingInput::Password).unwrap();
        s.set_password(Some("secret".into())).unwrap();
        assert_eq!(s.password(), Some("secret"));
        assert_eq!(s.phase(), SessionPhase::Open);

        s.set_password(None).unwrap();
        assert!(s.password().is_none());
    }

    #[test]
    fn test_files_accepted_while_configuring() {
        let mut s = session();
        s.await_input(AwaitingInput::Password).unwrap();
        s.accept_file(FileRef::new("/a", "a", 1)).unwrap();
        assert_eq!(s.awaiting(), Some(AwaitingInput::Password));
    }

    #[test]
    fn test_build_requires_files() {
        let mut s = session();
        assert!(matches!(s.begin_build(), Err(ArchivistError::EmptyInput)));
        assert_eq!(s.phase(), SessionPhase::Open);

        s.accept_file(FileRef::new("/a", "a", 1)).unwrap();
        s.begin_build().unwrap();
        assert_eq!(s.phase(), SessionPhase::Building);
        assert!(matches!(
            s.accept_file(FileRef::new("/b", "b", 1)),
            Err(ArchivistError::Busy(_))
        ));

        s.resume_accumulating();
        assert_eq!(s.phase(), SessionPhase::Open);
        assert_eq!(s.files().len(), 1);
    }

    #[test]
    fn test_closed_session_rejects_edits() {
        let mut s = session();
        s.close();
        assert!(matches!(
            s.set_archive_name("x.zip"),
            Err(ArchivistError::NoActiveSession(OwnerId(7)))
        ));
    }

    #[test]
    fn test_idle_detection() {
        let start = Utc::now();
        let s = Session::new(OwnerId(1), 10, start);
        let timeout = chrono::Duration::minutes(5);
        assert!(!s.is_idle(start + chrono::Duration::minutes(4), timeout));
        assert!(s.is_idle(start + chrono::Duration::minutes(6), timeout));
    }
}
