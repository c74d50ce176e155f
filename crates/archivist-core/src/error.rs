use crate::{format_size, OwnerId};

/// Top-level error type for the archivist pipeline.
///
/// Every variant is scoped to a single session; none of them is fatal to the
/// process. `Io` and `Archive` together cover staging read/write failures
/// during build and split.
#[derive(Debug, thiserror::Error)]
pub enum ArchivistError {
    /// Accepting a file would push the session total over its ceiling.
    #[error("Total size exceeds {}", format_size(*ceiling))]
    OverBudget {
        /// Bytes already committed to the session.
        current: u64,
        /// Size of the rejected file.
        incoming: u64,
        /// Configured ceiling.
        ceiling: u64,
    },

    /// An archive name did not match `[A-Za-z0-9_-]+.zip`.
    #[error("Invalid archive name: {0}")]
    InvalidName(String),

    /// Free-text input was too long or held nothing printable.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The owner has no open session.
    #[error("No active session for {0}")]
    NoActiveSession(OwnerId),

    /// The session is building or delivering and cannot take edits.
    #[error("Archive for {0} is already being built")]
    Busy(OwnerId),

    /// A build was requested for a session without files.
    #[error("No files to archive")]
    EmptyInput,

    /// The owner is not on the allow-list.
    #[error("User {0} is not authorized")]
    Unauthorized(OwnerId),

    /// The transport could not deliver an artifact or part.
    #[error("Delivery error: {0}")]
    Delivery(String),

    /// An error reported by the compression library.
    #[error("Archive error: {0}")]
    Archive(String),

    /// An error from a chat transport.
    #[error("Channel error: {0}")]
    Channel(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ArchivistError {
    /// Whether the error came from reading or writing staging storage.
    pub fn is_io_failure(&self) -> bool {
        matches!(self, ArchivistError::Io(_) | ArchivistError::Archive(_))
    }
}

/// A convenience `Result` alias using [`ArchivistError`].
pub type ArchivistResult<T> = Result<T, ArchivistError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn over_budget_message_uses_human_size() {
        let err = ArchivistError::OverBudget {
            current: 10,
            incoming: 5,
            ceiling: 1024,
        };
        assert_eq!(err.to_string(), "Total size exceeds 1 KB");
    }

    #[test]
    fn io_failure_classification() {
        let io = ArchivistError::from(std::io::Error::other("disk"));
        assert!(io.is_io_failure());
        assert!(ArchivistError::Archive("bad".into()).is_io_failure());
        assert!(!ArchivistError::EmptyInput.is_io_failure());
    }
}
