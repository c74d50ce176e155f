use archivist_core::{ArchivistError, ArchivistResult};
use serde::{Deserialize, Serialize};

/// Checks whether `incoming` bytes fit on top of `current_total`.
///
/// Returns the new total when `current_total + incoming <= ceiling`.
/// Pure: nothing is committed.
pub fn try_reserve(current_total: u64, incoming: u64, ceiling: u64) -> ArchivistResult<u64> {
    match current_total.checked_add(incoming) {
        Some(total) if total <= ceiling => Ok(total),
        _ => Err(ArchivistError::OverBudget {
            current: current_total,
            incoming,
            ceiling,
        }),
    }
}

/// Running byte total of a session, bounded by a ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeBudget {
    ceiling: u64,
    used: u64,
}

impl SizeBudget {
    pub fn new(ceiling: u64) -> Self {
        Self { ceiling, used: 0 }
    }

    pub fn ceiling(&self) -> u64 {
        self.ceiling
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    /// Checks `incoming` without committing it.
    pub fn check(&self, incoming: u64) -> ArchivistResult<u64> {
        try_reserve(self.used, incoming, self.ceiling)
    }

    /// Commits `incoming` bytes. On rejection the total is unchanged.
    pub fn commit(&mut self, incoming: u64) -> ArchivistResult<u64> {
        self.used = self.check(incoming)?;
        Ok(self.used)
    }
}
