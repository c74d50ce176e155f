use archivist_core::{ArchivistResult, Authorizer, OwnerId};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

/// Result of an [`AllowList::authorize`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizeOutcome {
    Added,
    AlreadyAuthorized,
}

/// Flat file of authorized user ids, one integer per line.
///
/// The file is only ever appended to. Duplicate lines are tolerated on
/// read, and the bot owner is always authorized whether or not the file
/// lists them.
pub struct AllowList {
    path: PathBuf,
    owner: OwnerId,
}

impl AllowList {
    pub fn new(path: impl Into<PathBuf>, owner: OwnerId) -> Self {
        Self {
            path: path.into(),
            owner,
        }
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub fn is_owner(&self, id: OwnerId) -> bool {
        id == self.owner
    }

    /// Reads every authorized id, the owner first. Blank lines are skipped
    /// and malformed lines are logged and ignored.
    pub async fn load(&self) -> ArchivistResult<Vec<OwnerId>> {
        let mut ids = vec![self.owner];
        let data = match tokio::fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(e.into()),
        };

        for (lineno, line) in data.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match line.parse::<OwnerId>() {
                Ok(id) => ids.push(id),
                Err(e) => warn!(
                    file = %self.path.display(),
                    line = lineno + 1,
                    error = %e,
                    "Skipping malformed allow-list entry"
                ),
            }
        }
        Ok(ids)
    }

    pub async fn contains(&self, id: OwnerId) -> ArchivistResult<bool> {
        if self.is_owner(id) {
            return Ok(true);
        }
        Ok(self.load().await?.contains(&id))
    }

    /// Appends `id` unless it is already authorized.
    pub async fn authorize(&self, id: OwnerId) -> ArchivistResult<AuthorizeOutcome> {
        if self.contains(id).await? {
            return Ok(AuthorizeOutcome::AlreadyAuthorized);
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(format!("{id}\n").as_bytes()).await?;
        file.flush().await?;
        info!(user = %id, "User authorized");
        Ok(AuthorizeOutcome::Added)
    }
}

#[async_trait]
impl Authorizer for AllowList {
    async fn is_authorized(&self, owner: OwnerId) -> ArchivistResult<bool> {
        self.contains(owner).await
    }
}
