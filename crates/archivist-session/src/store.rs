use crate::session::Session;
use archivist_core::{ArchivistError, ArchivistResult, FileRef, OwnerId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Shared handle to one session. Holding its lock serializes every
/// operation on that session; other owners are unaffected.
pub type SessionHandle = Arc<tokio::sync::Mutex<Session>>;

/// Owner-keyed session storage, one active session per owner.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Creates a fresh session for `owner`, replacing any previous one.
    /// The displaced handle is returned so its staging can be reclaimed.
    async fn open(&self, owner: OwnerId, now: DateTime<Utc>)
        -> (SessionHandle, Option<SessionHandle>);

    async fn get(&self, owner: OwnerId) -> ArchivistResult<SessionHandle>;

    /// Appends an accepted file, returning the new total.
    async fn add_file(&self, owner: OwnerId, file: FileRef) -> ArchivistResult<u64>;

    async fn set_name(&self, owner: OwnerId, name: &str) -> ArchivistResult<()>;

    async fn set_password(&self, owner: OwnerId, password: Option<String>) -> ArchivistResult<()>;

    /// Removes the owner's session record. A missing session is not an error.
    async fn close(&self, owner: OwnerId) -> Option<SessionHandle>;

    /// Removes the record only if it still refers to `handle`.
    async fn close_handle(&self, owner: OwnerId, handle: &SessionHandle) -> bool;

    /// Snapshot of every stored session handle.
    async fn list(&self) -> Vec<(OwnerId, SessionHandle)>;
}

/// In-memory session store. The map lock is never held across an await;
/// per-session work happens under the session's own async lock.
pub struct InMemorySessionStore {
    ceiling: u64,
    sessions: Mutex<HashMap<OwnerId, SessionHandle>>,
}

impl InMemorySessionStore {
    pub fn new(ceiling: u64) -> Self {
        Self {
            ceiling,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn ceiling(&self) -> u64 {
        self.ceiling
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    fn handle(&self, owner: OwnerId) -> ArchivistResult<SessionHandle> {
        self.sessions
            .lock()
            .get(&owner)
            .cloned()
            .ok_or(ArchivistError::NoActiveSession(owner))
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn open(
        &self,
        owner: OwnerId,
        now: DateTime<Utc>,
    ) -> (SessionHandle, Option<SessionHandle>) {
        let handle = Arc::new(tokio::sync::Mutex::new(Session::new(
            owner,
            self.ceiling,
            now,
        )));
        let previous = self.sessions.lock().insert(owner, handle.clone());
        (handle, previous)
    }

    async fn get(&self, owner: OwnerId) -> ArchivistResult<SessionHandle> {
        self.handle(owner)
    }

    async fn add_file(&self, owner: OwnerId, file: FileRef) -> ArchivistResult<u64> {
        let handle = self.handle(owner)?;
        let mut session = handle.lock().await;
        session.accept_file(file)
    }

    async fn set_name(&self, owner: OwnerId, name: &str) -> ArchivistResult<()> {
        let handle = self.handle(owner)?;
        let mut session = handle.lock().await;
        session.set_archive_name(name)
    }

    async fn set_password(&self, owner: OwnerId, password: Option<String>) -> ArchivistResult<()> {
        let handle = self.handle(owner)?;
        let mut session = handle.lock().await;
        session.set_password(password)
    }

    async fn close(&self, owner: OwnerId) -> Option<SessionHandle> {
        self.sessions.lock().remove(&owner)
    }

    async fn close_handle(&self, owner: OwnerId, handle: &SessionHandle) -> bool {
        let mut sessions = self.sessions.lock();
        match sessions.get(&owner) {
            Some(current) if Arc::ptr_eq(current, handle) => {
                sessions.remove(&owner);
                true
            }
            _ => false,
        }
    }

    async fn list(&self) -> Vec<(OwnerId, SessionHandle)> {
        self.sessions
            .lock()
            .iter()
            .map(|(owner, handle)| (*owner, handle.clone()))
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_and_get() {
        let store = InMemorySessionStore::new(100);
        let (handle, previous) = store.open(OwnerId(1), Utc::now()).await;
        assert!(previous.is_none());
        let fetched = store.get(OwnerId(1)).await.unwrap();
        assert!(Arc::ptr_eq(&handle, &fetched));
    }

    #[tokio::test]
    async fn test_get_missing_is_no_active_session() {
        let store = InMemorySessionStore::new(100);
        let err = store.get(OwnerId(5)).await.unwrap_err();
        assert!(matches!(err, ArchivistError::NoActiveSession(OwnerId(5))));
    }

    #[tokio::test]
    async fn test_reopen_replaces_session() {
        let store = InMemorySessionStore::new(100);
        let (first, _) = store.open(OwnerId(1), Utc::now()).await;
        store
            .add_file(OwnerId(1), FileRef::new("/a", "a", 10))
            .await
            .unwrap();

        let (second, previous) = store.open(OwnerId(1), Utc::now()).await;
        assert!(Arc::ptr_eq(&previous.unwrap(), &first));
        assert_eq!(second.lock().await.total_size(), 0);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let store = InMemorySessionStore::new(100);
        assert!(store.close(OwnerId(1)).await.is_none());
        store.open(OwnerId(1), Utc::now()).await;
        assert!(store.close(OwnerId(1)).await.is_some());
        assert!(store.close(OwnerId(1)).await.is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_close_handle_ignores_stale_handle() {
        let store = InMemorySessionStore::new(100);
        let (stale, _) = store.open(OwnerId(1), Utc::now()).await;
        let (fresh, _) = store.open(OwnerId(1), Utc::now()).await;
        assert!(!store.close_handle(OwnerId(1), &stale).await);
        assert!(store.close_handle(OwnerId(1), &fresh).await);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_store_operations_delegate_to_session() {
        let store = InMemorySessionStore::new(15);
        store.open(OwnerId(2), Utc::now()).await;

        assert_eq!(
            store
                .add_file(OwnerId(2), FileRef::new("/a", "a.txt", 5))
                .await
                .unwrap(),
            5
        );
        assert!(matches!(
            store
                .add_file(OwnerId(2), FileRef::new("/b", "b.txt", 11))
                .await,
            Err(ArchivistError::OverBudget { .. })
        ));
        assert!(matches!(
            store.set_name(OwnerId(2), "data.tar").await,
            Err(ArchivistError::InvalidName(_))
        ));
        store.set_name(OwnerId(2), "data.zip").await.unwrap();
        store
            .set_password(OwnerId(2), Some("pw".into()))
            .await
            .unwrap();

        let handle = store.get(OwnerId(2)).await.unwrap();
        let session = handle.lock().await;
        assert_eq!(session.total_size(), 5);
        assert_eq!(session.archive_name(), "data.zip");
        assert_eq!(session.password(), Some("pw"));
    }

    #[tokio::test]
    async fn test_sessions_of_different_owners_are_independent() {
        let store = Arc::new(InMemorySessionStore::new(1_000));
        store.open(OwnerId(1), Utc::now()).await;
        store.open(OwnerId(2), Utc::now()).await;

        // Holding owner 1's lock must not block owner 2.
        let held = store.get(OwnerId(1)).await.unwrap();
        let _guard = held.lock().await;
        let total = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            store.add_file(OwnerId(2), FileRef::new("/x", "x", 3)),
        )
        .await
        .expect("owner 2 must not wait on owner 1")
        .unwrap();
        assert_eq!(total, 3);
    }
}
