#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Regression tests for archivist-security: AllowList, Sanitizer.

use archivist_core::{Authorizer, OwnerId};
use archivist_security::{AllowList, AuthorizeOutcome, Sanitizer};
use std::sync::Arc;

// --- AllowList ---

#[tokio::test]
async fn test_allow_list_survives_reload() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("data").join("authorized.txt");

    {
        let list = AllowList::new(&path, OwnerId(100));
        list.authorize(OwnerId(200)).await.unwrap();
        list.authorize(OwnerId(300)).await.unwrap();
    }

    let reloaded = AllowList::new(&path, OwnerId(100));
    assert_eq!(
        reloaded.load().await.unwrap(),
        vec![OwnerId(100), OwnerId(200), OwnerId(300)]
    );
}

#[tokio::test]
async fn test_allow_list_is_append_only() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("authorized.txt");
    tokio::fs::write(&path, "42\n42\n").await.unwrap();

    let list = AllowList::new(&path, OwnerId(1));
    assert_eq!(
        list.authorize(OwnerId(42)).await.unwrap(),
        AuthorizeOutcome::AlreadyAuthorized
    );
    list.authorize(OwnerId(43)).await.unwrap();

    // Existing duplicates are never rewritten.
    assert_eq!(
        tokio::fs::read_to_string(&path).await.unwrap(),
        "42\n42\n43\n"
    );
}

#[tokio::test]
async fn test_authorizer_trait_object() {
    let tmp = tempfile::tempdir().unwrap();
    let auth: Arc<dyn Authorizer> =
        Arc::new(AllowList::new(tmp.path().join("a.txt"), OwnerId(9)));
    assert!(auth.is_authorized(OwnerId(9)).await.unwrap());
    assert!(!auth.is_authorized(OwnerId(10)).await.unwrap());
}

// --- Sanitizer ---

#[test]
fn test_sanitized_names_never_escape_directory() {
    let s = Sanitizer::default();
    for name in ["../x", "..\\x", "/abs/x", "a/../../x", "./x"] {
        let clean = s.sanitize_file_name(name);
        assert!(!clean.contains('/'), "{clean}");
        assert!(!clean.contains('\\'), "{clean}");
        assert_ne!(clean, "..");
    }
}

#[test]
fn test_sanitize_rejects_only_control() {
    let s = Sanitizer::default();
    assert!(s.sanitize("\x01\x02").is_rejected());
    assert_eq!(s.sanitize("ok").into_string().as_deref(), Some("ok"));
}
