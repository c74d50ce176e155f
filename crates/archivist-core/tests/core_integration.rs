#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Integration tests for archivist-core: file sources, identifiers, errors.

use archivist_core::{
    ArchivistError, FileRef, FileSource, LocalFileSource, Notifier, OwnerId, ProcessId,
};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Mutex;

#[tokio::test]
async fn test_local_file_source_copies_bytes() {
    let tmp = tempfile::tempdir().unwrap();
    let src = tmp.path().join("in.bin");
    let dest = tmp.path().join("out.bin");
    tokio::fs::write(&src, b"hello world").await.unwrap();

    let written = LocalFileSource::new(&src).save_to(&dest).await.unwrap();

    assert_eq!(written, 11);
    assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"hello world");
    // The source is left untouched.
    assert!(src.exists());
}

#[tokio::test]
async fn test_local_file_source_missing_file_is_io_error() {
    let tmp = tempfile::tempdir().unwrap();
    let err = LocalFileSource::new(tmp.path().join("missing"))
        .save_to(&tmp.path().join("out"))
        .await
        .unwrap_err();
    assert!(matches!(err, ArchivistError::Io(_)));
}

struct Recorder {
    texts: Mutex<Vec<String>>,
}

#[async_trait]
impl Notifier for Recorder {
    async fn notify(&self, _owner: OwnerId, text: &str) -> archivist_core::ArchivistResult<()> {
        self.texts.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

#[tokio::test]
async fn test_menu_falls_back_to_plain_notify() {
    let recorder = Recorder {
        texts: Mutex::new(Vec::new()),
    };
    let menu = vec![vec![archivist_core::MenuButton::new("Go", "go")]];
    recorder
        .notify_with_menu(OwnerId(1), "configure", &menu)
        .await
        .unwrap();
    assert_eq!(recorder.texts.lock().unwrap().as_slice(), ["configure"]);
}

#[test]
fn test_process_id_is_digits_only() {
    let pid = ProcessId::from_timestamp(Utc::now());
    assert_eq!(pid.as_str().len(), 14);
    assert!(pid.as_str().chars().all(|c| c.is_ascii_digit()));
}

#[test]
fn test_file_ref_serialization() {
    let file = FileRef::new("/tmp/a.txt", "a.txt", 5);
    let json = serde_json::to_string(&file).unwrap();
    let back: FileRef = serde_json::from_str(&json).unwrap();
    assert_eq!(back, file);
}

#[test]
fn test_error_messages() {
    assert_eq!(
        ArchivistError::NoActiveSession(OwnerId(9)).to_string(),
        "No active session for 9"
    );
    assert_eq!(ArchivistError::EmptyInput.to_string(), "No files to archive");
}
