use archivist_core::{ArchivistError, ArchivistResult, FileRef};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;
use zip::write::FileOptions;
use zip::{AesMode, CompressionMethod, ZipWriter};

/// Entries at or above this size need zip64 headers.
const ZIP64_THRESHOLD: u64 = u32::MAX as u64;

/// A built archive on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Location in the session's staging directory.
    pub path: PathBuf,
    /// File name the artifact is delivered under.
    pub name: String,
    /// Size on disk in bytes.
    pub size: u64,
    /// Whether entries are AES-encrypted.
    pub encrypted: bool,
    /// Number of entries written.
    pub entries: usize,
}

/// Builds zip artifacts from staged files.
///
/// Entries are deflate-compressed and stored under their base name. With a
/// password every entry is encrypted with WinZip AES-256.
#[derive(Debug, Clone, Default)]
pub struct ArchiveBuilder;

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Builds the archive at `dest`.
    ///
    /// The archive is written next to `dest` under a temporary name and
    /// renamed into place once complete. Any failure removes the temporary
    /// file, so no partial artifact is ever left at `dest`. Input files are
    /// never deleted.
    pub async fn build(
        &self,
        files: &[FileRef],
        password: Option<&str>,
        dest: &Path,
    ) -> ArchivistResult<Artifact> {
        if files.is_empty() {
            return Err(ArchivistError::EmptyInput);
        }

        let name = dest
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ArchivistError::InvalidName(dest.display().to_string()))?
            .to_string();
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let partial = dest.with_file_name(format!(".{name}.{}.partial", Uuid::new_v4()));
        let password = password.filter(|p| !p.is_empty()).map(str::to_string);
        let encrypted = password.is_some();

        let job = {
            let files = files.to_vec();
            let partial = partial.clone();
            tokio::task::spawn_blocking(move || {
                write_archive(&partial, &files, password.as_deref())
            })
        };
        let written = match job.await {
            Ok(result) => result,
            Err(e) => Err(ArchivistError::Archive(format!("archive task failed: {e}"))),
        };

        let finished = match written {
            Ok(entries) => tokio::fs::rename(&partial, dest)
                .await
                .map(|()| entries)
                .map_err(ArchivistError::from),
            Err(e) => Err(e),
        };
        let entries = match finished {
            Ok(entries) => entries,
            Err(e) => {
                discard(&partial).await;
                warn!(artifact = %name, error = %e, "Archive build failed");
                return Err(e);
            }
        };

        let size = tokio::fs::metadata(dest).await?.len();
        info!(artifact = %name, entries, bytes = size, encrypted, "Archive built");
        Ok(Artifact {
            path: dest.to_path_buf(),
            name,
            size,
            encrypted,
            entries,
        })
    }
}

/// Name an entry is stored under: the base name only.
fn entry_name(file: &FileRef) -> String {
    Path::new(&file.stored_name)
        .file_name()
        .map_or_else(|| file.stored_name.clone(), |n| n.to_string_lossy().into_owned())
}

fn archive_error(e: zip::result::ZipError) -> ArchivistError {
    match e {
        zip::result::ZipError::Io(io) => ArchivistError::Io(io),
        other => ArchivistError::Archive(other.to_string()),
    }
}

fn write_archive(path: &Path, files: &[FileRef], password: Option<&str>) -> ArchivistResult<usize> {
    let out = std::fs::File::create(path)?;
    let mut zip = ZipWriter::new(BufWriter::new(out));

    for file in files {
        let mut options: FileOptions<'_, ()> = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .large_file(file.size >= ZIP64_THRESHOLD);
        if let Some(password) = password {
            options = options.with_aes_encryption(AesMode::Aes256, password);
        }

        // Open before starting the entry so a missing input fails cleanly.
        let mut input = std::fs::File::open(&file.path)?;
        zip.start_file(entry_name(file), options)
            .map_err(archive_error)?;
        std::io::copy(&mut input, &mut zip)?;
    }

    let mut out = zip.finish().map_err(archive_error)?;
    out.flush()?;
    out.get_ref().sync_all()?;
    Ok(files.len())
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove partial artifact");
        }
    }
}
