use archivist_core::{ArchivistError, ArchivistResult};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

/// Copy buffer used while filling a part.
const COPY_BUFFER: u64 = 8 * 1024 * 1024;

/// Whether an artifact of `size` bytes has to be delivered in parts.
pub fn needs_split(size: u64, max_part_size: u64) -> bool {
    size > max_part_size
}

/// One contiguous slice of a split artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    /// `<artifact>.partN` next to the artifact.
    pub path: PathBuf,
    /// 1-based position in the sequence.
    pub index: u32,
    /// Name of the artifact this part was cut from.
    pub artifact_name: String,
    /// Bytes in this part; at most the part limit.
    pub size: u64,
}

/// Streams an artifact into `<artifact>.part1`, `<artifact>.part2`, ...
///
/// Parts are produced one at a time by [`PartSplitter::next_part`], so the
/// caller can deliver and delete each part before the next one is written.
/// Once the artifact is exhausted it is deleted and the sequence ends. The
/// sequence cannot be restarted.
pub struct PartSplitter {
    source: PathBuf,
    artifact_name: String,
    max_part_size: u64,
    reader: Option<File>,
    next_index: u32,
    finished: bool,
}

impl PartSplitter {
    pub fn new(artifact: impl Into<PathBuf>, max_part_size: u64) -> ArchivistResult<Self> {
        if max_part_size == 0 {
            return Err(ArchivistError::Config(
                "max part size must be greater than zero".into(),
            ));
        }
        let source = artifact.into();
        let artifact_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self {
            source,
            artifact_name,
            max_part_size,
            reader: None,
            next_index: 1,
            finished: false,
        })
    }

    /// Location of part `index` for `artifact`.
    pub fn part_path(artifact: &Path, index: u32) -> PathBuf {
        let mut name = artifact.as_os_str().to_owned();
        name.push(format!(".part{index}"));
        PathBuf::from(name)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Writes and returns the next part, or `None` once the artifact is
    /// exhausted (at which point the artifact has been deleted).
    ///
    /// After an error the sequence is over; the half-written part is
    /// removed and the artifact is left in place for the caller to purge.
    pub async fn next_part(&mut self) -> ArchivistResult<Option<Part>> {
        if self.finished {
            return Ok(None);
        }
        match self.write_next().await {
            Ok(Some(part)) => Ok(Some(part)),
            Ok(None) => {
                self.finished = true;
                self.reader = None;
                tokio::fs::remove_file(&self.source).await?;
                info!(
                    artifact = %self.artifact_name,
                    parts = self.next_index - 1,
                    "Artifact split complete"
                );
                Ok(None)
            }
            Err(e) => {
                self.finished = true;
                self.reader = None;
                Err(e)
            }
        }
    }

    async fn write_next(&mut self) -> ArchivistResult<Option<Part>> {
        if self.reader.is_none() {
            self.reader = Some(File::open(&self.source).await?);
        }
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };

        let max = self.max_part_size;
        let mut buf = vec![0u8; COPY_BUFFER.min(max) as usize];
        let first = reader.read(&mut buf).await?;
        if first == 0 {
            return Ok(None);
        }

        let index = self.next_index;
        let path = Self::part_path(&self.source, index);
        let written = match fill_part(reader, &path, &mut buf, first, max).await {
            Ok(written) => written,
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&path).await {
                    warn!(part = %path.display(), error = %rm, "Failed to remove partial part");
                }
                return Err(e.into());
            }
        };

        self.next_index += 1;
        debug!(artifact = %self.artifact_name, index, bytes = written, "Part written");
        Ok(Some(Part {
            path,
            index,
            artifact_name: self.artifact_name.clone(),
            size: written,
        }))
    }
}

/// Writes `buf[..first]` and then keeps copying until the part holds `max`
/// bytes or the reader is exhausted.
async fn fill_part(
    reader: &mut File,
    path: &Path,
    buf: &mut [u8],
    first: usize,
    max: u64,
) -> std::io::Result<u64> {
    let mut out = File::create(path).await?;
    out.write_all(&buf[..first]).await?;
    let mut written = first as u64;

    while written < max {
        let want = (buf.len() as u64).min(max - written) as usize;
        let n = reader.read(&mut buf[..want]).await?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n]).await?;
        written += n as u64;
    }
    out.flush().await?;
    Ok(written)
}
