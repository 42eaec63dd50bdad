// Durable local buffer: one newline-terminated JSON Sample per line.
// Records are self-contained, so appends never rewrite earlier lines and a torn
// trailing write is simply skipped on read.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use tokio::fs::OpenOptions;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::instrument;

use crate::models::Sample;

pub struct LocalBuffer {
    path: PathBuf,
}

impl LocalBuffer {
    /// Opens (creating if missing) the buffer file. If a previous run crashed mid-append and
    /// left an unterminated line, a newline is written so the next record starts cleanly.
    pub async fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .await?;
        let len = file.metadata().await?.len();
        if len > 0 {
            file.seek(SeekFrom::End(-1)).await?;
            let mut last = [0u8; 1];
            file.read_exact(&mut last).await?;
            if last[0] != b'\n' {
                tracing::warn!(
                    path = %path.display(),
                    "buffer ends in a partial record; terminating it"
                );
                file.write_all(b"\n").await?;
                file.flush().await?;
            }
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one record with a single write of `json + '\n'`.
    #[instrument(skip(self, sample), fields(buffer = "local", operation = "append"))]
    pub async fn append(&self, sample: &Sample) -> anyhow::Result<()> {
        let mut line = serde_json::to_vec(sample)?;
        line.push(b'\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        file.sync_data().await?;
        Ok(())
    }

    /// All well-formed records in append order. Malformed or invalid lines are skipped.
    #[instrument(skip(self), fields(buffer = "local", operation = "read_all"))]
    pub async fn read_all(&self) -> anyhow::Result<Vec<Sample>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(parse_records(&bytes))
    }

    /// Truncates the buffer. Only call after the drained records were persisted.
    #[instrument(skip(self), fields(buffer = "local", operation = "clear"))]
    pub async fn clear(&self) -> anyhow::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)
            .await?;
        file.sync_all().await?;
        Ok(())
    }
}

/// Splits on '\n' and parses each terminated line. The segment after the last newline
/// (if any) is an in-flight or torn write and is never returned.
fn parse_records(bytes: &[u8]) -> Vec<Sample> {
    let mut out = Vec::new();
    let mut skipped: usize = 0;
    let mut rest = bytes;
    while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
        let line = &rest[..pos];
        rest = &rest[pos + 1..];
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        match serde_json::from_slice::<Sample>(line) {
            Ok(sample) => match sample.validate() {
                Ok(()) => out.push(sample),
                Err(e) => {
                    tracing::debug!(error = %e, "buffer record failed validation");
                    skipped += 1;
                }
            },
            Err(e) => {
                tracing::debug!(error = %e, "buffer record failed to parse");
                skipped += 1;
            }
        }
    }
    if !rest.is_empty() {
        skipped += 1;
    }
    if skipped > 0 {
        tracing::warn!(
            operation = "read_all",
            records = out.len(),
            skipped,
            "skipped malformed buffer records"
        );
    }
    out
}
