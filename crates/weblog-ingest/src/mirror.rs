//! Append-only copy of matched raw lines
//!
//! The file is not touched until the first matched line arrives, so a run
//! that matches nothing leaves no empty file behind.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info};

use crate::error::{IngestError, Result};

/// Directory used when no mirror location is configured
pub const DEFAULT_MIRROR_DIR: &str = "./logs";

/// Mirror file name for a run started at `now`: `log_file_DD_MM_YY_HH_MM.log`
pub fn mirror_file_name(now: DateTime<Utc>) -> String {
    format!("log_file_{}.log", now.format("%d_%m_%y_%H_%M"))
}

/// Lazily opened, append-mode mirror file
#[derive(Debug)]
pub struct RawLineMirror {
    path: PathBuf,
    file: Option<BufWriter<File>>,
    lines_written: usize,
}

impl RawLineMirror {
    /// Mirror into an explicit file path
    pub fn to_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
            lines_written: 0,
        }
    }

    /// Mirror into a generated file name under `dir`
    pub fn in_dir(dir: impl AsRef<Path>, now: DateTime<Utc>) -> Self {
        Self::to_path(dir.as_ref().join(mirror_file_name(now)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lines_written(&self) -> usize {
        self.lines_written
    }

    /// Append one raw line, opening the file on first use
    pub async fn write_line(&mut self, line: &str) -> Result<()> {
        let path = self.path.clone();
        let to_err = |source| IngestError::Mirror {
            path: path.clone(),
            source,
        };

        let file = match self.file.take() {
            Some(file) => file,
            None => open_append(&self.path).await.map_err(to_err)?,
        };
        let file = self.file.insert(file);

        file.write_all(line.as_bytes()).await.map_err(to_err)?;
        file.write_all(b"\n").await.map_err(to_err)?;
        self.lines_written += 1;
        Ok(())
    }

    /// Flush and close the file if it was ever opened
    pub async fn close(mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush().await.map_err(|source| IngestError::Mirror {
                path: self.path.clone(),
                source,
            })?;
            info!(path = %self.path.display(), lines = self.lines_written, "Mirror file closed");
        }
        Ok(())
    }
}

async fn open_append(path: &Path) -> std::io::Result<BufWriter<File>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let file = OpenOptions::new().create(true).append(true).open(path).await?;
    debug!(path = %path.display(), "Opened mirror file");
    Ok(BufWriter::new(file))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_mirror_file_name() {
        let now = Utc.with_ymd_and_hms(2021, 3, 7, 9, 5, 0).unwrap();
        assert_eq!(mirror_file_name(now), "log_file_07_03_21_09_05.log");
    }

    #[tokio::test]
    async fn test_file_is_created_lazily_with_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("mirror").join("nested");
        let now = Utc.with_ymd_and_hms(2021, 3, 7, 9, 5, 0).unwrap();

        let mut mirror = RawLineMirror::in_dir(&nested, now);
        assert!(!nested.exists());

        mirror.write_line("first").await.unwrap();
        mirror.write_line("second").await.unwrap();
        let path = mirror.path().to_path_buf();
        mirror.close().await.unwrap();

        assert_eq!(path, nested.join("log_file_07_03_21_09_05.log"));
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "first\nsecond\n");
    }

    #[tokio::test]
    async fn test_appends_to_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mirror.log");
        tokio::fs::write(&path, "earlier\n").await.unwrap();

        let mut mirror = RawLineMirror::to_path(&path);
        mirror.write_line("later").await.unwrap();
        mirror.close().await.unwrap();

        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "earlier\nlater\n");
    }

    #[tokio::test]
    async fn test_unused_mirror_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("never.log");

        RawLineMirror::to_path(&path).close().await.unwrap();
        assert!(!path.exists());
    }
}
