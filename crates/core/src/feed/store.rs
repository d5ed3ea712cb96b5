//! Feed files on disk.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Failed to create directory: {path}")]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read feed file: {path}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write feed file: {path}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move {from} into place at {to}")]
    RenameFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Directory holding the per-source snapshots and the aggregate feed.
///
/// Writes go to a sibling temp file which is then renamed over the target,
/// so readers only ever see a complete document.
#[derive(Debug, Clone)]
pub struct FeedStore {
    dir: PathBuf,
}

impl FeedStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, filename: &str) -> PathBuf {
        self.dir.join(filename)
    }

    /// Read a feed file. A missing file is `Ok(None)`.
    pub async fn read(&self, filename: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
        let path = self.path(filename);
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(PersistenceError::ReadFailed { path, source }),
        }
    }

    /// Replace `filename` with `contents` in one rename.
    pub async fn write_atomic(&self, filename: &str, contents: &str) -> Result<(), PersistenceError> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| PersistenceError::DirectoryCreationFailed {
                path: self.dir.clone(),
                source,
            })?;

        let target = self.path(filename);
        let temp = self.dir.join(format!(".{}.tmp", filename));

        if let Err(source) = write_synced(&temp, contents.as_bytes()).await {
            let _ = fs::remove_file(&temp).await;
            return Err(PersistenceError::WriteFailed { path: temp, source });
        }

        if let Err(source) = fs::rename(&temp, &target).await {
            let _ = fs::remove_file(&temp).await;
            return Err(PersistenceError::RenameFailed {
                from: temp,
                to: target,
                source,
            });
        }

        tracing::debug!(path = %target.display(), bytes = contents.len(), "Feed file written");
        Ok(())
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}
