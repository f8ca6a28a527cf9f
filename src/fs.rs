//! File system abstraction for testability.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// File system operations needed by staging and credential checks.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Returns true if `path` is a regular file that can be opened for reading.
    async fn is_readable_file(&self, path: &Path) -> bool;

    /// Creates all directories in the given path.
    async fn create_dir_all(&self, path: &Path) -> std::io::Result<()>;

    /// Lists the regular files directly inside `dir`, sorted by path.
    async fn list_files(&self, dir: &Path) -> std::io::Result<Vec<PathBuf>>;

    /// Copies `from` to `to`, overwriting `to`.
    async fn copy_file(&self, from: &Path, to: &Path) -> std::io::Result<()>;

    /// Moves `from` to `to` on the same file system.
    async fn rename(&self, from: &Path, to: &Path) -> std::io::Result<()>;

    /// Removes `dir` and everything below it. A missing directory is not an error.
    async fn remove_dir_all(&self, dir: &Path) -> std::io::Result<()>;
}

/// Default file system implementation using `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioFileSystem;

impl TokioFileSystem {
    /// Creates a new `TokioFileSystem` instance.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FileSystem for TokioFileSystem {
    async fn is_readable_file(&self, path: &Path) -> bool {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => tokio::fs::File::open(path).await.is_ok(),
            _ => false,
        }
    }

    async fn create_dir_all(&self, path: &Path) -> std::io::Result<()> {
        tokio::fs::create_dir_all(path).await
    }

    async fn list_files(&self, dir: &Path) -> std::io::Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }

    async fn copy_file(&self, from: &Path, to: &Path) -> std::io::Result<()> {
        tokio::fs::copy(from, to).await.map(|_| ())
    }

    async fn rename(&self, from: &Path, to: &Path) -> std::io::Result<()> {
        tokio::fs::rename(from, to).await
    }

    async fn remove_dir_all(&self, dir: &Path) -> std::io::Result<()> {
        match tokio::fs::remove_dir_all(dir).await {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}
