//! Per-attempt staging directories and promotion into the destination.
//!
//! Every attempt writes into its own directory under the staging root.
//! [`StagingDir`] removes that directory when dropped unless it has been
//! promoted, discarded or explicitly kept, so early returns, cancellation
//! and unwinding all take the same cleanup path. Stages kept after a failed
//! promotion are moved next to the root by [`StagingArea::preserve`].

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::fs::FileSystem;
use crate::request::MediaKind;

/// The process-wide staging root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Clears anything left from an earlier run and recreates the root.
    ///
    /// # Errors
    ///
    /// Returns an error if the root cannot be removed or created.
    pub async fn prepare<F: FileSystem + ?Sized>(&self, fs: &F) -> Result<()> {
        fs.remove_dir_all(&self.root).await?;
        fs.create_dir_all(&self.root).await?;
        log::debug!("Staging root ready at {}", self.root.display());
        Ok(())
    }

    /// Removes the root and everything in it.
    ///
    /// # Errors
    ///
    /// Returns an error if the root exists but cannot be removed.
    pub async fn wipe<F: FileSystem + ?Sized>(&self, fs: &F) -> Result<()> {
        fs.remove_dir_all(&self.root).await?;
        Ok(())
    }

    /// Sibling of the root holding stages kept after a failed promotion.
    ///
    /// Neither [`prepare`](Self::prepare) nor [`wipe`](Self::wipe) touches it.
    #[must_use]
    pub fn kept_root(&self) -> PathBuf {
        let name = self
            .root
            .file_name()
            .map_or_else(|| "staging".to_string(), |n| n.to_string_lossy().into_owned());
        self.root.with_file_name(format!("{name}-kept"))
    }

    /// Moves a kept stage out of the root so it outlives [`wipe`](Self::wipe).
    ///
    /// Returns the new location, or `dir` itself if the move failed.
    pub async fn preserve<F: FileSystem + ?Sized>(&self, fs: &F, dir: &Path) -> PathBuf {
        let Some(name) = dir.file_name() else {
            return dir.to_path_buf();
        };
        let kept = self.kept_root();
        let target = kept.join(name);
        let moved = match fs.create_dir_all(&kept).await {
            Ok(()) => fs.rename(dir, &target).await,
            Err(e) => Err(e),
        };
        match moved {
            Ok(()) => {
                log::error!("Promotion failed, files kept in {}", target.display());
                target
            }
            Err(e) => {
                log::error!(
                    "Promotion failed, files left in {} (could not move them: {e})",
                    dir.display()
                );
                dir.to_path_buf()
            }
        }
    }

    /// Creates a fresh directory for one attempt.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub async fn create_dir<F: FileSystem + ?Sized>(
        &self,
        fs: &F,
        label: Option<&str>,
    ) -> Result<StagingDir> {
        let name = format!(
            "{}-{}",
            sanitize_label(label.unwrap_or("item")),
            uuid::Uuid::new_v4().simple()
        );
        let path = self.root.join(name);
        fs.create_dir_all(&path).await?;
        Ok(StagingDir { path, armed: true })
    }
}

/// Keeps only characters that are safe in a directory name.
fn sanitize_label(label: &str) -> String {
    let cleaned: String = label
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
        .take(40)
        .collect();
    if cleaned.is_empty() {
        "item".to_string()
    } else {
        cleaned
    }
}

/// One attempt's private output directory.
#[derive(Debug)]
pub struct StagingDir {
    path: PathBuf,
    armed: bool,
}

impl StagingDir {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copies every file matching `kind` into `destination`, then removes
    /// the staging directory.
    ///
    /// Returns the promoted paths, which may be empty if the extractor left
    /// nothing matching. Copies are not transactional: if one fails, files
    /// already copied stay in `destination`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Staging`] if the destination cannot be created or a
    /// copy fails. In that case the staging directory is kept and its path
    /// is carried in the error.
    pub async fn promote<F: FileSystem + ?Sized>(
        mut self,
        fs: &F,
        destination: &Path,
        kind: MediaKind,
    ) -> Result<Vec<PathBuf>> {
        let files = match fs.list_files(&self.path).await {
            Ok(files) => files,
            Err(source) => return Err(self.keep_with(source)),
        };
        let matching: Vec<_> = files.into_iter().filter(|f| kind.matches_output(f)).collect();

        let mut promoted = Vec::with_capacity(matching.len());
        if !matching.is_empty() {
            if let Err(source) = fs.create_dir_all(destination).await {
                return Err(self.keep_with(source));
            }
            for file in &matching {
                let Some(name) = file.file_name() else { continue };
                let target = destination.join(name);
                if let Err(source) = fs.copy_file(file, &target).await {
                    return Err(self.keep_with(source));
                }
                log::info!("Saved {}", target.display());
                promoted.push(target);
            }
        } else {
            log::warn!(
                "No {} output found in {}",
                kind.output_extensions().join("/"),
                self.path.display()
            );
        }

        self.discard_in_place(fs).await;
        Ok(promoted)
    }

    /// Removes the staging directory now.
    pub async fn discard<F: FileSystem + ?Sized>(mut self, fs: &F) {
        self.discard_in_place(fs).await;
    }

    /// Disarms cleanup and returns the path, leaving the files on disk.
    #[must_use]
    pub fn keep(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }

    fn keep_with(self, source: std::io::Error) -> Error {
        let temp_dir = self.keep();
        log::debug!("Keeping {} after: {source}", temp_dir.display());
        Error::Staging { temp_dir, source }
    }

    async fn discard_in_place<F: FileSystem + ?Sized>(&mut self, fs: &F) {
        if let Err(e) = fs.remove_dir_all(&self.path).await {
            log::warn!("Could not remove {}: {e}", self.path.display());
            // Leave armed so Drop gets a second try.
            return;
        }
        self.armed = false;
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_dir_all(&self.path);
        }
    }
}
