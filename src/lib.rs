//! reel-dl - A library for downloading media through yt-dlp.
//!
//! This library drives an external extractor one item at a time: it builds
//! the argument vector for each attempt, streams the process output into a
//! progress state, falls back through alternative attempt variants, and
//! promotes finished files from a private staging directory into the
//! destination. Display is left to the caller through [`DownloadProgress`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use reel_dl::{AppConfig, DownloadProgress, Downloader, NoProgress, Selection, TokioLauncher};
//!
//! # async fn example() -> reel_dl::Result<()> {
//! let config = AppConfig::load()?;
//! let downloader = Downloader::new(config, TokioLauncher::new());
//! downloader.staging().prepare(downloader.fs()).await?;
//!
//! let progress: Arc<dyn DownloadProgress> = Arc::new(NoProgress);
//!
//! // A single item
//! let dest = downloader.config().paths.download_dir.clone();
//! let request = downloader.request_for("https://youtu.be/dQw4w9WgXcQ", &dest, None);
//! let outcome = downloader.download(&request, &progress).await?;
//! println!("Delivered: {}", outcome.is_success());
//!
//! // A whole collection
//! let playlist = downloader
//!     .fetch_playlist("https://www.youtube.com/playlist?list=PL...")
//!     .await?;
//! let result = downloader.download_all(&playlist, &Selection::All, &progress).await?;
//! println!("{} of {} downloaded", result.successful, result.total());
//!
//! downloader.staging().wipe(downloader.fs()).await?;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod args;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod format;
pub mod fs;
pub mod playlist;
pub mod process;
pub mod progress;
pub mod request;
pub mod retry;
pub mod staging;
pub mod stats;
pub mod tools;
pub mod url;

// Re-export main types for convenience
pub use config::{AppConfig, DownloadConfig, PathConfig, ToolConfig};
pub use download::{DownloadFailure, DownloadOutcome, Downloader};
pub use error::{Error, Result};
pub use fs::{FileSystem, TokioFileSystem};
pub use playlist::{MediaInfo, Playlist, PlaylistEntry, Selection};
pub use process::{ExitReport, LaunchCommand, Launcher, TokioLauncher};
pub use progress::{
    DownloadProgress, NoProgress, Phase, ProgressParser, ProgressState, TextProgressParser,
};
pub use request::{AttemptPlan, AttemptSpec, DownloadRequest, MediaKind, Quality};
pub use retry::{AttemptFailure, RetryController};
pub use stats::BatchResult;
