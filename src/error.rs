//! Error types for the reel-dl library.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while orchestrating downloads.
///
/// A nonzero extractor exit is not an error at this level: it is reported
/// as an [`ExitReport`](crate::process::ExitReport) and classified by the
/// retry controller.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An external binary could not be started.
    #[error("failed to launch {program}: {source}")]
    Launch {
        /// Program that was being spawned.
        program: String,
        /// Underlying spawn error.
        #[source]
        source: std::io::Error,
    },

    /// Metadata output from the extractor was not valid structured text.
    #[error("invalid metadata output: {0}")]
    Metadata(String),

    /// JSON decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Promotion of a finished download into the destination failed.
    ///
    /// The staged files are left in `temp_dir` so they are not lost.
    #[error("could not move download into place, files kept in {}: {source}", temp_dir.display())]
    Staging {
        /// Staging directory that still holds the downloaded files.
        temp_dir: PathBuf,
        /// Underlying copy error.
        #[source]
        source: std::io::Error,
    },

    /// The supplied URL is malformed.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// A required external tool is not installed.
    #[error("{tool} not found; install it or set its path in the config file")]
    ToolMissing {
        /// Name or path of the missing tool.
        tool: String,
    },

    /// Configuration file could not be read or parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// Operation was interrupted.
    #[error("download cancelled")]
    Cancelled,
}

/// A specialized `Result` type for reel-dl operations.
pub type Result<T> = std::result::Result<T, Error>;
