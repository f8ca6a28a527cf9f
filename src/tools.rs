//! Locating and probing the external extractor and transcoder.

use std::path::{Path, PathBuf};

use crate::config::ToolConfig;
use crate::error::{Error, Result};
use crate::process::{LaunchCommand, Launcher, capture_stdout};

/// The external programs the downloader drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Extractor,
    Transcoder,
}

impl Tool {
    const fn version_flag(self) -> &'static str {
        match self {
            Self::Extractor => "--version",
            Self::Transcoder => "-version",
        }
    }
}

/// Resolves a configured tool to an executable path.
///
/// Bare names are looked up on `PATH`; anything containing a path separator
/// is used as given if it exists.
#[must_use]
pub fn locate(configured: &Path) -> Option<PathBuf> {
    if configured.components().count() > 1 || configured.is_absolute() {
        return configured.is_file().then(|| configured.to_path_buf());
    }
    which::which(configured).ok()
}

/// Runs the tool's version command and returns the first line it prints.
///
/// # Errors
///
/// Returns [`Error::Launch`] if the program cannot be started or
/// [`Error::Metadata`] if it exits unsuccessfully.
pub async fn probe_version<L: Launcher + ?Sized>(
    launcher: &L,
    program: &Path,
    tool: Tool,
) -> Result<String> {
    let command = LaunchCommand::new(program, vec![tool.version_flag().to_string()]);
    let stdout = capture_stdout(launcher, &command).await?;
    Ok(stdout.lines().next().unwrap_or_default().trim().to_string())
}

/// Confirms the extractor is installed and runnable.
///
/// # Errors
///
/// Returns [`Error::ToolMissing`] if it cannot be found or started.
pub async fn require_extractor<L: Launcher + ?Sized>(
    launcher: &L,
    tools: &ToolConfig,
) -> Result<PathBuf> {
    let missing = || Error::ToolMissing {
        tool: tools.extractor.display().to_string(),
    };
    let path = locate(&tools.extractor).ok_or_else(missing)?;
    match probe_version(launcher, &path, Tool::Extractor).await {
        Ok(version) => {
            log::info!("Using {} {version}", path.display());
            Ok(path)
        }
        Err(Error::Launch { .. }) => Err(missing()),
        Err(e) => {
            // Runs but reports an error; let the download attempts surface it.
            log::warn!("{} --version failed: {e}", path.display());
            Ok(path)
        }
    }
}

/// Looks for the transcoder. Its absence only produces a warning.
pub async fn check_transcoder<L: Launcher + ?Sized>(
    launcher: &L,
    tools: &ToolConfig,
) -> Option<PathBuf> {
    let Some(path) = locate(&tools.transcoder) else {
        log::warn!(
            "{} not found: merging formats and audio conversion will fail",
            tools.transcoder.display()
        );
        return None;
    };
    match probe_version(launcher, &path, Tool::Transcoder).await {
        Ok(version) => {
            log::debug!("Transcoder: {version}");
            Some(path)
        }
        Err(e) => {
            log::warn!("{} is not usable: {e}", path.display());
            None
        }
    }
}
