//! Configuration types for download operations.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::request::{MediaKind, Quality};

/// Environment variable that points at an alternate config file.
pub const CONFIG_ENV: &str = "REEL_DL_CONFIG";

/// Defaults applied to every download request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Media kind used when none is requested explicitly.
    pub kind: MediaKind,
    /// Quality used when none is requested explicitly.
    pub quality: Quality,
    /// Whether to append the alternate-client fallback attempt.
    pub alternate_client: bool,
    /// Player client requested by the alternate-client attempt.
    pub player_client: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            kind: MediaKind::AudioVideo,
            quality: Quality::Highest,
            alternate_client: true,
            player_client: "android".to_string(),
        }
    }
}

impl DownloadConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default media kind.
    #[must_use]
    pub const fn with_kind(mut self, kind: MediaKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the default quality.
    #[must_use]
    pub const fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    /// Sets whether the alternate-client fallback is attempted.
    #[must_use]
    pub const fn with_alternate_client(mut self, enabled: bool) -> Self {
        self.alternate_client = enabled;
        self
    }

    /// Player client for the fallback attempt, if it is enabled.
    #[must_use]
    pub fn fallback_client(&self) -> Option<&str> {
        self.alternate_client.then_some(self.player_client.as_str())
    }
}

/// Filesystem locations used by the downloader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    /// Directory where finished downloads are placed.
    pub download_dir: PathBuf,
    /// Private directory holding per-attempt staging directories.
    pub temp_root: PathBuf,
    /// Optional credential file handed to the extractor.
    pub credential_file: Option<PathBuf>,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            download_dir: dirs::download_dir().unwrap_or_else(|| PathBuf::from(".")),
            temp_root: std::env::temp_dir().join("reel-dl"),
            credential_file: None,
        }
    }
}

/// External binaries, either bare names looked up on `PATH` or explicit paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Media extractor (yt-dlp compatible).
    pub extractor: PathBuf,
    /// Transcoder used by the extractor for merging and conversion.
    pub transcoder: PathBuf,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            extractor: PathBuf::from("yt-dlp"),
            transcoder: PathBuf::from("ffmpeg"),
        }
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Download defaults.
    pub download: DownloadConfig,
    /// Path configuration.
    pub paths: PathConfig,
    /// External tool locations.
    pub tools: ToolConfig,
}

impl AppConfig {
    /// Creates a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Default location of the config file.
    ///
    /// Uses `REEL_DL_CONFIG` when set, falling back to
    /// `$XDG_CONFIG_HOME/reel-dl/config.toml`.
    #[must_use]
    pub fn default_path() -> PathBuf {
        std::env::var_os(CONFIG_ENV).map_or_else(
            || {
                dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("reel-dl")
                    .join("config.toml")
            },
            PathBuf::from,
        )
    }

    /// Loads configuration from the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> crate::Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Loads configuration from `path`. A missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> crate::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::parse(&text)
                .map_err(|e| crate::Error::Config(format!("{}: {e}", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No config file at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(crate::Error::Config(format!("{}: {e}", path.display()))),
        }
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns the TOML error message if the text is malformed.
    pub fn parse(text: &str) -> std::result::Result<Self, String> {
        toml::from_str(text).map_err(|e| e.to_string())
    }
}
