//! Download requests and the attempt variants tried for each of them.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// What to keep from the remote media.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MediaKind {
    /// Audio track only, converted to mp3.
    Audio,
    /// Video stream without audio.
    VideoOnly,
    /// Video with its audio track.
    #[default]
    AudioVideo,
}

impl MediaKind {
    /// File extensions the extractor produces for this kind.
    ///
    /// The first entry is the preferred container; the rest come from the
    /// "any container" fallbacks in the format table.
    #[must_use]
    pub const fn output_extensions(self) -> &'static [&'static str] {
        match self {
            Self::Audio => &["mp3"],
            Self::VideoOnly | Self::AudioVideo => &["mp4", "webm", "mkv"],
        }
    }

    /// Returns true if `path` has one of this kind's output extensions.
    #[must_use]
    pub fn matches_output(self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                self.output_extensions()
                    .iter()
                    .any(|wanted| wanted.eq_ignore_ascii_case(ext))
            })
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Audio => "audio",
            Self::VideoOnly => "video only",
            Self::AudioVideo => "audio+video",
        })
    }
}

/// Which end of the available quality range to pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Quality {
    #[default]
    Highest,
    Lowest,
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Highest => "highest",
            Self::Lowest => "lowest",
        })
    }
}

/// A single item to fetch. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    url: String,
    kind: MediaKind,
    quality: Quality,
    destination: PathBuf,
    item_id: Option<String>,
    credential_file: Option<PathBuf>,
}

impl DownloadRequest {
    /// Creates a request with no item identifier and no credential file.
    #[must_use]
    pub fn new(
        url: impl Into<String>,
        kind: MediaKind,
        quality: Quality,
        destination: impl Into<PathBuf>,
    ) -> Self {
        Self {
            url: url.into(),
            kind,
            quality,
            destination: destination.into(),
            item_id: None,
            credential_file: None,
        }
    }

    /// Sets the stable item identifier reported by the extractor.
    #[must_use]
    pub fn with_item_id(mut self, id: impl Into<String>) -> Self {
        self.item_id = Some(id.into());
        self
    }

    /// Sets the credential file passed through to the extractor.
    #[must_use]
    pub fn with_credential_file(mut self, path: Option<PathBuf>) -> Self {
        self.credential_file = path;
        self
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub const fn kind(&self) -> MediaKind {
        self.kind
    }

    #[must_use]
    pub const fn quality(&self) -> Quality {
        self.quality
    }

    #[must_use]
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    #[must_use]
    pub fn item_id(&self) -> Option<&str> {
        self.item_id.as_deref()
    }

    #[must_use]
    pub fn credential_file(&self) -> Option<&Path> {
        self.credential_file.as_deref()
    }

    /// Short label for logs and progress bars.
    #[must_use]
    pub fn label(&self) -> &str {
        self.item_id.as_deref().unwrap_or(&self.url)
    }
}

/// One variant of extractor arguments tried for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptSpec {
    /// Pass the request's credential file.
    Credentialed,
    /// No credential file.
    Anonymous,
    /// No credential file, and ask the extractor for a different player client.
    AlternateClient(String),
}

impl fmt::Display for AttemptSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Credentialed => f.write_str("with credential file"),
            Self::Anonymous => f.write_str("without credential file"),
            Self::AlternateClient(client) => write!(f, "alternate client ({client})"),
        }
    }
}

/// Ordered list of attempt variants for one request.
///
/// The credentialed attempt comes first when the credential file can be
/// read, followed by an anonymous attempt; otherwise only the anonymous
/// attempt is planned. The alternate-client variant is appended last when
/// enabled, to recover from player/signature failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptPlan {
    specs: Vec<AttemptSpec>,
}

impl AttemptPlan {
    /// Builds the plan for `request`.
    ///
    /// `credentials_readable` is the result of probing the request's
    /// credential file; `alternate_client` names the player client for the
    /// final fallback, or `None` to leave it out.
    #[must_use]
    pub fn for_request(
        request: &DownloadRequest,
        credentials_readable: bool,
        alternate_client: Option<&str>,
    ) -> Self {
        let mut specs = Vec::with_capacity(3);
        if request.credential_file().is_some() && credentials_readable {
            specs.push(AttemptSpec::Credentialed);
        }
        specs.push(AttemptSpec::Anonymous);
        if let Some(client) = alternate_client {
            specs.push(AttemptSpec::AlternateClient(client.to_string()));
        }
        Self { specs }
    }

    #[must_use]
    pub fn specs(&self) -> &[AttemptSpec] {
        &self.specs
    }

    #[must_use]
    pub fn into_specs(self) -> Vec<AttemptSpec> {
        self.specs
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}
