//! Progress tracking from free-text extractor output.
//!
//! [`ProgressParser`] is the seam between the text heuristics and the rest
//! of the pipeline. [`TextProgressParser`] matches the lines yt-dlp prints
//! with `--newline`; a structured-output parser can replace it without
//! touching retry, staging or batch code.

use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::request::{AttemptSpec, DownloadRequest, MediaKind};

/// A progress line: the percentage leads, after an optional `[tag]`.
static PERCENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:\[[^\]]+\]\s*)?(\d+(?:\.\d+)?)\s*%").expect("valid regex")
});

static RATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?\s?(?:[KMGT]i?)?B/s)").expect("valid regex")
});

/// Extensions yt-dlp uses for audio-only streams.
const AUDIO_STREAM_EXTENSIONS: &[&str] = &[".m4a", ".mp3", ".opus", ".ogg", ".aac", ".wav", ".flac"];

/// Stage of a single extractor run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Starting,
    DownloadingVideo,
    DownloadingAudio,
    Merging,
    Converting,
    CleaningUp,
    Complete,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Starting => "starting",
            Self::DownloadingVideo => "downloading video",
            Self::DownloadingAudio => "downloading audio",
            Self::Merging => "merging",
            Self::Converting => "converting",
            Self::CleaningUp => "cleaning up",
            Self::Complete => "complete",
        })
    }
}

/// Snapshot of one attempt's progress.
///
/// Percent never decreases within a phase; it restarts at zero when the
/// phase changes.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressState {
    pub phase: Phase,
    /// Percent complete in `[0, 100]`.
    pub percent: f64,
    /// Throughput as printed by the extractor, e.g. `1.20MiB/s`.
    pub throughput: Option<String>,
    pub last_updated: DateTime<Utc>,
}

impl Default for ProgressState {
    fn default() -> Self {
        Self {
            phase: Phase::Starting,
            percent: 0.0,
            throughput: None,
            last_updated: Utc::now(),
        }
    }
}

impl ProgressState {
    fn set_phase(&mut self, phase: Phase) -> bool {
        if self.phase == phase {
            return false;
        }
        self.phase = phase;
        self.percent = 0.0;
        self.throughput = None;
        true
    }

    fn set_percent(&mut self, percent: f64) -> bool {
        let clamped = percent.clamp(0.0, 100.0);
        if clamped > self.percent {
            self.percent = clamped;
            true
        } else {
            false
        }
    }
}

/// Turns extractor output lines into [`ProgressState`] updates.
pub trait ProgressParser: Send {
    /// Feeds one line. Returns true if the state changed.
    ///
    /// Unrecognised lines are ignored.
    fn feed(&mut self, line: &str) -> bool;

    /// Current state.
    fn state(&self) -> &ProgressState;

    /// Marks the run as finished.
    fn finish(&mut self);
}

/// Regex and substring heuristics for yt-dlp's human-readable output.
///
/// The media kind decides what a `Destination:` line means. Audio runs
/// only ever fetch audio, video-only runs only video, and audio+video runs
/// fetch the video stream first and the audio stream second.
#[derive(Debug, Default)]
pub struct TextProgressParser {
    kind: Option<MediaKind>,
    streams: usize,
    state: ProgressState,
}

impl TextProgressParser {
    /// Creates a parser in the `Starting` phase that guesses stream types
    /// from file extensions alone.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a parser for a run fetching `kind`.
    #[must_use]
    pub fn for_kind(kind: MediaKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    /// Detects a phase transition from literal markers in `line`.
    ///
    /// Stream destinations are classified by extension only; see
    /// [`for_kind`](Self::for_kind) for kind-aware parsing.
    #[must_use]
    pub fn detect_phase(line: &str) -> Option<Phase> {
        if let Some(dest) = download_destination(line) {
            return Some(if is_audio_stream(dest) {
                Phase::DownloadingAudio
            } else {
                Phase::DownloadingVideo
            });
        }
        if line.contains("Deleting original") {
            return Some(Phase::CleaningUp);
        }
        if line.contains("[Merger]") || line.contains("Merging") {
            return Some(Phase::Merging);
        }
        if line.contains("[ExtractAudio]")
            || line.contains("Extracting audio")
            || line.contains("Converting")
            || line.contains("[VideoConvertor]")
        {
            return Some(Phase::Converting);
        }
        if line.contains("Downloading") {
            let lower = line.to_ascii_lowercase();
            if lower.contains("audio") {
                return Some(Phase::DownloadingAudio);
            }
            if lower.contains("video") {
                return Some(Phase::DownloadingVideo);
            }
        }
        None
    }

    /// Extracts the leading `NN.N%` value from a progress line.
    ///
    /// Percent signs elsewhere, such as in a file name, are ignored.
    #[must_use]
    pub fn extract_percent(line: &str) -> Option<f64> {
        PERCENT_RE
            .captures(line)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }

    /// Extracts a byte-rate token such as `1.20MiB/s`.
    #[must_use]
    pub fn extract_throughput(line: &str) -> Option<String> {
        RATE_RE
            .captures(line)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    }

    fn stream_phase(&mut self, dest: &str) -> Phase {
        let index = self.streams;
        self.streams += 1;
        match self.kind {
            Some(MediaKind::Audio) => Phase::DownloadingAudio,
            Some(MediaKind::VideoOnly) => Phase::DownloadingVideo,
            _ if is_audio_stream(dest) => Phase::DownloadingAudio,
            Some(MediaKind::AudioVideo) if index > 0 => Phase::DownloadingAudio,
            _ => Phase::DownloadingVideo,
        }
    }
}

/// The file named by a `[download] Destination:` line.
fn download_destination(line: &str) -> Option<&str> {
    line.trim_start()
        .strip_prefix("[download]")?
        .trim_start()
        .strip_prefix("Destination:")
        .map(str::trim)
}

fn is_audio_stream(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    AUDIO_STREAM_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

impl ProgressParser for TextProgressParser {
    fn feed(&mut self, line: &str) -> bool {
        let mut changed = false;
        let phase = match download_destination(line) {
            Some(dest) => Some(self.stream_phase(dest)),
            None => Self::detect_phase(line),
        };
        if let Some(phase) = phase {
            changed |= self.state.set_phase(phase);
        }
        if let Some(percent) = Self::extract_percent(line) {
            changed |= self.state.set_percent(percent);
            if let Some(rate) = Self::extract_throughput(line)
                && self.state.throughput.as_deref() != Some(rate.as_str())
            {
                self.state.throughput = Some(rate);
                changed = true;
            }
        }
        if changed {
            self.state.last_updated = Utc::now();
        }
        changed
    }

    fn state(&self) -> &ProgressState {
        &self.state
    }

    fn finish(&mut self) {
        self.state.phase = Phase::Complete;
        self.state.percent = 100.0;
        self.state.last_updated = Utc::now();
    }
}

/// Receives pipeline events for display.
///
/// All methods have default no-op implementations.
pub trait DownloadProgress: Send + Sync {
    /// Called before each attempt for a request.
    fn on_attempt_start(&self, _request: &DownloadRequest, _attempt: usize, _spec: &AttemptSpec) {}

    /// Called whenever the attempt's progress state changes.
    fn on_progress(&self, _request: &DownloadRequest, _state: &ProgressState) {}

    /// Called when an attempt fails and another one may follow.
    fn on_attempt_failed(&self, _request: &DownloadRequest, _attempt: usize, _message: &str) {}

    /// Called once per request when its outcome is known.
    fn on_finished(&self, _request: &DownloadRequest, _succeeded: bool, _detail: &str) {}

    /// Called before each batch item, with its 1-based position.
    fn on_item_start(&self, _position: usize, _total: usize, _title: &str) {}
}

/// A null progress implementation that ignores all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl DownloadProgress for NoProgress {}
