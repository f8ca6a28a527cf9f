//! Extractor argument vectors.
//!
//! Everything here is a pure function of its inputs: the caller decides
//! whether a credential file is usable before asking for arguments.

use std::path::Path;

use crate::request::{AttemptSpec, DownloadRequest, MediaKind, Quality};

/// Output file name template, relative to the staging directory.
pub const OUTPUT_TEMPLATE: &str = "%(title)s [%(id)s].%(ext)s";

/// Format-selection expression for a (kind, quality) pair.
#[must_use]
pub const fn format_selector(kind: MediaKind, quality: Quality) -> &'static str {
    match (kind, quality) {
        (MediaKind::Audio, Quality::Highest) => "bestaudio/best",
        (MediaKind::Audio, Quality::Lowest) => "worstaudio/worst",
        (MediaKind::VideoOnly, Quality::Highest) => "bestvideo[ext=mp4]/bestvideo",
        (MediaKind::VideoOnly, Quality::Lowest) => "worstvideo[ext=mp4]/worstvideo",
        (MediaKind::AudioVideo, Quality::Highest) => {
            "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best"
        }
        (MediaKind::AudioVideo, Quality::Lowest) => {
            "worstvideo[ext=mp4]+worstaudio[ext=m4a]/worst[ext=mp4]/worst"
        }
    }
}

/// Builds the download argument vector for one attempt.
///
/// `staging_dir` receives the output files. `credential_file` is appended
/// only when `spec` asks for credentials; pass `None` when the file is
/// missing or unreadable. `transcoder` is forwarded as the extractor's
/// transcoder location when it is an explicit path.
#[must_use]
pub fn download_args(
    request: &DownloadRequest,
    spec: &AttemptSpec,
    staging_dir: &Path,
    credential_file: Option<&Path>,
    transcoder: Option<&Path>,
) -> Vec<String> {
    let mut args = vec![
        "--format".to_string(),
        format_selector(request.kind(), request.quality()).to_string(),
    ];

    match request.kind() {
        MediaKind::Audio => {
            args.extend(
                ["--extract-audio", "--audio-format", "mp3", "--audio-quality", "0"]
                    .map(String::from),
            );
        }
        MediaKind::AudioVideo => {
            args.extend(["--merge-output-format", "mp4"].map(String::from));
        }
        MediaKind::VideoOnly => {}
    }

    args.extend(
        ["--restrict-filenames", "--newline", "--no-playlist", "--no-colors"].map(String::from),
    );

    args.push("--paths".to_string());
    args.push(staging_dir.to_string_lossy().into_owned());
    args.push("--output".to_string());
    args.push(OUTPUT_TEMPLATE.to_string());

    if let Some(path) = transcoder {
        args.push("--ffmpeg-location".to_string());
        args.push(path.to_string_lossy().into_owned());
    }

    match spec {
        AttemptSpec::Credentialed => {
            if let Some(path) = credential_file {
                args.push("--cookies".to_string());
                args.push(path.to_string_lossy().into_owned());
            }
        }
        AttemptSpec::Anonymous => {}
        AttemptSpec::AlternateClient(client) => {
            args.push("--extractor-args".to_string());
            args.push(format!("youtube:player_client={client}"));
        }
    }

    args.push("--".to_string());
    args.push(request.url().to_string());
    args
}

/// Arguments for a single item's metadata record.
#[must_use]
pub fn item_metadata_args(url: &str) -> Vec<String> {
    ["--no-playlist", "--dump-json", "--no-warnings", "--", url]
        .map(String::from)
        .to_vec()
}

/// Arguments for a flat collection listing, one record per line.
#[must_use]
pub fn flat_listing_args(url: &str) -> Vec<String> {
    ["--flat-playlist", "--dump-json", "--no-warnings", "--", url]
        .map(String::from)
        .to_vec()
}
