//! CLI mode for reel - interactive and one-shot downloads.

mod progress;

use std::io;
use std::sync::Arc;

use dialoguer::theme::ColorfulTheme;
use dialoguer::{Input, MultiSelect, Select};

use crate::download::{DownloadOutcome, Downloader};
use crate::fs::FileSystem;
use crate::process::Launcher;
use crate::url::{is_collection_url, validate_url};
use crate::{DownloadProgress, Error, MediaKind, Playlist, Quality, Result, Selection};

pub use progress::{BarProgress, print_playlist, print_summary};

/// What the command line asked for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOptions {
    /// Source URL. Interactive mode when absent.
    pub url: Option<String>,
    /// Range expression for collections in one-shot mode.
    pub items: Option<String>,
}

/// Runs one CLI session.
///
/// Returns true if everything that was attempted succeeded.
///
/// # Errors
///
/// Returns [`Error::Cancelled`] on interruption, or an error if a prompt
/// or a metadata fetch fails.
pub async fn run<L: Launcher, F: FileSystem>(
    downloader: &mut Downloader<L, F>,
    options: CliOptions,
) -> Result<bool> {
    let progress: Arc<dyn DownloadProgress> = Arc::new(BarProgress::new());

    let Some(url) = options.url else {
        return run_interactive(downloader, &progress).await;
    };

    if is_collection_url(&url) {
        let playlist = downloader.fetch_playlist(&url).await?;
        print_playlist(&playlist);
        let selection = options.items.map_or(Selection::All, Selection::Range);
        download_collection(downloader, &playlist, &selection, &progress).await
    } else {
        download_single(downloader, &url, &progress).await
    }
}

async fn run_interactive<L: Launcher, F: FileSystem>(
    downloader: &mut Downloader<L, F>,
    progress: &Arc<dyn DownloadProgress>,
) -> Result<bool> {
    let theme = ColorfulTheme::default();

    let url: String = Input::with_theme(&theme)
        .with_prompt("URL")
        .validate_with(|input: &String| validate_url(input).map(|_| ()).map_err(|e| e.to_string()))
        .interact_text()
        .map_err(prompt_error)?;
    let url = validate_url(&url)?;

    let kinds = [MediaKind::AudioVideo, MediaKind::Audio, MediaKind::VideoOnly];
    let current = downloader.config().download.kind;
    let kind = Select::with_theme(&theme)
        .with_prompt("Download")
        .items(&kinds)
        .default(kinds.iter().position(|k| *k == current).unwrap_or(0))
        .interact()
        .map_err(prompt_error)?;

    let qualities = [Quality::Highest, Quality::Lowest];
    let current = downloader.config().download.quality;
    let quality = Select::with_theme(&theme)
        .with_prompt("Quality")
        .items(&qualities)
        .default(qualities.iter().position(|q| *q == current).unwrap_or(0))
        .interact()
        .map_err(prompt_error)?;

    let download = &mut downloader.config_mut().download;
    download.kind = kinds[kind];
    download.quality = qualities[quality];

    if !is_collection_url(&url) {
        return download_single(downloader, &url, progress).await;
    }

    let playlist = downloader.fetch_playlist(&url).await?;
    print_playlist(&playlist);
    if playlist.is_empty() {
        return Ok(true);
    }
    let selection = prompt_selection(&theme, &playlist)?;
    download_collection(downloader, &playlist, &selection, progress).await
}

fn prompt_selection(theme: &ColorfulTheme, playlist: &Playlist) -> Result<Selection> {
    let modes = ["All entries", "Range (e.g. 2-5 or 1,4,7)", "Pick from list"];
    let mode = Select::with_theme(theme)
        .with_prompt("Which entries?")
        .items(&modes)
        .default(0)
        .interact()
        .map_err(prompt_error)?;

    match mode {
        0 => Ok(Selection::All),
        1 => {
            let range: String = Input::with_theme(theme)
                .with_prompt("Range")
                .interact_text()
                .map_err(prompt_error)?;
            Ok(Selection::Range(range))
        }
        _ => {
            let titles: Vec<&str> = playlist.entries.iter().map(|e| e.title.as_str()).collect();
            let picked = MultiSelect::with_theme(theme)
                .with_prompt("Space to toggle, Enter to confirm")
                .items(&titles)
                .interact()
                .map_err(prompt_error)?;
            Ok(Selection::Picked(picked))
        }
    }
}

async fn download_single<L: Launcher, F: FileSystem>(
    downloader: &Downloader<L, F>,
    url: &str,
    progress: &Arc<dyn DownloadProgress>,
) -> Result<bool> {
    let info = match downloader.fetch_item_info(url).await {
        Ok(info) => {
            let by = info
                .uploader
                .as_deref()
                .map_or_else(String::new, |u| format!(" by {u}"));
            println!("{}{by}", info.title);
            Some(info)
        }
        Err(Error::Cancelled) => return Err(Error::Cancelled),
        Err(e) => {
            log::warn!("Could not read metadata for {url}: {e}");
            None
        }
    };

    let destination = downloader.config().paths.download_dir.clone();
    let request = downloader.request_for(url, &destination, info.as_ref().map(|i| i.id.as_str()));
    match downloader.download(&request, progress).await? {
        DownloadOutcome::Delivered { files, .. } => {
            if files.is_empty() {
                println!("The extractor finished but produced no {} file.", request.kind());
            }
            Ok(true)
        }
        DownloadOutcome::Failed(failure) => {
            if let Some(dir) = failure.preserved {
                println!("Downloaded files were kept in {}", dir.display());
            }
            Ok(false)
        }
    }
}

async fn download_collection<L: Launcher, F: FileSystem>(
    downloader: &Downloader<L, F>,
    playlist: &Playlist,
    selection: &Selection,
    progress: &Arc<dyn DownloadProgress>,
) -> Result<bool> {
    let result = downloader.download_all(playlist, selection, progress).await?;
    print_summary(&result);
    Ok(result.all_succeeded())
}

/// Ctrl-C inside a prompt arrives as an interrupted read.
fn prompt_error(e: dialoguer::Error) -> Error {
    match e {
        dialoguer::Error::IO(e) if e.kind() == io::ErrorKind::Interrupted => Error::Cancelled,
        other => Error::Io(io::Error::other(other)),
    }
}
