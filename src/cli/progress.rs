//! Progress bars and summary reporting for CLI downloads.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::format::{format_clock, format_duration};
use crate::{
    AttemptSpec, BatchResult, DownloadProgress, DownloadRequest, Phase, Playlist, ProgressState,
};

const SEPARATOR: &str = "────────────────────────────────────────────────────────────";

/// Creates a percentage bar for one item.
pub fn make_progress_bar(label: &str) -> ProgressBar {
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} [{bar:40.cyan/blue}] {pos:>3}% {prefix:.bold} - {msg}",
        )
        .expect("progress template is valid")
        .progress_chars("━━╌"),
    );
    bar.set_prefix(label.to_string());
    bar.set_message(Phase::Starting.to_string());
    bar.enable_steady_tick(Duration::from_millis(250));
    bar
}

/// [`DownloadProgress`] drawing one indicatif bar per item.
///
/// Items run one at a time, so a single slot holds the live bar.
pub struct BarProgress {
    multi: MultiProgress,
    current: Mutex<Option<ProgressBar>>,
}

impl BarProgress {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            current: Mutex::new(None),
        }
    }

    fn println(&self, line: impl AsRef<str>) {
        let _ = self.multi.println(line);
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        let slot = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(bar) = slot.as_ref() {
            f(bar);
        }
    }
}

impl Default for BarProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl DownloadProgress for BarProgress {
    fn on_item_start(&self, position: usize, total: usize, title: &str) {
        self.println(format!("{} {title}", style(format!("[{position}/{total}]")).dim()));
    }

    fn on_attempt_start(&self, request: &DownloadRequest, attempt: usize, spec: &AttemptSpec) {
        let mut slot = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(bar) = slot.as_ref() {
            bar.reset();
            bar.set_message(format!("retrying {spec}"));
        } else {
            let bar = self.multi.add(make_progress_bar(request.label()));
            if attempt > 0 {
                bar.set_message(format!("retrying {spec}"));
            }
            *slot = Some(bar);
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn on_progress(&self, _request: &DownloadRequest, state: &ProgressState) {
        self.with_bar(|bar| {
            bar.set_position(state.percent.round() as u64);
            match &state.throughput {
                Some(rate) => bar.set_message(format!("{} @ {rate}", state.phase)),
                None => bar.set_message(state.phase.to_string()),
            }
        });
    }

    fn on_attempt_failed(&self, request: &DownloadRequest, attempt: usize, message: &str) {
        self.println(format!(
            "  {} {} attempt {}: {message}",
            style("!").yellow(),
            request.label(),
            attempt + 1
        ));
    }

    fn on_finished(&self, request: &DownloadRequest, succeeded: bool, detail: &str) {
        if let Some(bar) = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            bar.finish_and_clear();
            self.multi.remove(&bar);
        }
        if succeeded {
            self.println(format!("  {} {detail}", style("✓").green()));
        } else {
            self.println(format!(
                "  {} {}: {detail}",
                style("✗").red(),
                request.label()
            ));
        }
    }
}

/// Prints the entries of a collection before selection.
pub fn print_playlist(playlist: &Playlist) {
    if playlist.is_empty() {
        println!("No entries found.");
        return;
    }

    println!("\n{SEPARATOR}");
    match &playlist.owner {
        Some(owner) => println!("{} ({owner})", style(&playlist.title).bold()),
        None => println!("{}", style(&playlist.title).bold()),
    }
    println!("{SEPARATOR}");

    let width = playlist.len().to_string().len();
    for (i, entry) in playlist.entries.iter().enumerate() {
        let length = entry
            .duration
            .map_or_else(String::new, |d| format!(" ({})", format_clock(d)));
        println!("  {:>width$}. {}{length}", i + 1, entry.title);
    }

    println!("{SEPARATOR}");
    println!("  {} entries", playlist.len());
    println!("{SEPARATOR}\n");
}

/// Prints a summary of a finished batch.
pub fn print_summary(result: &BatchResult) {
    if result.total() == 0 {
        println!("Nothing was selected.");
        return;
    }

    println!("\n{SEPARATOR}");
    println!("Download Summary");
    println!("{SEPARATOR}");
    println!("  Successful:        {}", style(result.successful).green());
    if result.failed > 0 {
        println!("  Failed:            {}", style(result.failed).red());
    }
    println!("  Destination:       {}", result.destination.display());
    println!("  Total time:        {}", format_duration(result.elapsed));
    println!("{SEPARATOR}");
}
