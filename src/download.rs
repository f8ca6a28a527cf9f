//! Download pipeline: attempts, staging and sequential batches.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::args::{download_args, flat_listing_args, item_metadata_args};
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::fs::{FileSystem, TokioFileSystem};
use crate::playlist::{MediaInfo, Playlist, Selection};
use crate::process::{LaunchCommand, Launcher, OutputLine, TokioLauncher, capture_stdout};
use crate::progress::{DownloadProgress, ProgressParser, TextProgressParser};
use crate::request::{AttemptPlan, DownloadRequest};
use crate::retry::{AttemptFailure, FailureKind, RetryController};
use crate::staging::StagingArea;
use crate::stats::{BatchResult, BatchStatsBuilder};

/// Builds a fresh parser for every attempt of a request.
pub type ParserFactory = Arc<dyn Fn(&DownloadRequest) -> Box<dyn ProgressParser> + Send + Sync>;

/// Why a request produced no artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadFailure {
    /// Message from the last attempt.
    pub message: String,
    /// Every failed attempt, oldest first.
    pub attempts: Vec<AttemptFailure>,
    /// Staging directory kept because promotion failed part way.
    pub preserved: Option<PathBuf>,
}

/// Result of driving one request through its attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Files now in the destination directory.
    Delivered { files: Vec<PathBuf>, attempts: usize },
    Failed(DownloadFailure),
}

impl DownloadOutcome {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

/// Runs the extractor for single items and whole collections.
pub struct Downloader<L: Launcher = TokioLauncher, F: FileSystem = TokioFileSystem> {
    config: AppConfig,
    launcher: L,
    fs: F,
    staging: StagingArea,
    extractor: PathBuf,
    transcoder: Option<PathBuf>,
    parser: ParserFactory,
}

impl<L: Launcher> Downloader<L, TokioFileSystem> {
    /// Creates a downloader on the real file system.
    #[must_use]
    pub fn new(config: AppConfig, launcher: L) -> Self {
        Self::with_fs(config, launcher, TokioFileSystem::new())
    }
}

impl<L: Launcher, F: FileSystem> Downloader<L, F> {
    /// Creates a downloader with a custom file system implementation.
    #[must_use]
    pub fn with_fs(config: AppConfig, launcher: L, fs: F) -> Self {
        Self {
            staging: StagingArea::new(&config.paths.temp_root),
            extractor: config.tools.extractor.clone(),
            transcoder: None,
            parser: Arc::new(|request: &DownloadRequest| -> Box<dyn ProgressParser> {
                Box::new(TextProgressParser::for_kind(request.kind()))
            }),
            config,
            launcher,
            fs,
        }
    }

    /// Uses `path` as the extractor binary.
    #[must_use]
    pub fn with_extractor(mut self, path: impl Into<PathBuf>) -> Self {
        self.extractor = path.into();
        self
    }

    /// Passes `path` to the extractor as its transcoder location.
    #[must_use]
    pub fn with_transcoder(mut self, path: Option<PathBuf>) -> Self {
        self.transcoder = path;
        self
    }

    /// Replaces the progress parser used for each attempt.
    #[must_use]
    pub fn with_parser(mut self, factory: ParserFactory) -> Self {
        self.parser = factory;
        self
    }

    #[must_use]
    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Mutable access to the configuration, e.g. to change the media kind
    /// between requests. The staging root is fixed at construction.
    pub const fn config_mut(&mut self) -> &mut AppConfig {
        &mut self.config
    }

    #[must_use]
    pub const fn staging(&self) -> &StagingArea {
        &self.staging
    }

    #[must_use]
    pub const fn launcher(&self) -> &L {
        &self.launcher
    }

    #[must_use]
    pub const fn fs(&self) -> &F {
        &self.fs
    }

    /// Builds a request using the configured kind, quality and credential file.
    #[must_use]
    pub fn request_for(
        &self,
        url: &str,
        destination: &Path,
        item_id: Option<&str>,
    ) -> DownloadRequest {
        let request = DownloadRequest::new(
            url,
            self.config.download.kind,
            self.config.download.quality,
            destination,
        )
        .with_credential_file(self.config.paths.credential_file.clone());
        match item_id {
            Some(id) => request.with_item_id(id),
            None => request,
        }
    }

    /// Fetches the metadata record for a single item.
    ///
    /// # Errors
    ///
    /// Returns an error if the extractor cannot be run, exits unsuccessfully
    /// or prints something other than a metadata record.
    pub async fn fetch_item_info(&self, url: &str) -> Result<MediaInfo> {
        let command = LaunchCommand::new(&self.extractor, item_metadata_args(url));
        let stdout = capture_stdout(&self.launcher, &command).await?;
        MediaInfo::from_dump(&stdout)
    }

    /// Lists a collection without resolving its items.
    ///
    /// # Errors
    ///
    /// Returns an error if the extractor cannot be run, exits unsuccessfully
    /// or prints malformed records.
    pub async fn fetch_playlist(&self, url: &str) -> Result<Playlist> {
        let command = LaunchCommand::new(&self.extractor, flat_listing_args(url));
        let stdout = capture_stdout(&self.launcher, &command).await?;
        let playlist = Playlist::from_flat_listing(&stdout)?;
        log::info!(
            "Listed \"{}\" with {} entries",
            playlist.title,
            playlist.entries.len()
        );
        Ok(playlist)
    }

    /// Drives `request` through its attempts until one succeeds or none remain.
    ///
    /// A failed request is an `Ok` outcome; only problems that should stop
    /// the caller entirely are returned as errors.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if the run was interrupted and an I/O
    /// error if a staging directory cannot be created.
    pub async fn download(
        &self,
        request: &DownloadRequest,
        progress: &Arc<dyn DownloadProgress>,
    ) -> Result<DownloadOutcome> {
        let credentials = match request.credential_file() {
            Some(path) if self.fs.is_readable_file(path).await => Some(path),
            Some(path) => {
                log::warn!(
                    "Credential file {} is not readable, continuing without it",
                    path.display()
                );
                None
            }
            None => None,
        };
        let plan = AttemptPlan::for_request(
            request,
            credentials.is_some(),
            self.config.download.fallback_client(),
        );
        let mut retry = RetryController::new(plan.into_specs());

        while let Some((attempt, spec)) = retry.next_attempt() {
            log::info!("{}: attempt {} {spec}", request.label(), attempt + 1);
            progress.on_attempt_start(request, attempt, &spec);

            let stage = self.staging.create_dir(&self.fs, request.item_id()).await?;
            let args = download_args(
                request,
                &spec,
                stage.path(),
                credentials,
                self.transcoder.as_deref(),
            );
            let command = LaunchCommand::new(&self.extractor, args).in_dir(stage.path());
            log::debug!("Running {} {:?}", command.program.display(), command.args);

            let mut parser = (self.parser)(request);
            let result = self
                .launcher
                .launch(&command, &mut |line: &OutputLine| {
                    if parser.feed(&line.text) {
                        progress.on_progress(request, parser.state());
                    }
                })
                .await;

            let (kind, message) = match result {
                Ok(report) if report.success() => {
                    parser.finish();
                    progress.on_progress(request, parser.state());
                    retry.record_success();
                    return Ok(self.promote(request, stage, attempt, retry, progress).await);
                }
                Ok(report) => (FailureKind::Exit(report.code), report.error_message()),
                Err(Error::Launch { program, source }) => (
                    FailureKind::Launch,
                    format!("could not start {program}: {source}"),
                ),
                // The staging guard cleans up on the way out.
                Err(e) => return Err(e),
            };

            log::warn!("{}: attempt {} failed: {message}", request.label(), attempt + 1);
            progress.on_attempt_failed(request, attempt, &message);
            retry.record_failure(kind, message);
            stage.discard(&self.fs).await;
        }

        let failures = retry.into_failures();
        for failure in &failures {
            log::debug!("{}: {failure}", request.label());
        }
        let message = failures
            .last()
            .map_or_else(|| "no attempts were made".to_string(), |f| f.message.clone());
        progress.on_finished(request, false, &message);
        Ok(DownloadOutcome::Failed(DownloadFailure {
            message,
            attempts: failures,
            preserved: None,
        }))
    }

    async fn promote(
        &self,
        request: &DownloadRequest,
        stage: crate::staging::StagingDir,
        attempt: usize,
        retry: RetryController,
        progress: &Arc<dyn DownloadProgress>,
    ) -> DownloadOutcome {
        match stage
            .promote(&self.fs, request.destination(), request.kind())
            .await
        {
            Ok(files) => {
                let detail = files.first().map_or_else(
                    || request.destination().display().to_string(),
                    |f| f.display().to_string(),
                );
                progress.on_finished(request, true, &detail);
                DownloadOutcome::Delivered {
                    files,
                    attempts: attempt + 1,
                }
            }
            Err(e) => {
                let (e, preserved) = match e {
                    Error::Staging { temp_dir, source } => {
                        let temp_dir = self.staging.preserve(&self.fs, &temp_dir).await;
                        let preserved = Some(temp_dir.clone());
                        (Error::Staging { temp_dir, source }, preserved)
                    }
                    other => (other, None),
                };
                let message = e.to_string();
                progress.on_finished(request, false, &message);
                DownloadOutcome::Failed(DownloadFailure {
                    message,
                    attempts: retry.into_failures(),
                    preserved,
                })
            }
        }
    }

    /// Directory a collection's items are written into.
    #[must_use]
    pub fn batch_destination(&self, playlist: &Playlist) -> PathBuf {
        self.config
            .paths
            .download_dir
            .join(folder_name(&playlist.title))
    }

    /// Downloads the selected entries one after another.
    ///
    /// A failed item is counted and the batch moves on. Selecting nothing
    /// returns an empty result without touching the destination.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if the batch was interrupted.
    pub async fn download_all(
        &self,
        playlist: &Playlist,
        selection: &Selection,
        progress: &Arc<dyn DownloadProgress>,
    ) -> Result<BatchResult> {
        let destination = self.batch_destination(playlist);
        let mut builder = BatchStatsBuilder::new(&destination);

        let entries = playlist.select(selection);
        if entries.is_empty() {
            log::info!("Nothing selected from \"{}\"", playlist.title);
            return Ok(builder.build());
        }

        let total = entries.len();
        for (index, entry) in entries.into_iter().enumerate() {
            progress.on_item_start(index + 1, total, &entry.title);
            let request = self.request_for(&entry.url, &destination, Some(&entry.id));
            match self.download(&request, progress).await {
                Ok(outcome) => builder.record(outcome.is_success()),
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    log::error!("Download failed: {e}");
                    progress.on_finished(&request, false, &e.to_string());
                    builder.add_failure();
                }
            }
        }

        Ok(builder.build())
    }
}

/// Turns a collection title into a single path component.
fn folder_name(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, ' ' | '-' | '_' | '.' | '(' | ')') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim().trim_matches('.');
    if trimmed.is_empty() {
        "playlist".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playlist::PlaylistEntry;
    use crate::process::{ExitReport, Stream};
    use crate::progress::{NoProgress, ProgressState};
    use crate::request::{AttemptSpec, MediaKind};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// What the mock extractor does on one call.
    #[derive(Debug, Clone)]
    enum Scripted {
        /// Writes an mp3 into the working directory and exits 0.
        Deliver,
        /// Exits with `code`, printing `stderr`.
        Exit(i32, &'static str),
        /// Fails to start.
        Unlaunchable,
        /// Prints `stdout` and exits 0.
        Print(&'static str),
        Cancel,
    }

    /// A launcher that follows a script instead of running anything.
    struct MockLauncher {
        script: Mutex<VecDeque<Scripted>>,
        calls: Mutex<Vec<LaunchCommand>>,
    }

    impl MockLauncher {
        fn new(script: impl IntoIterator<Item = Scripted>) -> Self {
            Self {
                script: Mutex::new(script.into_iter().collect()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<LaunchCommand> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl Launcher for MockLauncher {
        async fn launch(
            &self,
            command: &LaunchCommand,
            on_line: &mut (dyn for<'a> FnMut(&'a OutputLine) + Send),
        ) -> Result<ExitReport> {
            self.calls.lock().unwrap().push(command.clone());
            let step = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Scripted::Deliver);
            let mut emit = |stream, text: &str| {
                on_line(&OutputLine {
                    stream,
                    text: text.to_string(),
                });
            };
            match step {
                Scripted::Deliver => {
                    let dir = command.working_dir.clone().unwrap();
                    emit(Stream::Stdout, "[download] Destination: Song.webm");
                    emit(Stream::Stdout, "[download]  42.0% of 3.00MiB at 1.00MiB/s");
                    emit(Stream::Stdout, "[ExtractAudio] Destination: Song.mp3");
                    std::fs::write(dir.join("Song [x].mp3"), b"audio").unwrap();
                    std::fs::write(dir.join("Song [x].webm.part"), b"junk").unwrap();
                    Ok(ExitReport {
                        code: Some(0),
                        stderr: String::new(),
                    })
                }
                Scripted::Exit(code, stderr) => {
                    emit(Stream::Stderr, stderr);
                    Ok(ExitReport {
                        code: Some(code),
                        stderr: format!("{stderr}\n"),
                    })
                }
                Scripted::Unlaunchable => Err(Error::Launch {
                    program: command.program.display().to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
                }),
                Scripted::Print(stdout) => {
                    for line in stdout.lines() {
                        emit(Stream::Stdout, line);
                    }
                    Ok(ExitReport {
                        code: Some(0),
                        stderr: String::new(),
                    })
                }
                Scripted::Cancel => Err(Error::Cancelled),
            }
        }
    }

    /// Records every event it receives.
    #[derive(Default)]
    struct RecordingProgress {
        events: Mutex<Vec<String>>,
        states: Mutex<Vec<ProgressState>>,
    }

    impl DownloadProgress for RecordingProgress {
        fn on_attempt_start(&self, _request: &DownloadRequest, attempt: usize, spec: &AttemptSpec) {
            self.events
                .lock()
                .unwrap()
                .push(format!("start {attempt} {spec}"));
        }

        fn on_progress(&self, _request: &DownloadRequest, state: &ProgressState) {
            self.states.lock().unwrap().push(state.clone());
        }

        fn on_attempt_failed(&self, _request: &DownloadRequest, attempt: usize, message: &str) {
            self.events
                .lock()
                .unwrap()
                .push(format!("failed {attempt} {message}"));
        }

        fn on_finished(&self, request: &DownloadRequest, succeeded: bool, _detail: &str) {
            self.events
                .lock()
                .unwrap()
                .push(format!("finished {} {succeeded}", request.label()));
        }

        fn on_item_start(&self, position: usize, total: usize, title: &str) {
            self.events
                .lock()
                .unwrap()
                .push(format!("item {position}/{total} {title}"));
        }
    }

    struct Fixture {
        dir: TempDir,
        config: AppConfig,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let mut config = AppConfig::default();
            config.download.kind = MediaKind::Audio;
            config.paths.download_dir = dir.path().join("downloads");
            config.paths.temp_root = dir.path().join("staging");
            std::fs::create_dir_all(&config.paths.temp_root).unwrap();
            Self { dir, config }
        }

        fn downloader(&self, launcher: MockLauncher) -> Downloader<MockLauncher> {
            Downloader::new(self.config.clone(), launcher).with_extractor("yt-dlp")
        }

        fn staging_is_empty(&self) -> bool {
            std::fs::read_dir(&self.config.paths.temp_root)
                .unwrap()
                .next()
                .is_none()
        }
    }

    fn no_progress() -> Arc<dyn DownloadProgress> {
        Arc::new(NoProgress)
    }

    fn playlist(count: usize) -> Playlist {
        Playlist {
            title: "Road Trip".to_string(),
            owner: None,
            entries: (1..=count)
                .map(|i| PlaylistEntry {
                    id: format!("id{i}"),
                    title: format!("Track {i}"),
                    url: format!("https://www.youtube.com/watch?v=id{i}"),
                    duration: None,
                })
                .collect(),
        }
    }

    #[test]
    fn no_progress_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NoProgress>();
    }

    #[test]
    fn folder_names_are_single_components() {
        assert_eq!(folder_name("Road Trip"), "Road Trip");
        assert_eq!(folder_name("AC/DC: Live"), "AC_DC_ Live");
        assert_eq!(folder_name(".."), "playlist");
        assert_eq!(folder_name("   "), "playlist");
    }

    #[test]
    fn request_for_uses_config() {
        let mut fx = Fixture::new();
        fx.config.paths.credential_file = Some(PathBuf::from("/tmp/cookies.txt"));
        let dl = fx.downloader(MockLauncher::new([]));
        let req = dl.request_for("https://youtu.be/x", Path::new("/out"), Some("x"));
        assert_eq!(req.kind(), MediaKind::Audio);
        assert_eq!(req.item_id(), Some("x"));
        assert_eq!(req.credential_file(), Some(Path::new("/tmp/cookies.txt")));
        assert_eq!(req.destination(), Path::new("/out"));
    }

    #[tokio::test]
    async fn successful_attempt_promotes_output() {
        let fx = Fixture::new();
        let dest = fx.dir.path().join("out");
        let dl = fx.downloader(MockLauncher::new([Scripted::Deliver]));
        let req = dl.request_for("https://youtu.be/x", &dest, Some("x"));

        let outcome = dl.download(&req, &no_progress()).await.unwrap();

        assert_eq!(
            outcome,
            DownloadOutcome::Delivered {
                files: vec![dest.join("Song [x].mp3")],
                attempts: 1,
            }
        );
        assert!(!dest.join("Song [x].webm.part").exists());
        assert!(fx.staging_is_empty());
    }

    #[tokio::test]
    async fn attempts_run_in_a_private_staging_dir() {
        let fx = Fixture::new();
        let dest = fx.dir.path().join("out");
        let dl = fx.downloader(MockLauncher::new([Scripted::Deliver]));
        let req = dl.request_for("https://youtu.be/x", &dest, Some("x"));
        dl.download(&req, &no_progress()).await.unwrap();

        let calls = dl.launcher().calls();
        let working_dir = calls[0].working_dir.clone().unwrap();
        assert!(working_dir.starts_with(&fx.config.paths.temp_root));
        let paths_at = calls[0].args.iter().position(|a| a == "--paths").unwrap();
        assert_eq!(calls[0].args[paths_at + 1], working_dir.to_string_lossy());
        assert_eq!(calls[0].args.last().unwrap(), "https://youtu.be/x");
    }

    #[tokio::test]
    async fn fallback_attempt_after_failure() {
        let fx = Fixture::new();
        let dest = fx.dir.path().join("out");
        let launcher = MockLauncher::new([
            Scripted::Exit(1, "ERROR: [youtube] x: Sign in to confirm your age"),
            Scripted::Deliver,
        ]);
        let dl = fx.downloader(launcher);
        let req = dl.request_for("https://youtu.be/x", &dest, Some("x"));
        let progress = Arc::new(RecordingProgress::default());
        let observer: Arc<dyn DownloadProgress> = progress.clone();

        let outcome = dl.download(&req, &observer).await.unwrap();

        match outcome {
            DownloadOutcome::Delivered { attempts, files } => {
                assert_eq!(attempts, 2);
                assert_eq!(files.len(), 1);
            }
            DownloadOutcome::Failed(f) => panic!("unexpected failure: {}", f.message),
        }
        let calls = dl.launcher().calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].args.contains(&"youtube:player_client=android".to_string()));
        assert!(fx.staging_is_empty());

        let events = progress.events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                "start 0 without credential file".to_string(),
                "failed 0 [youtube] x: Sign in to confirm your age".to_string(),
                "start 1 alternate client (android)".to_string(),
                "finished x true".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn success_short_circuits_remaining_attempts() {
        let fx = Fixture::new();
        let dl = fx.downloader(MockLauncher::new([Scripted::Deliver]));
        let req = dl.request_for("https://youtu.be/x", &fx.dir.path().join("out"), None);
        dl.download(&req, &no_progress()).await.unwrap();
        assert_eq!(dl.launcher().calls().len(), 1);
    }

    #[tokio::test]
    async fn exhausted_attempts_surface_last_message() {
        let fx = Fixture::new();
        let dest = fx.dir.path().join("out");
        let launcher = MockLauncher::new([
            Scripted::Exit(1, "ERROR: first problem"),
            Scripted::Exit(1, "ERROR: second problem"),
        ]);
        let dl = fx.downloader(launcher);
        let req = dl.request_for("https://youtu.be/x", &dest, None);

        let DownloadOutcome::Failed(failure) = dl.download(&req, &no_progress()).await.unwrap()
        else {
            panic!("expected failure");
        };
        assert_eq!(failure.message, "second problem");
        assert_eq!(failure.attempts.len(), 2);
        assert_eq!(failure.attempts[0].message, "first problem");
        assert!(failure.preserved.is_none());
        assert!(!dest.exists());
        assert!(fx.staging_is_empty());
    }

    #[tokio::test]
    async fn launch_error_moves_to_next_attempt() {
        let fx = Fixture::new();
        let dl = fx.downloader(MockLauncher::new([Scripted::Unlaunchable, Scripted::Deliver]));
        let req = dl.request_for("https://youtu.be/x", &fx.dir.path().join("out"), None);

        let DownloadOutcome::Delivered { attempts, .. } =
            dl.download(&req, &no_progress()).await.unwrap()
        else {
            panic!("expected delivery");
        };
        assert_eq!(attempts, 2);
        assert!(fx.staging_is_empty());
    }

    #[tokio::test]
    async fn launch_failure_kind_is_recorded() {
        let mut fx = Fixture::new();
        fx.config.download.alternate_client = false;
        let dl = fx.downloader(MockLauncher::new([Scripted::Unlaunchable]));
        let req = dl.request_for("https://youtu.be/x", &fx.dir.path().join("out"), None);

        let DownloadOutcome::Failed(failure) = dl.download(&req, &no_progress()).await.unwrap()
        else {
            panic!("expected failure");
        };
        assert_eq!(failure.attempts.len(), 1);
        assert_eq!(failure.attempts[0].kind, FailureKind::Launch);
        assert!(failure.message.starts_with("could not start yt-dlp"));
    }

    #[tokio::test]
    async fn readable_credentials_come_first() {
        let mut fx = Fixture::new();
        let cookies = fx.dir.path().join("cookies.txt");
        std::fs::write(&cookies, "# Netscape HTTP Cookie File\n").unwrap();
        fx.config.paths.credential_file = Some(cookies.clone());
        let dl = fx.downloader(MockLauncher::new([Scripted::Deliver]));
        let req = dl.request_for("https://youtu.be/x", &fx.dir.path().join("out"), None);
        dl.download(&req, &no_progress()).await.unwrap();

        let args = &dl.launcher().calls()[0].args;
        let at = args.iter().position(|a| a == "--cookies").unwrap();
        assert_eq!(args[at + 1], cookies.to_string_lossy());
    }

    #[tokio::test]
    async fn unreadable_credentials_are_skipped() {
        let mut fx = Fixture::new();
        fx.config.paths.credential_file = Some(fx.dir.path().join("missing.txt"));
        let dl = fx.downloader(MockLauncher::new([Scripted::Exit(1, "ERROR: x")]));
        let req = dl.request_for("https://youtu.be/x", &fx.dir.path().join("out"), None);
        dl.download(&req, &no_progress()).await.unwrap();

        let calls = dl.launcher().calls();
        // Anonymous then alternate client; no credentialed attempt.
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|c| !c.args.contains(&"--cookies".to_string())));
    }

    #[tokio::test]
    async fn progress_reaches_complete() {
        let fx = Fixture::new();
        let dl = fx.downloader(MockLauncher::new([Scripted::Deliver]));
        let req = dl.request_for("https://youtu.be/x", &fx.dir.path().join("out"), None);
        let progress = Arc::new(RecordingProgress::default());
        let observer: Arc<dyn DownloadProgress> = progress.clone();
        dl.download(&req, &observer).await.unwrap();

        let states = progress.states.lock().unwrap().clone();
        assert!(states.iter().any(|s| (s.percent - 42.0).abs() < f64::EPSILON));
        // Audio run: the webm stream is the audio track.
        assert!(states.iter().any(|s| s.phase == crate::progress::Phase::DownloadingAudio));
        assert!(states.iter().all(|s| s.phase != crate::progress::Phase::DownloadingVideo));
        let last = states.last().unwrap();
        assert_eq!(last.phase, crate::progress::Phase::Complete);
        assert!((last.percent - 100.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn parser_factory_sees_the_request() {
        let fx = Fixture::new();
        let kinds = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&kinds);
        let dl = fx
            .downloader(MockLauncher::new([Scripted::Deliver]))
            .with_parser(Arc::new(move |request: &DownloadRequest| -> Box<dyn ProgressParser> {
                seen.lock().unwrap().push(request.kind());
                Box::new(TextProgressParser::new())
            }));
        let req = dl.request_for("https://youtu.be/x", &fx.dir.path().join("out"), None);
        dl.download(&req, &no_progress()).await.unwrap();
        assert_eq!(*kinds.lock().unwrap(), vec![MediaKind::Audio]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_promotion_keeps_output_past_shutdown() {
        let fx = Fixture::new();
        let dest = fx.dir.path().join("blocked");
        std::fs::write(&dest, b"not a dir").unwrap();
        let dl = fx.downloader(MockLauncher::new([Scripted::Deliver]));
        let req = dl.request_for("https://youtu.be/x", &dest, Some("x"));

        let DownloadOutcome::Failed(failure) = dl.download(&req, &no_progress()).await.unwrap()
        else {
            panic!("expected failure");
        };
        let kept = failure.preserved.clone().unwrap();
        assert!(!kept.starts_with(&fx.config.paths.temp_root));
        assert!(failure.message.contains(&kept.display().to_string()));
        assert_eq!(dl.launcher().calls().len(), 1);
        assert!(fx.staging_is_empty());

        // What the binary does on the way out.
        dl.staging().wipe(dl.fs()).await.unwrap();
        assert!(kept.join("Song [x].mp3").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn batch_counts_failed_promotion_and_continues() {
        let fx = Fixture::new();
        std::fs::create_dir_all(&fx.config.paths.download_dir).unwrap();
        std::fs::write(fx.config.paths.download_dir.join("Road Trip"), b"not a dir").unwrap();
        let dl = fx.downloader(MockLauncher::new([]));

        let result = dl
            .download_all(&playlist(2), &Selection::All, &no_progress())
            .await
            .unwrap();

        assert_eq!(result.successful, 0);
        assert_eq!(result.failed, 2);
        assert_eq!(dl.launcher().calls().len(), 2);
        assert!(fx.staging_is_empty());
        let kept = std::fs::read_dir(dl.staging().kept_root()).unwrap().count();
        assert_eq!(kept, 2);
    }

    #[tokio::test]
    async fn cancellation_propagates_and_cleans_up() {
        let fx = Fixture::new();
        let dl = fx.downloader(MockLauncher::new([Scripted::Cancel]));
        let req = dl.request_for("https://youtu.be/x", &fx.dir.path().join("out"), None);

        let err = dl.download(&req, &no_progress()).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert!(fx.staging_is_empty());
    }

    #[tokio::test]
    async fn batch_isolates_failures() {
        let fx = Fixture::new();
        let launcher = MockLauncher::new([
            Scripted::Deliver,
            Scripted::Exit(1, "ERROR: Video unavailable"),
            Scripted::Exit(1, "ERROR: Video unavailable"),
            Scripted::Deliver,
        ]);
        let dl = fx.downloader(launcher);
        let progress = Arc::new(RecordingProgress::default());
        let observer: Arc<dyn DownloadProgress> = progress.clone();

        let result = dl
            .download_all(&playlist(3), &Selection::All, &observer)
            .await
            .unwrap();

        assert_eq!(result.successful, 2);
        assert_eq!(result.failed, 1);
        assert_eq!(result.destination, fx.config.paths.download_dir.join("Road Trip"));

        let urls: Vec<_> = dl
            .launcher()
            .calls()
            .iter()
            .map(|c| c.args.last().unwrap().clone())
            .collect();
        assert_eq!(urls.last().unwrap(), "https://www.youtube.com/watch?v=id3");

        let events = progress.events.lock().unwrap().clone();
        assert!(events.contains(&"item 3/3 Track 3".to_string()));
        assert!(events.contains(&"finished id2 false".to_string()));
        assert!(fx.staging_is_empty());
    }

    #[tokio::test]
    async fn batch_follows_selection_order() {
        let fx = Fixture::new();
        let dl = fx.downloader(MockLauncher::new([]));
        let selection = Selection::Range("2-9".to_string());

        let result = dl
            .download_all(&playlist(3), &selection, &no_progress())
            .await
            .unwrap();

        assert_eq!(result.successful, 2);
        let urls: Vec<_> = dl
            .launcher()
            .calls()
            .iter()
            .map(|c| c.args.last().unwrap().clone())
            .collect();
        assert_eq!(
            urls,
            vec![
                "https://www.youtube.com/watch?v=id2",
                "https://www.youtube.com/watch?v=id3",
            ]
        );
    }

    #[tokio::test]
    async fn empty_selection_does_nothing() {
        let fx = Fixture::new();
        let dl = fx.downloader(MockLauncher::new([]));
        let selection = Selection::Range("0-2".to_string());

        let result = dl
            .download_all(&playlist(3), &selection, &no_progress())
            .await
            .unwrap();

        assert_eq!(result.total(), 0);
        assert!(dl.launcher().calls().is_empty());
        assert!(!result.destination.exists());
    }

    #[tokio::test]
    async fn batch_stops_on_cancel() {
        let fx = Fixture::new();
        let dl = fx.downloader(MockLauncher::new([Scripted::Deliver, Scripted::Cancel]));

        let err = dl
            .download_all(&playlist(3), &Selection::All, &no_progress())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(dl.launcher().calls().len(), 2);
    }

    #[tokio::test]
    async fn fetch_playlist_parses_listing() {
        let fx = Fixture::new();
        let listing = concat!(
            r#"{"_type":"url","id":"a1","title":"One","url":"https://www.youtube.com/watch?v=a1","playlist_title":"Mix","duration":61}"#,
            "\n",
            r#"{"_type":"url","id":"b2","title":"Two","url":"https://www.youtube.com/watch?v=b2","playlist_title":"Mix"}"#,
        );
        let dl = fx.downloader(MockLauncher::new([Scripted::Print(listing)]));

        let playlist = dl
            .fetch_playlist("https://www.youtube.com/playlist?list=PL1")
            .await
            .unwrap();
        assert_eq!(playlist.title, "Mix");
        assert_eq!(playlist.entries.len(), 2);
        assert_eq!(playlist.entries[0].duration, Some(61));

        let args = &dl.launcher().calls()[0].args;
        assert!(args.contains(&"--flat-playlist".to_string()));
        assert!(dl.launcher().calls()[0].working_dir.is_none());
    }

    #[tokio::test]
    async fn fetch_item_info_reports_extractor_error() {
        let fx = Fixture::new();
        let dl = fx.downloader(MockLauncher::new([Scripted::Exit(
            1,
            "ERROR: [youtube] x: Private video",
        )]));
        let err = dl.fetch_item_info("https://youtu.be/x").await.unwrap_err();
        match err {
            Error::Metadata(msg) => assert_eq!(msg, "[youtube] x: Private video"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn fetch_item_info_reads_dump() {
        let fx = Fixture::new();
        let dl = fx.downloader(MockLauncher::new([Scripted::Print(
            r#"{"id":"x","title":"Song","uploader":"Band","duration":200}"#,
        )]));
        let info = dl.fetch_item_info("https://youtu.be/x").await.unwrap();
        assert_eq!(info.id, "x");
        assert_eq!(info.title, "Song");
        assert_eq!(info.uploader.as_deref(), Some("Band"));
    }
}
