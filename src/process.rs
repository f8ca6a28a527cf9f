//! Subprocess launching for the extractor and transcoder.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Which pipe a line was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// One line of subprocess output, without its trailing newline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: Stream,
    pub text: String,
}

/// A program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Working directory; created before spawning if absent.
    pub working_dir: Option<PathBuf>,
}

impl LaunchCommand {
    /// Creates a command with no working directory override.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir: None,
        }
    }

    /// Runs the command inside `dir`.
    #[must_use]
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    fn program_name(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }
}

/// Terminal result of a process that was started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitReport {
    /// Exit code, or `None` if the process was killed by a signal.
    pub code: Option<i32>,
    /// Everything the process wrote to stderr.
    pub stderr: String,
}

impl ExitReport {
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.code, Some(0))
    }

    /// Human-readable failure message recovered from stderr.
    #[must_use]
    pub fn error_message(&self) -> String {
        extract_error_message(&self.stderr, self.code)
    }
}

/// Spawns processes and streams their output line by line.
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Runs `command` to completion, calling `on_line` for every stdout and
    /// stderr line as it arrives.
    ///
    /// Both pipes are fully drained before this returns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Launch`] if the program cannot be started and
    /// [`Error::Cancelled`] if the run was interrupted. A nonzero exit is
    /// reported through [`ExitReport`], not as an error.
    async fn launch(
        &self,
        command: &LaunchCommand,
        on_line: &mut (dyn for<'a> FnMut(&'a OutputLine) + Send),
    ) -> Result<ExitReport>;
}

/// [`Launcher`] backed by `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct TokioLauncher {
    cancel: Option<CancellationToken>,
}

impl TokioLauncher {
    #[must_use]
    pub const fn new() -> Self {
        Self { cancel: None }
    }

    /// Kills the running child and returns [`Error::Cancelled`] once `token`
    /// is cancelled.
    #[must_use]
    pub fn with_cancellation(token: CancellationToken) -> Self {
        Self {
            cancel: Some(token),
        }
    }
}

async fn forward_lines<R>(mut reader: R, stream: Stream, tx: mpsc::UnboundedSender<OutputLine>)
where
    R: AsyncBufRead + Unpin,
{
    // Read raw bytes so a stray non-UTF-8 byte does not end the stream.
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf)
                    .trim_end_matches(['\n', '\r'])
                    .to_string();
                if tx.send(OutputLine { stream, text }).is_err() {
                    break;
                }
            }
            Err(e) => {
                log::debug!("Stopped reading {stream:?}: {e}");
                break;
            }
        }
    }
}

#[async_trait]
impl Launcher for TokioLauncher {
    async fn launch(
        &self,
        command: &LaunchCommand,
        on_line: &mut (dyn for<'a> FnMut(&'a OutputLine) + Send),
    ) -> Result<ExitReport> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &command.working_dir {
            tokio::fs::create_dir_all(dir).await?;
            cmd.current_dir(dir);
        }

        log::debug!("Spawning {} {:?}", command.program.display(), command.args);
        let mut child = cmd.spawn().map_err(|source| Error::Launch {
            program: command.program_name(),
            source,
        })?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut readers = Vec::with_capacity(2);
        if let Some(out) = child.stdout.take() {
            readers.push(tokio::spawn(forward_lines(
                BufReader::new(out),
                Stream::Stdout,
                tx.clone(),
            )));
        }
        if let Some(err) = child.stderr.take() {
            readers.push(tokio::spawn(forward_lines(
                BufReader::new(err),
                Stream::Stderr,
                tx.clone(),
            )));
        }
        drop(tx);

        let cancel = self.cancel.clone().unwrap_or_default();
        let mut stderr = String::new();
        loop {
            tokio::select! {
                line = rx.recv() => {
                    let Some(line) = line else { break };
                    if line.stream == Stream::Stderr {
                        stderr.push_str(&line.text);
                        stderr.push('\n');
                    }
                    on_line(&line);
                }
                () = cancel.cancelled() => {
                    log::info!("Cancelling {}", command.program.display());
                    let _ = child.kill().await;
                    return Err(Error::Cancelled);
                }
            }
        }

        // Channel closed: both readers hit EOF.
        for reader in readers {
            let _ = reader.await;
        }
        let status = child.wait().await?;
        Ok(ExitReport {
            code: status.code(),
            stderr,
        })
    }
}

/// Recovers a failure message from stderr text.
///
/// Uses the last line carrying an `ERROR:` prefix, falling back to a
/// generic exit-code message.
#[must_use]
pub fn extract_error_message(stderr: &str, code: Option<i32>) -> String {
    let found = stderr.lines().rev().find_map(|line| {
        let trimmed = line.trim();
        trimmed
            .strip_prefix("ERROR:")
            .or_else(|| trimmed.strip_prefix("error:"))
            .map(str::trim)
            .filter(|msg| !msg.is_empty())
    });
    match (found, code) {
        (Some(msg), _) => msg.to_string(),
        (None, Some(code)) => format!("failed with exit code {code}"),
        (None, None) => "terminated by signal".to_string(),
    }
}

/// Runs `command` and returns its stdout as text.
///
/// # Errors
///
/// Returns [`Error::Launch`] if the program cannot be started, or
/// [`Error::Metadata`] carrying the recovered message if it exits nonzero.
pub async fn capture_stdout<L: Launcher + ?Sized>(
    launcher: &L,
    command: &LaunchCommand,
) -> Result<String> {
    let mut stdout = String::new();
    let report = launcher
        .launch(command, &mut |line: &OutputLine| {
            if line.stream == Stream::Stdout {
                stdout.push_str(&line.text);
                stdout.push('\n');
            }
        })
        .await?;
    if report.success() {
        Ok(stdout)
    } else {
        Err(Error::Metadata(report.error_message()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_uses_last_error_line() {
        let stderr = "WARNING: something\nERROR: first\n[info] x\nERROR: [youtube] abc: Video unavailable\n";
        assert_eq!(
            extract_error_message(stderr, Some(1)),
            "[youtube] abc: Video unavailable"
        );
    }

    #[test]
    fn error_message_falls_back_to_exit_code() {
        assert_eq!(
            extract_error_message("WARNING: meh\n", Some(2)),
            "failed with exit code 2"
        );
        assert_eq!(extract_error_message("", None), "terminated by signal");
    }

    #[test]
    fn exit_report_success() {
        let ok = ExitReport { code: Some(0), stderr: String::new() };
        let bad = ExitReport { code: Some(1), stderr: "ERROR: nope\n".to_string() };
        assert!(ok.success());
        assert!(!bad.success());
        assert_eq!(bad.error_message(), "nope");
    }

    #[tokio::test]
    async fn missing_binary_is_launch_error() {
        let launcher = TokioLauncher::new();
        let cmd = LaunchCommand::new("/nonexistent/definitely-not-a-binary", vec![]);
        let err = launcher.launch(&cmd, &mut |_| {}).await.unwrap_err();
        assert!(matches!(err, Error::Launch { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn streams_both_pipes_and_reports_exit() {
        let launcher = TokioLauncher::new();
        let cmd = LaunchCommand::new(
            "sh",
            vec![
                "-c".to_string(),
                "echo out1; echo err1 >&2; printf 'last'; exit 3".to_string(),
            ],
        );
        let mut lines = Vec::new();
        let report = launcher
            .launch(&cmd, &mut |line| lines.push(line.clone()))
            .await
            .unwrap();

        assert_eq!(report.code, Some(3));
        assert_eq!(report.stderr, "err1\n");
        let stdout: Vec<_> = lines
            .iter()
            .filter(|l| l.stream == Stream::Stdout)
            .map(|l| l.text.as_str())
            .collect();
        // Unterminated final line is still delivered.
        assert_eq!(stdout, vec!["out1", "last"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn creates_working_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let work = dir.path().join("a/b");
        let cmd = LaunchCommand::new("sh", vec!["-c".into(), "touch made".into()]).in_dir(&work);
        let report = TokioLauncher::new().launch(&cmd, &mut |_| {}).await.unwrap();
        assert!(report.success());
        assert!(work.join("made").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cancellation_kills_child() {
        let token = CancellationToken::new();
        let launcher = TokioLauncher::with_cancellation(token.clone());
        let cmd = LaunchCommand::new("sh", vec!["-c".into(), "sleep 30".into()]);
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            token.cancel();
        });
        let err = launcher.launch(&cmd, &mut |_| {}).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        canceller.await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn capture_stdout_maps_failure_to_metadata_error() {
        let launcher = TokioLauncher::new();
        let ok = LaunchCommand::new("sh", vec!["-c".into(), "echo '{\"id\":1}'".into()]);
        assert_eq!(capture_stdout(&launcher, &ok).await.unwrap(), "{\"id\":1}\n");

        let bad = LaunchCommand::new("sh", vec!["-c".into(), "echo 'ERROR: gone' >&2; exit 1".into()]);
        let err = capture_stdout(&launcher, &bad).await.unwrap_err();
        assert!(matches!(err, Error::Metadata(msg) if msg == "gone"));
    }
}
