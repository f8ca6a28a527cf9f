//! reel - download media from the command line through yt-dlp.

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::env;
use std::path::PathBuf;

use tokio_util::sync::CancellationToken;

use reel_dl::cli::{self, CliOptions};
use reel_dl::tools::{check_transcoder, require_extractor};
use reel_dl::url::validate_url;
use reel_dl::{AppConfig, Downloader, Error, MediaKind, Quality, TokioLauncher};

/// Exit status after an interrupt, as shells report SIGINT.
const EXIT_INTERRUPTED: i32 = 130;

struct Args {
    options: CliOptions,
    kind: Option<MediaKind>,
    lowest: bool,
    output: Option<PathBuf>,
    cookies: Option<PathBuf>,
    extractor: Option<PathBuf>,
    verbose: bool,
}

fn print_usage() {
    eprintln!("Usage: reel [OPTIONS] [URL]");
    eprintln!();
    eprintln!("Without a URL, reel asks for one interactively.");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -a, --audio            Download audio only (mp3)");
    eprintln!("  -V, --video-only       Download video without audio");
    eprintln!("      --lowest           Pick the lowest quality instead of the highest");
    eprintln!("  -o, --output <DIR>     Destination directory");
    eprintln!("      --cookies <FILE>   Credential file passed to the extractor");
    eprintln!("      --items <RANGE>    Entries of a playlist to fetch (e.g. 2-5 or 1,4,7)");
    eprintln!("      --extractor <PATH> yt-dlp binary to use");
    eprintln!("  -v, --verbose          Debug logging");
    eprintln!("  -h, --help             Show this help");
    eprintln!();
    eprintln!("Configuration is read from {}", AppConfig::default_path().display());
}

fn value_of(args: &[String], i: &mut usize) -> String {
    *i += 1;
    if let Some(value) = args.get(*i) {
        value.clone()
    } else {
        eprintln!("Error: {} requires a value", args[*i - 1]);
        std::process::exit(1);
    }
}

fn parse_args() -> Args {
    let args: Vec<String> = env::args().skip(1).collect();
    let mut parsed = Args {
        options: CliOptions::default(),
        kind: None,
        lowest: false,
        output: None,
        cookies: None,
        extractor: None,
        verbose: false,
    };

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-a" | "--audio" => parsed.kind = Some(MediaKind::Audio),
            "-V" | "--video-only" => parsed.kind = Some(MediaKind::VideoOnly),
            "--lowest" => parsed.lowest = true,
            "-o" | "--output" => parsed.output = Some(value_of(&args, &mut i).into()),
            "--cookies" => parsed.cookies = Some(value_of(&args, &mut i).into()),
            "--items" => parsed.options.items = Some(value_of(&args, &mut i)),
            "--extractor" => parsed.extractor = Some(value_of(&args, &mut i).into()),
            "-v" | "--verbose" => parsed.verbose = true,
            "-h" | "--help" => {
                print_usage();
                std::process::exit(0);
            }
            arg if !arg.starts_with('-') && parsed.options.url.is_none() => {
                parsed.options.url = Some(arg.to_string());
            }
            arg if !arg.starts_with('-') => {
                eprintln!("Error: only one URL may be given (got {arg})");
                std::process::exit(1);
            }
            _ => {
                eprintln!("Unknown option: {}", args[i]);
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }
    parsed
}

fn apply_overrides(config: &mut AppConfig, args: &Args) {
    if let Some(kind) = args.kind {
        config.download.kind = kind;
    }
    if args.lowest {
        config.download.quality = Quality::Lowest;
    }
    if let Some(dir) = &args.output {
        config.paths.download_dir.clone_from(dir);
    }
    if let Some(file) = &args.cookies {
        config.paths.credential_file = Some(file.clone());
    }
    if let Some(path) = &args.extractor {
        config.tools.extractor.clone_from(path);
    }
}

async fn run(mut args: Args, cancel: CancellationToken) -> reel_dl::Result<bool> {
    let mut config = AppConfig::load()?;
    apply_overrides(&mut config, &args);

    if let Some(url) = args.options.url.take() {
        args.options.url = Some(validate_url(&url)?);
    }

    let launcher = TokioLauncher::with_cancellation(cancel);
    let extractor = require_extractor(&launcher, &config.tools).await?;
    let transcoder = check_transcoder(&launcher, &config.tools).await;

    let mut downloader = Downloader::new(config, launcher)
        .with_extractor(extractor)
        .with_transcoder(transcoder);
    downloader.staging().prepare(downloader.fs()).await?;

    let result = cli::run(&mut downloader, args.options).await;

    if let Err(e) = downloader.staging().wipe(downloader.fs()).await {
        log::warn!("Could not remove staging root: {e}");
    }
    result
}

#[tokio::main]
async fn main() {
    let args = parse_args();

    let default_filter = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Interrupted, stopping");
            on_signal.cancel();
        }
    });

    let code = match run(args, cancel).await {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(Error::Cancelled) => {
            eprintln!("Interrupted.");
            EXIT_INTERRUPTED
        }
        Err(e) => {
            eprintln!("Error: {e}");
            1
        }
    };

    std::process::exit(code);
}
