use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bucketsync::config::{BackendKind, Credentials, UploaderConfig};
use bucketsync::sync::{select_files, SyncPhase, SyncProgress, SyncStats};
use bucketsync::Uploader;

/// Upload a directory tree into a cloud bucket, skipping unchanged files.
#[derive(Parser)]
#[command(name = "bucketsync", version, about)]
struct Cli {
    /// Config file (defaults to ~/.config/bucketsync/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log every file
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload files under ORIGIN to DESTINATION in the bucket
    Upload(UploadArgs),
    /// Show which files would be uploaded and where, without connecting
    List(TargetArgs),
}

#[derive(Args)]
struct TargetArgs {
    /// Local directory to upload
    origin: PathBuf,

    /// Key prefix in the bucket
    #[arg(default_value = "")]
    destination: String,

    /// Only upload paths matching this glob (repeatable)
    #[arg(long)]
    allow: Vec<String>,

    /// Never upload paths matching this glob (repeatable)
    #[arg(long)]
    disallow: Vec<String>,
}

#[derive(Args)]
struct UploadArgs {
    #[command(flatten)]
    target: TargetArgs,

    #[arg(long)]
    bucket: Option<String>,

    #[arg(long, value_enum)]
    backend: Option<BackendKind>,

    /// Service account JSON file (GCS)
    #[arg(long)]
    credentials: Option<PathBuf>,

    /// Make uploaded objects publicly readable
    #[arg(long)]
    public: bool,

    /// Maximum transfers in flight
    #[arg(long)]
    concurrency: Option<usize>,

    /// Custom endpoint (emulator or S3-compatible provider)
    #[arg(long)]
    endpoint: Option<String>,

    #[arg(long)]
    region: Option<String>,
}

fn init_logging(debug: bool) {
    let default_filter = if debug { "bucketsync=debug" } else { "bucketsync=warn" };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(cli: &Cli) -> Result<UploaderConfig> {
    let mut config = match &cli.config {
        Some(path) => UploaderConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => UploaderConfig::load_default().context("Failed to load default config")?,
    };
    config.debug |= cli.debug;
    Ok(config)
}

fn apply_target(config: &mut UploaderConfig, target: &TargetArgs) {
    config.allow.extend(target.allow.iter().cloned());
    config.disallow.extend(target.disallow.iter().cloned());
}

fn apply_upload_args(config: &mut UploaderConfig, args: &UploadArgs) {
    apply_target(config, &args.target);

    if let Some(bucket) = &args.bucket {
        config.bucket = bucket.clone();
    }
    if let Some(backend) = args.backend {
        config.backend = backend;
    }
    if let Some(path) = &args.credentials {
        config.credentials = Credentials::ServiceAccountFile { path: path.clone() };
    }
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
    }
    if let Some(endpoint) = &args.endpoint {
        config.endpoint = Some(endpoint.clone());
    }
    if let Some(region) = &args.region {
        config.region = Some(region.clone());
    }
    config.public |= args.public;
}

/// Drive a progress bar from engine updates until the channel closes.
async fn render_progress(mut rx: mpsc::Receiver<SyncProgress>) {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files ({percent}%) | {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );

    while let Some(progress) = rx.recv().await {
        match progress.phase {
            SyncPhase::Selecting => pb.set_message("selecting files"),
            SyncPhase::Uploading => {
                pb.set_length(progress.total_files as u64);
                pb.set_position(progress.files_done as u64);
                pb.set_message(humansize::format_size(progress.bytes_done, humansize::BINARY));
            }
            SyncPhase::Complete | SyncPhase::Failed => {
                pb.finish_and_clear();
                break;
            }
        }
    }
}

fn print_summary(stats: &SyncStats) {
    println!(
        "{} {} uploaded, {} skipped, {} in {:.1}s ({}/s)",
        "Done:".green().bold(),
        stats.files_uploaded,
        stats.files_skipped,
        humansize::format_size(stats.bytes_transferred, humansize::BINARY),
        stats.duration.as_secs_f64(),
        humansize::format_size(stats.rate() as u64, humansize::BINARY)
    );
}

async fn run_upload(mut config: UploaderConfig, args: UploadArgs) -> Result<()> {
    apply_upload_args(&mut config, &args);

    let mut uploader = Uploader::from_config(&config)?;

    let renderer = if config.debug {
        None
    } else {
        let (tx, rx) = mpsc::channel(64);
        uploader = uploader.with_progress(tx);
        Some(tokio::spawn(render_progress(rx)))
    };

    let result = uploader
        .upload(&args.target.origin, &args.target.destination)
        .await;

    // Closing the channel lets the renderer exit
    drop(uploader);
    if let Some(handle) = renderer {
        let _ = handle.await;
    }

    let stats = result?;
    print_summary(&stats);
    Ok(())
}

async fn run_list(mut config: UploaderConfig, args: TargetArgs) -> Result<()> {
    apply_target(&mut config, &args);
    let filter = config.filter()?;

    let files = select_files(&args.origin, &args.destination, &filter).await?;
    for file in &files {
        println!("{} -> {}", file.origin.display(), file.destination.cyan());
    }
    println!("{} files selected", files.len());
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{} {:#}", "Error:".red().bold(), err);
            std::process::exit(2);
        }
    };
    init_logging(config.debug);

    let res = match cli.command {
        Command::Upload(args) => run_upload(config, args).await,
        Command::List(args) => run_list(config, args).await,
    };

    if let Err(err) = res {
        eprintln!("{} {:#}", "Error:".red().bold(), err);
        std::process::exit(1);
    }
}
