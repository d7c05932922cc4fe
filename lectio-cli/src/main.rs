use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::Parser;
use indicatif::MultiProgress;
use lectio_engine::{
    ContentStore, CookieFile, DownloaderConfig, EventCallback, Pipeline, PipelineConfig,
    Transport, decrypt_pass_all,
};
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use url::Url;

mod cli;
mod error;
mod progress;

use cli::CliArgs;
use error::AppError;
use progress::ProgressManager;

fn main() {
    if let Err(e) = bootstrap() {
        eprintln!("Error: {e}");
        // Log the full error for debugging
        error!(error = ?e, "Application failed");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn bootstrap() -> Result<(), AppError> {
    // Parse command-line arguments
    let args = CliArgs::parse();

    // Setup logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open("lectio.log")?;

    let multi_writer = MakeWriterExt::and(std::io::stdout, log_file);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(multi_writer)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| AppError::Initialization(e.to_string()))?;

    let trainer_ids = collect_trainer_ids(&args)?;
    info!(trainers = trainer_ids.len(), "starting run");

    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("./download"));
    let store = ContentStore::new(output_dir);

    // Create a progress manager based on the show_progress flag
    let multi = MultiProgress::new();
    let progress_manager = if args.show_progress {
        ProgressManager::new(multi)
    } else {
        ProgressManager::new_disabled(multi)
    };
    let progress_manager = Arc::new(progress_manager);
    let callback: EventCallback = {
        let progress_manager = progress_manager.clone();
        Arc::new(move |event| progress_manager.handle_event(event))
    };

    if args.decrypt_only {
        let summary = decrypt_pass_all(&store, &trainer_ids, Some(callback)).await;
        if summary.has_failures() {
            warn!(%summary, "decrypt pass finished with failures");
        }
        return Ok(());
    }

    let base_url = parse_base_url(args.base_url.as_deref())?;
    let credentials = CookieFile::load(&args.cookies)?;

    let config = DownloaderConfig::builder()
        .with_timeout(Duration::from_secs(args.timeout))
        .with_connect_timeout(Duration::from_secs(args.connect_timeout))
        .build();
    let transport = Transport::with_header_provider(&config, &credentials)?;

    let pipeline = Pipeline::new(
        transport,
        base_url,
        store,
        PipelineConfig {
            segment_concurrency: args.concurrency,
        },
    )
    .with_event_callback(callback);

    let summary = pipeline.run(&trainer_ids).await;
    if summary.has_failures() {
        warn!(%summary, "run finished with failures; re-run to resume");
    }
    Ok(())
}

/// Positional ids plus the optional list file, in that order.
fn collect_trainer_ids(args: &CliArgs) -> Result<Vec<String>, AppError> {
    let mut ids = args.trainers.clone();
    if let Some(path) = &args.trainers_file {
        let contents = std::fs::read_to_string(path)?;
        ids.extend(
            contents
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string),
        );
    }
    if ids.is_empty() {
        return Err(AppError::InvalidInput(
            "no trainer ids given; pass ids as arguments or via --trainers-file".to_string(),
        ));
    }
    Ok(ids)
}

/// The service root the API endpoints resolve against. A trailing slash is
/// required for URL joins to keep the full path.
fn parse_base_url(base_url: Option<&str>) -> Result<Url, AppError> {
    let raw = base_url.ok_or_else(|| {
        AppError::InvalidInput("--base-url is required unless --decrypt-only is set".to_string())
    })?;
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&normalized)
        .map_err(|e| AppError::InvalidInput(format!("invalid base URL {raw}: {e}")))
}
