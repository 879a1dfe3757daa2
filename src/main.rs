// lineage-sync - Schema reconciliation service
// Command line entry point

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use lineage_sync_lib::config::SyncConfig;
use lineage_sync_lib::engine::RunStats;
use lineage_sync_lib::metrics::{self, SyncMetricsSnapshot};
use lineage_sync_lib::observability;
use lineage_sync_lib::repository::InMemoryRepository;
use lineage_sync_lib::SyncService;

/// Number of decoded lines buffered ahead of the dispatcher
const CHANNEL_CAPACITY: usize = 64;

#[derive(Parser)]
#[command(
    name = "lineage-sync",
    version,
    about = "Reconcile schema change notifications into a lineage graph"
)]
struct Cli {
    /// JSON configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// File of JSON notifications, one per line. Reads stdin when absent.
    #[arg(long)]
    input: Option<PathBuf>,

    /// Graph snapshot loaded on start and written on exit.
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Directory for log files. Defaults to `<data_dir>/logs`.
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[derive(Serialize)]
struct Summary {
    run: RunStats,
    metrics: SyncMetricsSnapshot,
    entities: usize,
    relationships: usize,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match SyncConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let log_dir = cli.log_dir.clone().unwrap_or_else(|| config.log_dir());
    observability::init_tracing(&config, &log_dir);

    let repository = match &cli.snapshot {
        Some(path) => match InMemoryRepository::load(path) {
            Ok(repository) => repository,
            Err(e) => {
                error!(error = %e, "Failed to load snapshot");
                eprintln!("Failed to load snapshot {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => InMemoryRepository::new(),
    };
    let repository = Arc::new(repository);

    let service = SyncService::new(config, repository.clone());
    let shutdown = CancellationToken::new();
    let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received");
            signal_token.cancel();
        }
    });

    let reader = match open_input(cli.input.as_ref()).await {
        Ok(reader) => reader,
        Err(e) => {
            eprintln!("Failed to open input: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let reader_token = shutdown.clone();
    let feeder = tokio::spawn(feed_lines(reader, sender, reader_token));

    let run = service.run(receiver, shutdown).await;
    feeder.abort();

    let mut exit = ExitCode::SUCCESS;
    if let Some(path) = &cli.snapshot {
        if let Err(e) = repository.save(path) {
            error!(error = %e, "Failed to save snapshot");
            eprintln!("Failed to save snapshot {}: {}", path.display(), e);
            exit = ExitCode::FAILURE;
        }
    }

    let summary = Summary {
        run,
        metrics: metrics::snapshot(),
        entities: repository.entity_count(),
        relationships: repository.relationship_count(),
    };
    match serde_json::to_string_pretty(&summary) {
        Ok(json) => println!("{}", json),
        Err(e) => warn!(error = %e, "Failed to render summary"),
    }
    exit
}

async fn open_input(
    path: Option<&PathBuf>,
) -> std::io::Result<Box<dyn AsyncBufRead + Unpin + Send>> {
    Ok(match path {
        Some(path) => Box::new(BufReader::new(tokio::fs::File::open(path).await?)),
        None => Box::new(BufReader::new(tokio::io::stdin())),
    })
}

/// Sends every non-blank line until input ends or shutdown is requested
async fn feed_lines(
    reader: Box<dyn AsyncBufRead + Unpin + Send>,
    sender: mpsc::Sender<String>,
    shutdown: CancellationToken,
) {
    let mut lines = reader.lines();
    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => line,
        };
        match line {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => {
                if sender.send(line).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "Failed to read input");
                break;
            }
        }
    }
}
