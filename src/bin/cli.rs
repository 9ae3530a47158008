//! adsync CLI
//!
//! Local execution entry point for one-shot syncs, dry runs and
//! operational checks. Intended to be driven by a scheduler (cron,
//! systemd timer) — each invocation is one bounded run.

use std::path::PathBuf;
use std::sync::Arc;

use adsync::{
    dispatch::LogEvents,
    error::Result,
    models::{Config, SyncOptions},
    pipeline::CancelToken,
    service::SyncService,
    storage::{LocalStore, SourceStateStore},
};
use clap::{Parser, Subcommand};

/// adsync - Ad-network creative synchronizer
#[derive(Parser, Debug)]
#[command(name = "adsync", version, about = "Synchronizes ad-network creatives")]
struct Cli {
    /// Path to storage directory containing config and data files
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one synchronization cycle
    Sync {
        /// Source to sync; all configured sources when omitted
        #[arg(long)]
        source: Option<String>,

        /// Cap on items processed this run
        #[arg(long)]
        max_items: Option<usize>,

        /// Page size requested from the API
        #[arg(long)]
        batch_size: Option<usize>,

        /// Status filter for snapshot sources (active, inactive, all)
        #[arg(long)]
        status: Option<String>,

        /// Compute counts without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Check that a source's API is reachable
    Test {
        #[arg(long)]
        source: String,
    },

    /// Remove records inactive longer than the retention window
    Cleanup {
        #[arg(long)]
        source: String,

        /// Retention window in days (config default when omitted)
        #[arg(long)]
        days: Option<i64>,
    },

    /// Validate configuration files
    Validate,

    /// Show per-source run state
    Info,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    log::info!("adsync starting...");

    let config_path = cli.storage_dir.join("config.toml");
    let config = Config::load_or_default(&config_path);

    let store = Arc::new(LocalStore::open(&cli.storage_dir).await?);
    let service = SyncService::new(config, store.clone(), Arc::new(LogEvents));

    match cli.command {
        Command::Sync {
            source,
            max_items,
            batch_size,
            status,
            dry_run,
        } => {
            let options = SyncOptions {
                max_items_per_run: max_items,
                batch_size,
                status,
                start_page: None,
            };
            let cancel = CancelToken::new();

            match source {
                Some(id) => {
                    let result = if dry_run {
                        service.dry_run(&id, &options, &cancel).await?
                    } else {
                        service.parse_and_sync(&id, &options, &cancel).await?
                    };
                    print_result(&result);
                }
                None => {
                    if dry_run {
                        let sources = service.config().sources.clone();
                        for source in &sources {
                            let result = service.dry_run(&source.id, &options, &cancel).await?;
                            print_result(&result);
                        }
                    } else {
                        let results = service.sync_all(&options, &cancel).await;
                        let mut failures = 0;
                        for (id, outcome) in results {
                            match outcome {
                                Ok(result) => print_result(&result),
                                Err(e) => {
                                    failures += 1;
                                    log::error!("{id}: {e}");
                                }
                            }
                        }
                        if failures > 0 {
                            return Err(adsync::error::AppError::config(format!(
                                "{failures} source(s) failed"
                            )));
                        }
                    }
                }
            }
        }

        Command::Test { source } => match service.test_connection(&source).await {
            Ok(count) => log::info!("{source}: connection OK ({count} sample items)"),
            Err(e) => {
                log::error!("{source}: connection failed: {e}");
                return Err(e);
            }
        },

        Command::Cleanup { source, days } => {
            let removed = service.cleanup(&source, days).await?;
            log::info!("{source}: {removed} stale records removed");
        }

        Command::Validate => {
            log::info!("Validating configuration...");
            if let Err(e) = service.config().validate() {
                log::error!("Config validation failed: {e}");
                return Err(e);
            }
            log::info!("✓ Config OK ({} sources)", service.config().sources.len());
        }

        Command::Info => {
            log::info!("Storage directory: {}", cli.storage_dir.display());
            for source in &service.config().sources {
                match store.load(&source.id).await? {
                    Some(state) => {
                        log::info!(
                            "{}: status {:?}, cursor {:?}, last run {}",
                            source.id,
                            state.status,
                            state.cursor,
                            state
                                .last_run_at
                                .map(|t| t.to_rfc3339())
                                .unwrap_or_else(|| "never".into())
                        );
                        if let Some(error) = &state.last_error {
                            log::warn!(
                                "{}: last error at {} in {}: {}",
                                source.id,
                                error.at.to_rfc3339(),
                                error.location,
                                error.message
                            );
                        }
                    }
                    None => log::info!("{}: never run", source.id),
                }
            }
        }
    }

    log::info!("Done!");

    Ok(())
}

fn print_result(result: &adsync::models::RunResult) {
    log::info!(
        "{}{}: {} processed, {} saved, {} duplicates, {} new, {} deactivated, {} errors, {} batches in {:.2}s ({:?})",
        result.source_id,
        if result.dry_run { " [dry-run]" } else { "" },
        result.stats.processed,
        result.stats.saved,
        result.stats.duplicates_skipped,
        result.stats.new_count,
        result.stats.deactivated_count,
        result.stats.errors,
        result.stats.batches_processed,
        result.duration_seconds,
        result.reason
    );
}
