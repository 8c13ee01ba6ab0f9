//! usergrid-migrate - Parallel entity migrator
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use usergrid_migrate::config::{CliArgs, MigrateConfig};
use usergrid_migrate::pipeline::{CreateNew, MigrationCoordinator};
use usergrid_migrate::store::{RestStore, StoreClient};

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    // Parse CLI arguments
    let args = CliArgs::parse();

    setup_logging(args.verbose)?;

    // Validate and create config
    let config = MigrateConfig::from_args(args).context("Invalid configuration")?;
    let config = Arc::new(config);

    let source: Arc<dyn StoreClient> = Arc::new(
        RestStore::new(&config.source.endpoint).context("Failed to create source client")?,
    );
    let target: Arc<dyn StoreClient> = Arc::new(
        RestStore::new(&config.target.endpoint).context("Failed to create target client")?,
    );
    let handler = Arc::new(CreateNew::new(Arc::new(config.mapping.clone())));

    let coordinator = MigrationCoordinator::new(Arc::clone(&config), source, target, handler);

    // Setup signal handler for hard shutdown
    let shutdown_flag = coordinator.shutdown_flag();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, shutting down...");
        shutdown_flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")?;

    let result = coordinator.run().context("Migration failed")?;

    if result.completed {
        info!(
            published = result.enumeration.published,
            duration_secs = result.duration.as_secs(),
            "All done!!"
        );
    } else {
        info!("Migration was interrupted before completion");
    }

    Ok(())
}

fn setup_logging(verbose: bool) -> Result<()> {
    let default_filter = if verbose {
        "usergrid_migrate=debug,warn"
    } else {
        "usergrid_migrate=info,warn"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .with_file(false)
        .with_line_number(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))?;

    Ok(())
}
