//! Drive the migration pipeline (`repo-migrator run`).

use anyhow::{Context, Result, bail};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use repo_migrator::config::Config;
use repo_migrator::logging;
use repo_migrator::ops::RepositoryOps;
use repo_migrator::orchestrator::{DestinationGate, MigrationOrchestrator};
use repo_migrator::record::MigrationRecordStore;
use repo_migrator::record::store::StoreLock;
use repo_migrator::ui::{MigrationUI, print_summary};

use super::super::Cli;

pub async fn cmd_run(cli: &Cli, project_dir: PathBuf, only: &[String]) -> Result<()> {
    let config = Config::new(project_dir, cli.config.clone(), cli.verbose, cli.yes)?;
    config.ensure_directories()?;
    let _log_guard = logging::init(&config.log_dir, cli.verbose, config.toml.logging.json)?;

    for warning in config.toml.validate() {
        warn!("Configuration: {}", warning);
    }

    let selected = config.select_entities(only)?;
    if selected.is_empty() {
        println!();
        println!(
            "No repositories configured. Add [[repositories]] entries to {}",
            config.config_file.display()
        );
        println!();
        return Ok(());
    }

    let _lock = StoreLock::acquire(&config.state_file)
        .context("Cannot start a second run against the same project")?;
    let store = MigrationRecordStore::load(
        &config.state_file,
        &config.entities(),
        config.store_options(),
    )
    .context("Failed to load migration records")?;

    let ops = RepositoryOps::from_config(&config)?;
    if config.github_token().is_none() {
        warn!(
            "No token in ${}; destination API calls are unauthenticated",
            config.toml.destination.token_env
        );
    }
    let org = ops.org().to_string();

    let ui = Arc::new(MigrationUI::new(selected.len() as u64, cli.verbose));
    let mut orchestrator = MigrationOrchestrator::new(ops, store, org)
        .with_retry_policy(config.retry_policy())
        .with_gate(DestinationGate::new(
            config.toml.migration.empty_destination,
            cli.yes,
        ))
        .with_ui(Arc::clone(&ui))
        .keep_local(config.toml.migration.keep_local);

    let run_id = Uuid::new_v4();
    let span = info_span!("run", %run_id);
    info!(parent: &span, repositories = selected.len(), "Run started");

    let result = orchestrator
        .run_until(&selected, shutdown_signal())
        .instrument(span.clone())
        .await;
    ui.finish();

    let Some(summary) = result.context("Migration run aborted")? else {
        warn!(parent: &span, "Run interrupted");
        bail!(
            "Interrupted. Progress saved to {}; run again to resume",
            config.relative_to_project(&config.state_file).display()
        );
    };

    print_summary(&summary);
    println!(
        "Logs: {}",
        config.relative_to_project(&config.log_dir).display()
    );
    println!();

    if summary.failed > 0 {
        bail!(
            "{} of {} repositories failed; fix the causes above and run again",
            summary.failed,
            summary.total
        );
    }
    Ok(())
}

/// Resolves on Ctrl-C, or on SIGTERM where available.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Shutdown signal received");
}
