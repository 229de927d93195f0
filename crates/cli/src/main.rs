use crate::{
    commands::{Commands, GlobalArgs},
    error::CliError,
    settings::Resolver,
    shutdown::{ExitCode, ShutdownCoordinator},
};
use clap::Parser;
use engine_config::catalog::{JobCatalog, file::FileJobCatalog};
use engine_core::state::{RunStore, sled_store::SledRunStore};
use engine_runtime::service::{MigrationService, RunHandle, RunParams};
use model::execution::run::RunStatus;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod commands;
mod conn;
mod env;
mod error;
mod output;
mod settings;
mod shutdown;

#[derive(Parser)]
#[command(name = "migrate", version = "0.1.0", about = "Relational to document migration tool")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    let code = match execute(cli).await {
        Ok(code) => code,
        Err(err) => {
            error!(error = %err, "Command failed");
            eprintln!("Error: {err}");
            ExitCode::GeneralError
        }
    };

    std::process::exit(code.as_i32());
}

async fn execute(cli: Cli) -> Result<ExitCode, CliError> {
    let resolver = Resolver::from_args(cli.global)?;

    match cli.command {
        Commands::Run { job, params } => {
            let params = parse_params(&params)?;
            let service = MigrationService::from_settings(&resolver.engine_settings()?)?;
            let handle = service.run_job(&job, params).await?;
            await_run(handle).await
        }
        Commands::Restart { job, run } => {
            let service = MigrationService::from_settings(&resolver.engine_settings()?)?;
            let handle = service.restart_failed(&job, &run).await?;
            await_run(handle).await
        }
        Commands::Jobs => {
            let catalog = FileJobCatalog::new(resolver.catalog_dir());
            output::print_jobs(&catalog.job_names().await?);
            Ok(ExitCode::Success)
        }
        Commands::History { job, limit, json } => {
            let store = SledRunStore::open(resolver.state_dir()?)?;
            let runs = store.runs_for_job(&job, limit).await?;
            output::print_history(&job, &runs, json)?;
            Ok(ExitCode::Success)
        }
        Commands::Health { json } => {
            let service = MigrationService::from_settings(&resolver.engine_settings()?)?;
            let report = service.monitor().health().await;
            output::print_health(&report, json)?;
            Ok(ExitCode::Success)
        }
        Commands::TestConn { format, conn_str } => {
            conn::test_connection(&format, &conn_str).await?;
            Ok(ExitCode::Success)
        }
    }
}

/// Waits for a run, forwarding SIGINT/SIGTERM as a graceful stop.
async fn await_run(handle: RunHandle) -> Result<ExitCode, CliError> {
    let coordinator = ShutdownCoordinator::new(CancellationToken::new());
    coordinator.register_handlers();

    info!(job = %handle.job_name(), run_id = %handle.run_id(), "Waiting for run");

    let shutdown = coordinator.cancel_token();
    let stop = handle.cancel_token();
    let forward = tokio::spawn(async move {
        shutdown.cancelled().await;
        stop.cancel();
    });

    let report = handle.wait().await?;
    forward.abort();
    output::print_run_report(&report);

    let code = match report.status {
        RunStatus::Completed => ExitCode::Success,
        _ if coordinator.is_shutdown_requested() => ExitCode::ShutdownRequested,
        RunStatus::Stopped => ExitCode::ShutdownRequested,
        _ => ExitCode::GeneralError,
    };
    Ok(code)
}

fn parse_params(raw: &[String]) -> Result<RunParams, CliError> {
    raw.iter().try_fold(RunParams::now(), |params, entry| {
        match entry.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok(params.with_param(key.trim(), value.trim()))
            }
            _ => Err(CliError::InvalidParam(entry.clone())),
        }
    })
}
