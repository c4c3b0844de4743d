pub mod cli;
pub mod db;
pub mod error;
pub mod models;
pub mod presence;
pub mod report;
pub mod scanning;
pub mod settings;
mod utils;
pub mod vendor;

use anyhow::{bail, Result};
use clap::Parser;
use log::{error, info, warn};

use cli::{BackendKind, Cli, Commands, ReportCommand, ScanArgs};
use db::Database;
use presence::{PresenceTracker, TrackerConfig};
use report::{format_device, format_stats, Reporter};
use scanning::{ReplayBackend, ScanBackend, ScanController, ScanSchedule, SimulatedBackend};

/// Parses the command line, runs it and returns the process exit code.
pub fn run() -> i32 {
    // Initialize logging; RUST_LOG overrides the info default
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Failed to start async runtime: {err}");
            return 1;
        }
    };

    runtime.block_on(async {
        match &cli.command {
            Commands::Scan(args) => match run_scan(&cli, args).await {
                Ok(()) => 0,
                Err(err) => {
                    error!("Scan stopped: {err:#}");
                    1
                }
            },
            Commands::Report(command) => match run_report(&cli, command).await {
                Ok(()) => 0,
                Err(err) => {
                    eprintln!("Error during report generation: {err:#}");
                    1
                }
            },
        }
    })
}

pub async fn run_scan(cli: &Cli, args: &ScanArgs) -> Result<()> {
    let mut settings = cli.base_settings()?;
    args.apply(&mut settings);
    settings.validate()?;

    let backend: Box<dyn ScanBackend> = match args.backend {
        BackendKind::Simulated => Box::new(SimulatedBackend::new(args.population)),
        BackendKind::Replay => Box::new(ReplayBackend::from_file(args.replay_file()?)?),
    };

    let database = Database::new(settings.database_path.clone())?
        .with_anonymization(settings.anonymize_devices, settings.anonymize_event_log);

    // Pick up identities that were still in range when the last run stopped.
    let mut tracker = PresenceTracker::new(TrackerConfig::from(&settings));
    if settings.anonymize_event_log {
        info!("Event log is anonymized; previous run's identities cannot be resumed");
    } else {
        let tracked = database.tracked_identities().await?;
        let restored = tracker.restore(&tracked);
        if restored > 0 {
            warn!("Resumed tracking {restored} identities from the previous run");
        }
    }

    let mut controller = ScanController::new();
    let cancel_token = controller.start(
        backend,
        tracker,
        database,
        ScanSchedule::from(&settings),
    )?;

    let signal_task = tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown requested");
        cancel_token.cancel();
    });

    let result = controller.wait().await;
    signal_task.abort();
    result?;
    Ok(())
}

pub async fn run_report(cli: &Cli, command: &ReportCommand) -> Result<()> {
    let settings = cli.base_settings()?;
    if !settings.database_path.exists() {
        bail!("no database at {}", settings.database_path.display());
    }
    let reporter = Reporter::new(Database::new(settings.database_path)?);

    match command {
        ReportCommand::ListDevices { active } => {
            let devices = reporter.list_devices(*active).await?;
            if devices.is_empty() {
                println!("No devices found.");
            }
            for device in &devices {
                println!("{}", format_device(device));
            }
        }
        ReportCommand::Stats => {
            let stats = reporter.stats().await?;
            print!("{}", format_stats(&stats));
        }
        ReportCommand::ExportCsv { path } => {
            reporter.export_csv(path).await?;
            println!("Data exported to {}", path.display());
        }
    }
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(err) => {
            warn!("Failed to install SIGTERM handler: {err}");
            ctrl_c_or_forever().await;
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    ctrl_c_or_forever().await;
}

async fn ctrl_c_or_forever() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {err}");
        std::future::pending::<()>().await;
    }
}
