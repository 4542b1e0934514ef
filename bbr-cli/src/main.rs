//! bbr - main entry point

use anyhow::Result;
use bbr_cli::{
    inventory::{InventoryDeploymentManager, SshConnector},
    report::{Outcome, Report},
    signal::ShutdownCoordinator,
    utils, Config,
};
use bbr_core::backup::{BackupManager, DirectoryBackupManager};
use bbr_core::copier::ArtifactCopier;
use bbr_core::deployment::DeploymentManager;
use bbr_core::executor::{Executor, ParallelExecutor, SerialExecutor};
use bbr_core::orchestrator::{
    BackupCleaner, BackupOptions, Backuper, PreBackupChecker, RestoreCleaner, Restorer,
};
use bbr_core::orderer::KahnLockOrderer;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "bbr", author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Shortcut for --log-level debug
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Operate on a deployment
    Deployment(DeploymentArgs),
}

#[derive(clap::Args, Debug)]
struct DeploymentArgs {
    /// Name of the deployment in the configuration file
    #[arg(short, long)]
    deployment: String,

    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Check that a deployment can be backed up
    PreBackupCheck,

    /// Back up a deployment
    Backup {
        /// Save the deployment manifest with the backup
        #[arg(long)]
        with_manifest: bool,

        /// Run backup scripts without locking or unlocking any job
        #[arg(long)]
        unsafe_lock_free: bool,

        /// Directory the backup is created in
        #[arg(long, value_name = "DIR", default_value = ".")]
        artifact_path: PathBuf,
    },

    /// Restore a deployment from a backup directory
    Restore {
        /// Backup directory to restore from
        #[arg(long, value_name = "DIR")]
        artifact_path: PathBuf,
    },

    /// Unlock jobs and remove leftovers of an interrupted backup
    BackupCleanup,

    /// Unlock jobs and remove leftovers of an interrupted restore
    RestoreCleanup,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_deref())?;

    // Initialize logging
    let log_level = if cli.debug {
        "debug"
    } else {
        cli.log_level.as_deref().unwrap_or(&config.log.level)
    };
    utils::logger::init(log_level)?;

    tracing::debug!("Starting bbr v{}", VERSION);

    let Command::Deployment(args) = cli.command;
    let deployment_name = args.deployment;

    let executor: Arc<dyn Executor> = if config.orchestrator.parallel {
        Arc::new(ParallelExecutor)
    } else {
        Arc::new(SerialExecutor)
    };
    let deployment_manager: Arc<dyn DeploymentManager> = Arc::new(InventoryDeploymentManager::new(
        config.deployments.clone(),
        Arc::new(SshConnector),
        Arc::clone(&executor),
        VERSION,
    ));
    let backup_manager: Arc<dyn BackupManager> = Arc::new(DirectoryBackupManager::new());
    let copier = ArtifactCopier::new(Arc::clone(&executor))
        .with_progress_increment(config.orchestrator.progress_increment);
    let now = bbr_core::system_clock();

    // SIGINT / SIGTERM cancel the workflow; unlock and cleanup still run
    let shutdown = Arc::new(ShutdownCoordinator::new());
    let cancel = shutdown.token();
    let signal_handle = tokio::spawn({
        let shutdown = Arc::clone(&shutdown);
        async move { shutdown.wait_for_signal().await }
    });

    let (errors, outcome) = match args.action {
        Action::PreBackupCheck => {
            let checker = PreBackupChecker::new(
                deployment_manager,
                Arc::new(KahnLockOrderer::for_backup()),
                now,
            );
            (checker.check(&deployment_name, &cancel).await, Outcome::Check)
        }
        Action::Backup {
            with_manifest,
            unsafe_lock_free,
            artifact_path,
        } => {
            let options = BackupOptions {
                artifact_path,
                with_manifest,
                unsafe_lock_free,
            };
            let backuper = Backuper::new(
                deployment_manager,
                backup_manager,
                Arc::new(KahnLockOrderer::for_backup()),
                copier,
                now,
            );
            (
                backuper.backup(&deployment_name, &options, &cancel).await,
                Outcome::Backup,
            )
        }
        Action::Restore { artifact_path } => {
            let restorer = Restorer::new(
                deployment_manager,
                backup_manager,
                Arc::new(KahnLockOrderer::for_restore()),
                copier,
                now,
            );
            (
                restorer.restore(&deployment_name, &artifact_path, &cancel).await,
                Outcome::Restore,
            )
        }
        Action::BackupCleanup => {
            let cleaner = BackupCleaner::new(
                deployment_manager,
                Arc::new(KahnLockOrderer::for_backup()),
                now,
            );
            (cleaner.cleanup(&deployment_name, &cancel).await, Outcome::Backup)
        }
        Action::RestoreCleanup => {
            let cleaner = RestoreCleaner::new(
                deployment_manager,
                Arc::new(KahnLockOrderer::for_restore()),
                now,
            );
            (cleaner.cleanup(&deployment_name, &cancel).await, Outcome::Restore)
        }
    };

    signal_handle.abort();

    let report = Report::new(&deployment_name, &errors, outcome);
    report.print();
    Ok(ExitCode::from(report.exit_code))
}
