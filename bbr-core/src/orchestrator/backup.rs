use crate::backup::BackupManager;
use crate::copier::ArtifactCopier;
use crate::deployment::DeploymentManager;
use crate::orderer::LockOrderer;
use crate::workflow::steps::{
    AddFinishTimeStep, BackupStep, BackupableStep, CleanupStep, CreateArtifactStep, DrainStep,
    FindDeploymentStep, LockStep, SkipStep, UnlockStep,
};
use crate::workflow::{NodeId, Session, Step, Workflow};
use crate::{Errors, NowFn};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct BackupOptions {
    /// Directory the timestamped backup directory is created in.
    pub artifact_path: PathBuf,

    /// Store the deployment manifest as `manifest.yml`.
    pub with_manifest: bool,

    /// Run the backup scripts without locking or unlocking any job.
    pub unsafe_lock_free: bool,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            artifact_path: PathBuf::from("."),
            with_manifest: false,
            unsafe_lock_free: false,
        }
    }
}

pub struct Backuper {
    deployment_manager: Arc<dyn DeploymentManager>,
    backup_manager: Arc<dyn BackupManager>,
    orderer: Arc<dyn LockOrderer>,
    copier: ArtifactCopier,
    now: NowFn,
}

impl Backuper {
    pub fn new(
        deployment_manager: Arc<dyn DeploymentManager>,
        backup_manager: Arc<dyn BackupManager>,
        orderer: Arc<dyn LockOrderer>,
        copier: ArtifactCopier,
        now: NowFn,
    ) -> Self {
        Self {
            deployment_manager,
            backup_manager,
            orderer,
            copier,
            now,
        }
    }

    /// Back up `deployment_name` and return every error the run produced.
    pub async fn backup(
        &self,
        deployment_name: &str,
        options: &BackupOptions,
        cancel: &CancellationToken,
    ) -> Errors {
        info!("Starting backup of {}...", deployment_name);
        if options.unsafe_lock_free {
            warn!("Backing up {} without locking any job", deployment_name);
        }

        let mut session = Session::new(deployment_name, &options.artifact_path, self.now.clone());
        let errors = self.workflow(options).run(&mut session, cancel).await;

        if errors.is_empty() {
            info!("Backup of {} completed", deployment_name);
        }
        errors
    }

    fn workflow(&self, options: &BackupOptions) -> Workflow {
        let mut wf = Workflow::new();

        let find = wf.add_step(
            "find-deployment",
            FindDeploymentStep::new(Arc::clone(&self.deployment_manager)),
        );
        let backupable = wf.add_step("backupable", BackupableStep::new(Arc::clone(&self.orderer)));
        let create = wf.add_step(
            "create-artifact",
            CreateArtifactStep::new(
                Arc::clone(&self.backup_manager),
                Arc::clone(&self.deployment_manager),
                options.with_manifest,
            ),
        );
        let lock = lock_step(&mut wf, options, "lock", LockStep::new(Arc::clone(&self.orderer)));
        let backup = wf.add_step("backup", BackupStep);
        let unlock_after_success = lock_step(
            &mut wf,
            options,
            "unlock",
            UnlockStep::new(Arc::clone(&self.orderer), true),
        );
        let unlock_after_failure = lock_step(
            &mut wf,
            options,
            "unlock",
            UnlockStep::new(Arc::clone(&self.orderer), false),
        );
        let drain = wf.add_step("drain", DrainStep::new(self.copier.clone()));
        let cleanup_after_success = wf.add_step("cleanup", CleanupStep);
        let cleanup_after_failure = wf.add_step("cleanup", CleanupStep);
        let finish = wf.add_step("add-finish-time", AddFinishTimeStep);

        wf.on_success(find, backupable);
        wf.on_success(backupable, create);
        wf.on_failure(backupable, cleanup_after_failure);
        wf.on_success(create, lock);
        wf.on_failure(create, cleanup_after_failure);
        wf.on_success(lock, backup);
        wf.on_failure(lock, unlock_after_failure);
        wf.on_success(backup, unlock_after_success);
        wf.on_failure(backup, unlock_after_failure);
        wf.on_success_or_failure(unlock_after_failure, cleanup_after_failure);
        wf.on_success_or_failure(unlock_after_success, drain);
        wf.on_success(drain, cleanup_after_success);
        wf.on_failure(drain, cleanup_after_failure);
        wf.on_success_or_failure(cleanup_after_success, finish);
        wf
    }
}

/// Lock and unlock nodes turn into skips in lock-free mode.
fn lock_step(wf: &mut Workflow, options: &BackupOptions, name: &str, step: impl Step + 'static) -> NodeId {
    if options.unsafe_lock_free {
        wf.add_step(name, SkipStep::new(name))
    } else {
        wf.add_step(name, step)
    }
}
