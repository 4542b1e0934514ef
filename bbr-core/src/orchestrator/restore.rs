use crate::backup::BackupManager;
use crate::copier::ArtifactCopier;
use crate::deployment::DeploymentManager;
use crate::orderer::LockOrderer;
use crate::workflow::steps::{
    CleanupStep, CopyToRemoteStep, FindDeploymentStep, PostRestoreUnlockStep, PreRestoreLockStep,
    RestorableStep, RestoreStep, ValidateArtifactStep,
};
use crate::workflow::{Session, Workflow};
use crate::{Errors, NowFn};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct Restorer {
    deployment_manager: Arc<dyn DeploymentManager>,
    backup_manager: Arc<dyn BackupManager>,
    orderer: Arc<dyn LockOrderer>,
    copier: ArtifactCopier,
    now: NowFn,
}

impl Restorer {
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

    /// Restore the backup at `artifact_path` onto `deployment_name`.
    pub async fn restore(
        &self,
        deployment_name: &str,
        artifact_path: &Path,
        cancel: &CancellationToken,
    ) -> Errors {
        info!("Starting restore of {} from {}...", deployment_name, artifact_path.display());

        let mut session = Session::new(deployment_name, artifact_path, self.now.clone());
        let errors = self.workflow().run(&mut session, cancel).await;

        if errors.is_empty() {
            info!("Restore of {} completed", deployment_name);
        }
        errors
    }

    fn workflow(&self) -> Workflow {
        let mut wf = Workflow::new();

        let validate = wf.add_step(
            "validate-artifact",
            ValidateArtifactStep::new(Arc::clone(&self.backup_manager)),
        );
        let find = wf.add_step(
            "find-deployment",
            FindDeploymentStep::new(Arc::clone(&self.deployment_manager)),
        );
        let restorable = wf.add_step("restorable", RestorableStep::new(Arc::clone(&self.orderer)));
        let copy = wf.add_step("copy-to-remote", CopyToRemoteStep::new(self.copier.clone()));
        let lock = wf.add_step(
            "pre-restore-lock",
            PreRestoreLockStep::new(Arc::clone(&self.orderer)),
        );
        let restore = wf.add_step("restore", RestoreStep);
        let unlock = wf.add_step(
            "post-restore-unlock",
            PostRestoreUnlockStep::new(Arc::clone(&self.orderer)),
        );
        let cleanup = wf.add_step("cleanup", CleanupStep);

        wf.on_success(validate, find);
        wf.on_success(find, restorable);
        wf.on_success(restorable, copy);
        wf.on_failure(restorable, cleanup);
        wf.on_success(copy, lock);
        wf.on_failure(copy, cleanup);
        wf.on_success(lock, restore);
        wf.on_failure(lock, unlock);
        wf.on_success_or_failure(restore, unlock);
        wf.on_success_or_failure(unlock, cleanup);
        wf
    }
}
