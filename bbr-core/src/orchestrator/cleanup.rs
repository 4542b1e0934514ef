//! Recovery after an interrupted run: unlock every job and remove whatever
//! artifact directories were left on the instances.

use crate::deployment::DeploymentManager;
use crate::orderer::LockOrderer;
use crate::workflow::steps::{CleanupPreviousStep, FindDeploymentStep, PostRestoreUnlockStep, UnlockStep};
use crate::workflow::{Session, Step, Workflow};
use crate::{Errors, NowFn};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

fn cleanup_workflow(
    deployment_manager: &Arc<dyn DeploymentManager>,
    unlock_name: &str,
    unlock: impl Step + 'static,
) -> Workflow {
    let mut wf = Workflow::new();
    let find = wf.add_step("find-deployment", FindDeploymentStep::new(Arc::clone(deployment_manager)));
    let unlock = wf.add_step(unlock_name, unlock);
    let cleanup = wf.add_step("cleanup-previous", CleanupPreviousStep);

    wf.on_success(find, unlock);
    wf.on_success_or_failure(unlock, cleanup);
    wf
}

pub struct BackupCleaner {
    deployment_manager: Arc<dyn DeploymentManager>,
    orderer: Arc<dyn LockOrderer>,
    now: NowFn,
}

impl BackupCleaner {
    pub fn new(deployment_manager: Arc<dyn DeploymentManager>, orderer: Arc<dyn LockOrderer>, now: NowFn) -> Self {
        Self {
            deployment_manager,
            orderer,
            now,
        }
    }

    pub async fn cleanup(&self, deployment_name: &str, cancel: &CancellationToken) -> Errors {
        info!("Cleaning up backup of {}", deployment_name);
        let wf = cleanup_workflow(
            &self.deployment_manager,
            "unlock",
            UnlockStep::new(Arc::clone(&self.orderer), false),
        );
        let mut session = Session::new(deployment_name, "", self.now.clone());
        wf.run(&mut session, cancel).await
    }
}

pub struct RestoreCleaner {
    deployment_manager: Arc<dyn DeploymentManager>,
    orderer: Arc<dyn LockOrderer>,
    now: NowFn,
}

impl RestoreCleaner {
    pub fn new(deployment_manager: Arc<dyn DeploymentManager>, orderer: Arc<dyn LockOrderer>, now: NowFn) -> Self {
        Self {
            deployment_manager,
            orderer,
            now,
        }
    }

    pub async fn cleanup(&self, deployment_name: &str, cancel: &CancellationToken) -> Errors {
        info!("Cleaning up restore of {}", deployment_name);
        let wf = cleanup_workflow(
            &self.deployment_manager,
            "post-restore-unlock",
            PostRestoreUnlockStep::new(Arc::clone(&self.orderer)),
        );
        let mut session = Session::new(deployment_name, "", self.now.clone());
        wf.run(&mut session, cancel).await
    }
}
