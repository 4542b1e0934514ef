use crate::deployment::DeploymentManager;
use crate::orderer::LockOrderer;
use crate::workflow::steps::{BackupableStep, CleanupStep, FindDeploymentStep};
use crate::workflow::{Session, Workflow};
use crate::{Errors, NowFn};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Answers whether a deployment can be backed up, without locking anything.
pub struct PreBackupChecker {
    deployment_manager: Arc<dyn DeploymentManager>,
    orderer: Arc<dyn LockOrderer>,
    now: NowFn,
}

impl PreBackupChecker {
    pub fn new(deployment_manager: Arc<dyn DeploymentManager>, orderer: Arc<dyn LockOrderer>, now: NowFn) -> Self {
        Self {
            deployment_manager,
            orderer,
            now,
        }
    }

    pub async fn check(&self, deployment_name: &str, cancel: &CancellationToken) -> Errors {
        let mut wf = Workflow::new();
        let find = wf.add_step(
            "find-deployment",
            FindDeploymentStep::new(Arc::clone(&self.deployment_manager)),
        );
        let backupable = wf.add_step("backupable", BackupableStep::new(Arc::clone(&self.orderer)));
        let cleanup = wf.add_step("cleanup", CleanupStep);
        wf.on_success(find, backupable);
        wf.on_success_or_failure(backupable, cleanup);

        let mut session = Session::new(deployment_name, "", self.now.clone());
        wf.run(&mut session, cancel).await
    }
}
