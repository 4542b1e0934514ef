//! A deployment: every instance of one named cluster, and the operations that
//! fan out over all of their jobs.

pub mod manager;

use crate::executor::{Executable, ExecutablePhases, Executor, JobAction, JobExecutable, SerialExecutor};
use crate::instance::Instance;
use crate::job::Job;
use crate::orderer::{reversed, LockOrderer, Phases};
use crate::remote::ARTIFACT_DIRECTORY;
use crate::{Error, Errors, Result};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

pub use manager::DeploymentManager;

pub struct Deployment {
    name: String,
    instances: Vec<Arc<dyn Instance>>,
    executor: Arc<dyn Executor>,
}

impl Deployment {
    pub fn new(name: impl Into<String>, instances: Vec<Arc<dyn Instance>>, executor: Arc<dyn Executor>) -> Self {
        Self {
            name: name.into(),
            instances,
            executor,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instances(&self) -> &[Arc<dyn Instance>] {
        &self.instances
    }

    fn jobs(&self) -> Vec<Arc<dyn Job>> {
        self.instances
            .iter()
            .flat_map(|i| i.jobs().iter().cloned())
            .collect()
    }

    pub fn is_backupable(&self) -> bool {
        self.instances.iter().any(|i| i.is_backupable())
    }

    pub fn is_restorable(&self) -> bool {
        self.instances.iter().any(|i| i.is_restorable())
    }

    /// No two jobs name the same custom backup artifact.
    pub fn has_unique_custom_artifact_names(&self) -> bool {
        let mut seen = HashSet::new();
        self.instances
            .iter()
            .flat_map(|i| i.custom_backup_artifact_names())
            .all(|name| seen.insert(name))
    }

    /// Every custom artifact a restore script expects is produced by some
    /// backup script in the deployment.
    pub fn custom_artifact_names_match(&self) -> Result<()> {
        let produced: HashSet<String> = self
            .instances
            .iter()
            .flat_map(|i| i.custom_backup_artifact_names())
            .collect();

        for job in self.jobs() {
            if let Some(expected) = job.restore_artifact_name() {
                if !produced.contains(expected) {
                    return Err(Error::generic(format!(
                        "The {} restore script expects a backup script which produces {} artifact which is not present in the deployment.",
                        job.name(),
                        expected
                    )));
                }
            }
        }
        Ok(())
    }

    /// One error per instance that already has an artifact directory.
    pub async fn check_artifact_dir(&self) -> Errors {
        let mut errors = Errors::new();
        for instance in &self.instances {
            match instance.artifact_dir_exists().await {
                Ok(false) => {}
                Ok(true) => errors.push(Error::generic(format!(
                    "Directory {} already exists on instance {}",
                    ARTIFACT_DIRECTORY,
                    instance.identifier()
                ))),
                Err(e) => errors.push(e),
            }
        }
        errors
    }

    pub fn validate_locking_dependencies(&self, orderer: &dyn LockOrderer) -> Result<()> {
        orderer.order(&self.jobs()).map(|_| ())
    }

    pub async fn pre_backup_lock(&self, orderer: &dyn LockOrderer) -> Errors {
        info!("Running pre-backup-lock scripts...");
        let errors = self.run_ordered(orderer, JobAction::PreBackupLock, false).await;
        info!("Finished running pre-backup-lock scripts.");
        errors
    }

    pub async fn backup(&self) -> Errors {
        info!("Running backup scripts...");
        let phase: Vec<Arc<dyn Executable>> = self
            .jobs()
            .into_iter()
            .filter(|j| j.has_backup())
            .map(|j| job_executable(j, JobAction::Backup))
            .collect();
        let errors = self.executor.run(vec![phase]).await;
        info!("Finished running backup scripts.");
        errors
    }

    pub async fn post_backup_unlock(&self, after_successful_backup: bool, orderer: &dyn LockOrderer) -> Errors {
        info!("Running post-backup-unlock scripts...");
        let action = if after_successful_backup {
            JobAction::PostSuccessfulBackupUnlock
        } else {
            JobAction::PostFailedBackupUnlock
        };
        let errors = self.run_ordered(orderer, action, true).await;
        info!("Finished running post-backup-unlock scripts.");
        errors
    }

    pub async fn pre_restore_lock(&self, orderer: &dyn LockOrderer) -> Errors {
        info!("Running pre-restore-lock scripts...");
        let errors = self.run_ordered(orderer, JobAction::PreRestoreLock, false).await;
        info!("Finished running pre-restore-lock scripts.");
        errors
    }

    /// Restore scripts run one at a time.
    pub async fn restore(&self) -> Errors {
        info!("Running restore scripts...");
        let phase: Vec<Arc<dyn Executable>> = self
            .jobs()
            .into_iter()
            .filter(|j| j.has_restore())
            .map(|j| job_executable(j, JobAction::Restore))
            .collect();
        let errors = SerialExecutor.run(vec![phase]).await;
        info!("Finished running restore scripts.");
        errors
    }

    pub async fn post_restore_unlock(&self, orderer: &dyn LockOrderer) -> Errors {
        info!("Running post-restore-unlock scripts...");
        let errors = self.run_ordered(orderer, JobAction::PostRestoreUnlock, true).await;
        info!("Finished running post-restore-unlock scripts.");
        errors
    }

    pub async fn cleanup(&self) -> Errors {
        let mut errors = Errors::new();
        for instance in &self.instances {
            if let Err(e) = instance.cleanup().await {
                warn!("Cleanup failed on {}: {}", instance.identifier(), e);
                errors.push(e);
            }
        }
        errors
    }

    pub async fn cleanup_previous(&self) -> Errors {
        let mut errors = Errors::new();
        for instance in self
            .instances
            .iter()
            .filter(|i| i.is_backupable() || i.is_restorable())
        {
            if let Err(e) = instance.cleanup_previous().await {
                errors.push(e);
            }
        }
        errors
    }

    async fn run_ordered(&self, orderer: &dyn LockOrderer, action: JobAction, reverse: bool) -> Errors {
        let phases = match orderer.order(&self.jobs()) {
            Ok(phases) if reverse => reversed(&phases),
            Ok(phases) => phases,
            Err(e) => return e.into(),
        };
        self.executor.run(executable_phases(phases, action)).await
    }
}

fn job_executable(job: Arc<dyn Job>, action: JobAction) -> Arc<dyn Executable> {
    Arc::new(JobExecutable::new(job, action))
}

fn executable_phases(phases: Phases, action: JobAction) -> ExecutablePhases {
    phases
        .into_iter()
        .map(|phase| phase.into_iter().map(|j| job_executable(j, action)).collect())
        .collect()
}
