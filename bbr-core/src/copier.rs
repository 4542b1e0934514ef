//! Moves every artifact of a deployment between the instances and a local
//! backup, one phase per direction.

use crate::backup::LocalBackup;
use crate::executor::{
    BackupDownloadExecutable, BackupUploadExecutable, Executable, Executor,
};
use crate::instance::Instance;
use crate::transfer::DEFAULT_PROGRESS_INCREMENT;
use crate::Errors;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct ArtifactCopier {
    executor: Arc<dyn Executor>,
    progress_increment: u64,
}

impl ArtifactCopier {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self {
            executor,
            progress_increment: DEFAULT_PROGRESS_INCREMENT,
        }
    }

    /// Percentage step between progress log lines.
    pub fn with_progress_increment(mut self, increment: u64) -> Self {
        self.progress_increment = increment;
        self
    }

    pub async fn download_backup_from_deployment(
        &self,
        backup: &Arc<LocalBackup>,
        instances: &[Arc<dyn Instance>],
    ) -> Errors {
        let phase: Vec<Arc<dyn Executable>> = instances
            .iter()
            .flat_map(|instance| instance.artifacts_to_backup())
            .map(|artifact| {
                Arc::new(BackupDownloadExecutable::new(
                    Arc::clone(backup),
                    artifact,
                    self.progress_increment,
                )) as Arc<dyn Executable>
            })
            .collect();

        info!("Copying {} backup artifacts to {}", phase.len(), backup.path().display());
        self.executor.run(vec![phase]).await
    }

    pub async fn upload_backup_to_deployment(
        &self,
        backup: &Arc<LocalBackup>,
        instances: &[Arc<dyn Instance>],
    ) -> Errors {
        let mut phase: Vec<Arc<dyn Executable>> = Vec::new();
        for instance in instances {
            for artifact in instance.artifacts_to_restore() {
                phase.push(Arc::new(BackupUploadExecutable::new(
                    Arc::clone(backup),
                    Arc::clone(instance),
                    artifact,
                    self.progress_increment,
                )));
            }
        }

        info!("Copying {} backup artifacts to the deployment", phase.len());
        self.executor.run(vec![phase]).await
    }
}
