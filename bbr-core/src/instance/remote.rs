//! Instances reached through a [`RemoteRunner`].

use super::Instance;
use crate::artifact::{ArtifactIdentifier, RemoteArtifact, RemoteDirArtifact};
use crate::job::script::JobHost;
use crate::job::{discover_jobs, Job, JobProperties};
use crate::remote::{RemoteRunner, ARTIFACT_DIRECTORY};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

pub struct DeployedInstance {
    name: String,
    index: String,
    id: String,
    runner: Arc<dyn RemoteRunner>,
    jobs: Vec<Arc<dyn Job>>,
    artifact_dir_created: Arc<AtomicBool>,
}

impl DeployedInstance {
    pub fn new(
        name: impl Into<String>,
        index: impl Into<String>,
        id: impl Into<String>,
        runner: Arc<dyn RemoteRunner>,
        jobs: Vec<Arc<dyn Job>>,
        artifact_dir_created: Arc<AtomicBool>,
    ) -> Self {
        Self {
            name: name.into(),
            index: index.into(),
            id: id.into(),
            runner,
            jobs,
            artifact_dir_created,
        }
    }

    /// Connect the jobs found on the instance behind `runner`.
    pub async fn discover(
        runner: Arc<dyn RemoteRunner>,
        name: impl Into<String>,
        index: impl Into<String>,
        id: impl Into<String>,
        bootstrap: bool,
        properties: &[JobProperties],
        bbr_version: &str,
    ) -> Result<Self> {
        let name = name.into();
        let id = id.into();
        let host = JobHost {
            instance_name: name.clone(),
            instance_id: id.clone(),
            bootstrap,
        };
        let created = Arc::new(AtomicBool::new(false));
        let jobs = discover_jobs(
            Arc::clone(&runner),
            &host,
            properties,
            bbr_version,
            Arc::clone(&created),
        )
        .await?;
        debug!("Found {} jobs on {}/{}", jobs.len(), name, id);

        Ok(Self::new(name, index, id, runner, jobs, created))
    }

    fn artifact_for(&self, job: &dyn Job, custom_name: Option<&str>, directory: String) -> Arc<dyn RemoteArtifact> {
        let identifier = match custom_name {
            Some(name) => ArtifactIdentifier::custom(name),
            None => ArtifactIdentifier::default_artifact(&self.name, &self.index, &self.id, job.name()),
        };
        Arc::new(RemoteDirArtifact::new(
            Arc::clone(&self.runner),
            identifier,
            &self.name,
            &self.id,
            directory,
        ))
    }

    async fn remove_artifact_directory(&self) -> Result<()> {
        let output = self
            .runner
            .run(&format!("sudo rm -rf {}", ARTIFACT_DIRECTORY))
            .await?;
        if !output.success() {
            return Err(Error::Remote(format!(
                "Unable to clean up backup artifacts on {}: {}",
                self.identifier(),
                output.stderr_str().trim()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Instance for DeployedInstance {
    fn name(&self) -> &str {
        &self.name
    }

    fn index(&self) -> &str {
        &self.index
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn jobs(&self) -> &[Arc<dyn Job>] {
        &self.jobs
    }

    async fn artifact_dir_exists(&self) -> Result<bool> {
        let output = self
            .runner
            .run(&format!("stat {}", ARTIFACT_DIRECTORY))
            .await?;
        Ok(output.success())
    }

    fn artifacts_to_backup(&self) -> Vec<Arc<dyn RemoteArtifact>> {
        self.jobs
            .iter()
            .filter(|j| j.has_backup())
            .map(|j| self.artifact_for(j.as_ref(), j.backup_artifact_name(), j.backup_artifact_directory()))
            .collect()
    }

    fn artifacts_to_restore(&self) -> Vec<Arc<dyn RemoteArtifact>> {
        self.jobs
            .iter()
            .filter(|j| j.has_restore())
            .map(|j| self.artifact_for(j.as_ref(), j.restore_artifact_name(), j.restore_artifact_directory()))
            .collect()
    }

    fn mark_artifact_dir_created(&self) {
        self.artifact_dir_created.store(true, Ordering::SeqCst);
    }

    fn artifact_dir_created(&self) -> bool {
        self.artifact_dir_created.load(Ordering::SeqCst)
    }

    async fn cleanup(&self) -> Result<()> {
        let removed = if self.artifact_dir_created() {
            info!("Cleaning up backup artifacts on {}", self.identifier());
            self.remove_artifact_directory().await
        } else {
            Ok(())
        };
        let closed = self.runner.close().await;
        removed.and(closed)
    }

    async fn cleanup_previous(&self) -> Result<()> {
        info!("Removing {} on {}", ARTIFACT_DIRECTORY, self.identifier());
        self.remove_artifact_directory().await
    }
}
