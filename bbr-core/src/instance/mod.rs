//! Instances: the VMs of a deployment and the jobs they host.

pub mod remote;

use crate::artifact::RemoteArtifact;
use crate::job::Job;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

pub use remote::DeployedInstance;

/// One VM, identified by `(name, index, id)`.
#[async_trait]
pub trait Instance: Send + Sync {
    /// Instance group name
    fn name(&self) -> &str;

    fn index(&self) -> &str;

    fn id(&self) -> &str;

    fn jobs(&self) -> &[Arc<dyn Job>];

    /// `<name>/<id>`
    fn identifier(&self) -> String {
        format!("{}/{}", self.name(), self.id())
    }

    fn is_backupable(&self) -> bool {
        self.jobs().iter().any(|j| j.has_backup())
    }

    fn is_restorable(&self) -> bool {
        self.jobs().iter().any(|j| j.has_restore())
    }

    fn custom_backup_artifact_names(&self) -> Vec<String> {
        self.jobs()
            .iter()
            .filter_map(|j| j.backup_artifact_name().map(str::to_string))
            .collect()
    }

    /// Whether the remote artifact directory is already present.
    async fn artifact_dir_exists(&self) -> Result<bool>;

    /// One artifact per job with a backup script.
    fn artifacts_to_backup(&self) -> Vec<Arc<dyn RemoteArtifact>>;

    /// One artifact per job with a restore script.
    fn artifacts_to_restore(&self) -> Vec<Arc<dyn RemoteArtifact>>;

    /// Record that this session created the remote artifact directory.
    fn mark_artifact_dir_created(&self);

    fn artifact_dir_created(&self) -> bool;

    /// Remove what this session left behind, then drop the connection.
    async fn cleanup(&self) -> Result<()>;

    /// Remove the remote artifact directory whoever created it.
    async fn cleanup_previous(&self) -> Result<()>;
}
