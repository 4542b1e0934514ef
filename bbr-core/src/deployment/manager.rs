use super::Deployment;
use crate::backup::LocalBackup;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Source of deployments: connects to every instance of a named deployment
/// and discovers its jobs.
#[async_trait]
pub trait DeploymentManager: Send + Sync {
    async fn find(&self, deployment_name: &str) -> Result<Arc<Deployment>>;

    /// Store the deployment's manifest alongside the backup.
    async fn save_manifest(&self, deployment_name: &str, backup: &LocalBackup) -> Result<()>;
}
