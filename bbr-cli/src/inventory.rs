//! Deployments described by the configuration file.

use crate::config::{DeploymentConfig, InstanceConfig};
use crate::ssh::SshRunner;
use async_trait::async_trait;
use bbr_core::backup::LocalBackup;
use bbr_core::deployment::{Deployment, DeploymentManager};
use bbr_core::executor::Executor;
use bbr_core::instance::{DeployedInstance, Instance};
use bbr_core::remote::RemoteRunner;
use bbr_core::{Error, Result};
use futures_util::future::try_join_all;
use std::sync::Arc;
use tracing::info;

/// Opens a [`RemoteRunner`] to one configured instance.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, instance: &InstanceConfig) -> Result<Arc<dyn RemoteRunner>>;
}

pub struct SshConnector;

#[async_trait]
impl Connector for SshConnector {
    async fn connect(&self, instance: &InstanceConfig) -> Result<Arc<dyn RemoteRunner>> {
        let runner = SshRunner::connect(
            &instance.host,
            instance.port,
            &instance.username,
            &instance.private_key,
        )
        .await?;
        Ok(Arc::new(runner))
    }
}

pub struct InventoryDeploymentManager {
    deployments: Vec<DeploymentConfig>,
    connector: Arc<dyn Connector>,
    executor: Arc<dyn Executor>,
    bbr_version: String,
}

impl InventoryDeploymentManager {
    pub fn new(
        deployments: Vec<DeploymentConfig>,
        connector: Arc<dyn Connector>,
        executor: Arc<dyn Executor>,
        bbr_version: impl Into<String>,
    ) -> Self {
        Self {
            deployments,
            connector,
            executor,
            bbr_version: bbr_version.into(),
        }
    }

    fn lookup(&self, name: &str) -> Result<&DeploymentConfig> {
        self.deployments
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| Error::generic(format!("Deployment '{}' not found", name)))
    }

    async fn discover(&self, instance: &InstanceConfig) -> Result<Arc<dyn Instance>> {
        let runner = self.connector.connect(instance).await?;
        let deployed = DeployedInstance::discover(
            runner,
            &instance.name,
            &instance.index,
            &instance.id,
            instance.bootstrap,
            &instance.jobs,
            &self.bbr_version,
        )
        .await?;
        Ok(Arc::new(deployed))
    }
}

#[async_trait]
impl DeploymentManager for InventoryDeploymentManager {
    async fn find(&self, deployment_name: &str) -> Result<Arc<Deployment>> {
        let config = self.lookup(deployment_name)?;
        info!(
            "Connecting to {} instances of {}",
            config.instances.len(),
            deployment_name
        );

        let instances = try_join_all(config.instances.iter().map(|i| self.discover(i))).await?;
        Ok(Arc::new(Deployment::new(
            deployment_name,
            instances,
            Arc::clone(&self.executor),
        )))
    }

    async fn save_manifest(&self, deployment_name: &str, backup: &LocalBackup) -> Result<()> {
        let config = self.lookup(deployment_name)?;
        let path = config.manifest.as_ref().ok_or_else(|| {
            Error::generic(format!(
                "No manifest configured for deployment '{}'",
                deployment_name
            ))
        })?;
        let manifest = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::generic(format!("Unable to read manifest {}: {}", path.display(), e))
        })?;
        backup.save_manifest(&manifest).await
    }
}
