//! State shared between the steps of one workflow run.

use crate::backup::LocalBackup;
use crate::deployment::Deployment;
use crate::{Error, NowFn, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct Session {
    deployment_name: String,

    /// Target directory for a backup, or the backup directory to restore.
    artifact_path: PathBuf,

    now: NowFn,

    /// Set by the create-artifact and validate-artifact steps
    backup: Option<Arc<LocalBackup>>,

    /// Set by the find-deployment step
    deployment: Option<Arc<Deployment>>,
}

impl Session {
    pub fn new(deployment_name: impl Into<String>, artifact_path: impl Into<PathBuf>, now: NowFn) -> Self {
        Self {
            deployment_name: deployment_name.into(),
            artifact_path: artifact_path.into(),
            now,
            backup: None,
            deployment: None,
        }
    }

    pub fn deployment_name(&self) -> &str {
        &self.deployment_name
    }

    pub fn artifact_path(&self) -> &Path {
        &self.artifact_path
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.now)()
    }

    pub fn backup(&self) -> Option<&Arc<LocalBackup>> {
        self.backup.as_ref()
    }

    pub fn require_backup(&self) -> Result<Arc<LocalBackup>> {
        self.backup
            .clone()
            .ok_or_else(|| Error::generic("no backup has been created or opened in this session"))
    }

    pub fn set_backup(&mut self, backup: Arc<LocalBackup>) {
        self.backup = Some(backup);
    }

    pub fn deployment(&self) -> Result<Arc<Deployment>> {
        self.deployment.clone().ok_or_else(|| {
            Error::generic(format!(
                "deployment '{}' has not been found in this session",
                self.deployment_name
            ))
        })
    }

    pub fn set_deployment(&mut self, deployment: Arc<Deployment>) {
        self.deployment = Some(deployment);
    }
}
