//! Jobs: the backup-aware software components running on an instance.

pub mod discovery;
pub mod script;

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use discovery::discover_jobs;
pub use script::{ScriptJob, ScriptKind, Scripts};

/// Names a job across the deployment, independent of the instance it runs on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobSpecifier {
    pub name: String,
    pub release: String,
}

impl JobSpecifier {
    pub fn new(name: impl Into<String>, release: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            release: release.into(),
        }
    }
}

/// Properties of a job that cannot be discovered from its scripts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProperties {
    pub name: String,

    #[serde(default)]
    pub release: String,

    /// Back up from the bootstrap instance only; restore on every instance.
    #[serde(default)]
    pub backup_one_restore_all: bool,
}

/// Lifecycle contract of a job.
#[async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &str;

    fn release(&self) -> &str;

    /// `<instance-name>/<instance-id>` of the hosting instance.
    fn instance_identifier(&self) -> &str;

    fn has_backup(&self) -> bool;

    fn has_restore(&self) -> bool;

    /// Custom artifact this job produces, if it does not use the default one.
    fn backup_artifact_name(&self) -> Option<&str>;

    /// Custom artifact this job consumes, if it does not use the default one.
    fn restore_artifact_name(&self) -> Option<&str>;

    fn has_named_backup_artifact(&self) -> bool {
        self.backup_artifact_name().is_some()
    }

    fn has_named_restore_artifact(&self) -> bool {
        self.restore_artifact_name().is_some()
    }

    /// Remote directory the backup script writes into.
    fn backup_artifact_directory(&self) -> String;

    /// Remote directory the restore script reads from.
    fn restore_artifact_directory(&self) -> String;

    /// Jobs that must be locked after this one for backup.
    fn backup_should_be_locked_before(&self) -> &[JobSpecifier];

    /// Jobs that must be locked after this one for restore.
    fn restore_should_be_locked_before(&self) -> &[JobSpecifier];

    fn specifier(&self) -> JobSpecifier {
        JobSpecifier::new(self.name(), self.release())
    }

    async fn pre_backup_lock(&self) -> Result<()>;

    async fn backup(&self) -> Result<()>;

    async fn post_backup_unlock(&self, after_successful_backup: bool) -> Result<()>;

    async fn pre_restore_lock(&self) -> Result<()>;

    async fn restore(&self) -> Result<()>;

    async fn post_restore_unlock(&self) -> Result<()>;
}
