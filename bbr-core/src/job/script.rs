//! Jobs backed by the lifecycle scripts they ship under `bin/bbr/`.

use super::discovery::JobMetadata;
use super::{Job, JobSpecifier};
use crate::remote::{
    sudo_with_env, RemoteRunner, ARTIFACT_DIRECTORY, ENV_AFTER_BACKUP_SUCCESSFUL,
    ENV_ARTIFACT_DIRECTORY, ENV_VERSION,
};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Recognised lifecycle script names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScriptKind {
    Backup,
    Restore,
    Metadata,
    PreBackupLock,
    PostBackupUnlock,
    PreRestoreLock,
    PostRestoreUnlock,
}

impl ScriptKind {
    pub fn from_file_name(name: &str) -> Option<Self> {
        match name {
            "backup" => Some(ScriptKind::Backup),
            "restore" => Some(ScriptKind::Restore),
            "metadata" => Some(ScriptKind::Metadata),
            "pre-backup-lock" => Some(ScriptKind::PreBackupLock),
            "post-backup-unlock" => Some(ScriptKind::PostBackupUnlock),
            "pre-restore-lock" => Some(ScriptKind::PreRestoreLock),
            "post-restore-unlock" => Some(ScriptKind::PostRestoreUnlock),
            _ => None,
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            ScriptKind::Backup => "backup",
            ScriptKind::Restore => "restore",
            ScriptKind::Metadata => "metadata",
            ScriptKind::PreBackupLock => "pre-backup-lock",
            ScriptKind::PostBackupUnlock => "post-backup-unlock",
            ScriptKind::PreRestoreLock => "pre-restore-lock",
            ScriptKind::PostRestoreUnlock => "post-restore-unlock",
        }
    }
}

/// Script kind to absolute remote path, for one job.
pub type Scripts = BTreeMap<ScriptKind, String>;

/// Where a job runs, as seen by the job.
#[derive(Debug, Clone)]
pub struct JobHost {
    /// Instance group name
    pub instance_name: String,

    pub instance_id: String,

    /// Whether this is the group's bootstrap instance
    pub bootstrap: bool,
}

pub struct ScriptJob {
    runner: Arc<dyn RemoteRunner>,
    name: String,
    release: String,
    instance_identifier: String,
    bootstrap: bool,
    scripts: Scripts,
    metadata: JobMetadata,
    backup_one_restore_all: bool,
    /// `<instance-group>-<job>-backup-one-restore-all`
    shared_artifact_name: String,
    bbr_version: String,
    /// Shared with the hosting instance; set once the artifact directory exists.
    artifact_dir_created: Arc<AtomicBool>,
}

impl ScriptJob {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        runner: Arc<dyn RemoteRunner>,
        name: impl Into<String>,
        release: impl Into<String>,
        host: &JobHost,
        scripts: Scripts,
        metadata: JobMetadata,
        backup_one_restore_all: bool,
        bbr_version: impl Into<String>,
        artifact_dir_created: Arc<AtomicBool>,
    ) -> Self {
        let name = name.into();
        Self {
            runner,
            shared_artifact_name: format!("{}-{}-backup-one-restore-all", host.instance_name, name),
            name,
            release: release.into(),
            instance_identifier: format!("{}/{}", host.instance_name, host.instance_id),
            bootstrap: host.bootstrap,
            scripts,
            metadata,
            backup_one_restore_all,
            bbr_version: bbr_version.into(),
            artifact_dir_created,
        }
    }

    fn artifact_directory_for(&self, artifact_name: Option<&str>) -> String {
        format!("{}/{}", ARTIFACT_DIRECTORY, artifact_name.unwrap_or(&self.name))
    }

    /// Only the bootstrap member of a backup-one-restore-all group runs the
    /// backup script.
    fn skips_backup_script(&self) -> bool {
        self.backup_one_restore_all && !self.bootstrap
    }

    async fn run_script(&self, kind: ScriptKind, extra_env: &[(&str, String)]) -> Result<()> {
        let Some(path) = self.scripts.get(&kind) else {
            return Ok(());
        };

        let artifact_dir = match kind {
            ScriptKind::Restore | ScriptKind::PreRestoreLock | ScriptKind::PostRestoreUnlock => {
                self.restore_artifact_directory()
            }
            _ => self.backup_artifact_directory(),
        };
        let mut env = vec![
            (ENV_ARTIFACT_DIRECTORY, format!("{}/", artifact_dir)),
            (ENV_VERSION, self.bbr_version.clone()),
        ];
        env.extend(extra_env.iter().cloned());

        info!(
            "Running {} script for job {} on {}",
            kind.file_name(),
            self.name,
            self.instance_identifier
        );
        let output = self.runner.run(&sudo_with_env(&env, path)).await?;
        debug!(
            "{} script for job {} on {} wrote: {}",
            kind.file_name(),
            self.name,
            self.instance_identifier,
            output.stdout_str().trim()
        );

        if !output.success() {
            return Err(Error::Remote(format!(
                "Error attempting to run {} script for job {} on {}. Error: {}",
                kind.file_name(),
                self.name,
                self.instance_identifier,
                output.stderr_str().trim()
            )));
        }

        info!(
            "Finished running {} script for job {} on {}",
            kind.file_name(),
            self.name,
            self.instance_identifier
        );
        Ok(())
    }
}

#[async_trait]
impl Job for ScriptJob {
    fn name(&self) -> &str {
        &self.name
    }

    fn release(&self) -> &str {
        &self.release
    }

    fn instance_identifier(&self) -> &str {
        &self.instance_identifier
    }

    fn has_backup(&self) -> bool {
        self.scripts.contains_key(&ScriptKind::Backup)
    }

    fn has_restore(&self) -> bool {
        self.scripts.contains_key(&ScriptKind::Restore)
    }

    fn backup_artifact_name(&self) -> Option<&str> {
        (self.backup_one_restore_all && self.bootstrap).then_some(self.shared_artifact_name.as_str())
    }

    fn restore_artifact_name(&self) -> Option<&str> {
        self.backup_one_restore_all
            .then_some(self.shared_artifact_name.as_str())
    }

    fn backup_artifact_directory(&self) -> String {
        self.artifact_directory_for(self.backup_artifact_name())
    }

    fn restore_artifact_directory(&self) -> String {
        self.artifact_directory_for(self.restore_artifact_name())
    }

    fn backup_should_be_locked_before(&self) -> &[JobSpecifier] {
        &self.metadata.backup_should_be_locked_before
    }

    fn restore_should_be_locked_before(&self) -> &[JobSpecifier] {
        &self.metadata.restore_should_be_locked_before
    }

    async fn pre_backup_lock(&self) -> Result<()> {
        self.run_script(ScriptKind::PreBackupLock, &[]).await
    }

    async fn backup(&self) -> Result<()> {
        if !self.has_backup() {
            return Ok(());
        }

        let dir = self.backup_artifact_directory();
        let output = self.runner.run(&format!("sudo mkdir -p {}", dir)).await?;
        if !output.success() {
            return Err(Error::Remote(format!(
                "Error attempting to create artifact directory {} for job {} on {}. Error: {}",
                dir,
                self.name,
                self.instance_identifier,
                output.stderr_str().trim()
            )));
        }
        self.artifact_dir_created.store(true, Ordering::SeqCst);

        if self.skips_backup_script() {
            info!(
                "Skipping backup script for job {} on non-bootstrap instance {}",
                self.name, self.instance_identifier
            );
            return Ok(());
        }

        self.run_script(ScriptKind::Backup, &[]).await
    }

    async fn post_backup_unlock(&self, after_successful_backup: bool) -> Result<()> {
        self.run_script(
            ScriptKind::PostBackupUnlock,
            &[(ENV_AFTER_BACKUP_SUCCESSFUL, after_successful_backup.to_string())],
        )
        .await
    }

    async fn pre_restore_lock(&self) -> Result<()> {
        self.run_script(ScriptKind::PreRestoreLock, &[]).await
    }

    async fn restore(&self) -> Result<()> {
        self.run_script(ScriptKind::Restore, &[]).await
    }

    async fn post_restore_unlock(&self) -> Result<()> {
        self.run_script(ScriptKind::PostRestoreUnlock, &[]).await
    }
}
