//! Per-job lifecycle executables.

use super::Executable;
use crate::job::Job;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobAction {
    PreBackupLock,
    Backup,
    PostSuccessfulBackupUnlock,
    PostFailedBackupUnlock,
    PreRestoreLock,
    Restore,
    PostRestoreUnlock,
}

/// Runs one lifecycle action of one job.
pub struct JobExecutable {
    job: Arc<dyn Job>,
    action: JobAction,
}

impl JobExecutable {
    pub fn new(job: Arc<dyn Job>, action: JobAction) -> Self {
        Self { job, action }
    }
}

#[async_trait]
impl Executable for JobExecutable {
    async fn execute(&self) -> Result<()> {
        match self.action {
            JobAction::PreBackupLock => self.job.pre_backup_lock().await,
            JobAction::Backup => self.job.backup().await,
            JobAction::PostSuccessfulBackupUnlock => self.job.post_backup_unlock(true).await,
            JobAction::PostFailedBackupUnlock => self.job.post_backup_unlock(false).await,
            JobAction::PreRestoreLock => self.job.pre_restore_lock().await,
            JobAction::Restore => self.job.restore().await,
            JobAction::PostRestoreUnlock => self.job.post_restore_unlock().await,
        }
    }
}
