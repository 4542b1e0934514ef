//! Per-artifact transfer executables.
//!
//! A download streams one remote artifact into the local backup and proves
//! the copy is intact by comparing per-file checksums taken on both ends. An
//! upload does the same in the other direction against the checksum recorded
//! when the backup was taken.

use super::Executable;
use crate::artifact::RemoteArtifact;
use crate::backup::LocalBackup;
use crate::checksum::describe_mismatch;
use crate::instance::Instance;
use crate::transfer::{PercentageLogger, ProgressReader, ProgressWriter};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::info;

pub struct BackupDownloadExecutable {
    backup: Arc<LocalBackup>,
    artifact: Arc<dyn RemoteArtifact>,
    progress_increment: u64,
}

impl BackupDownloadExecutable {
    pub fn new(backup: Arc<LocalBackup>, artifact: Arc<dyn RemoteArtifact>, progress_increment: u64) -> Self {
        Self {
            backup,
            artifact,
            progress_increment,
        }
    }
}

#[async_trait]
impl Executable for BackupDownloadExecutable {
    async fn execute(&self) -> Result<()> {
        let id = self.artifact.identifier();
        let location = self.artifact.location();

        let mut file = self.backup.create_artifact(id).await?;

        let size = self.artifact.size().await?;
        let total_bytes = self.artifact.size_in_bytes().await?;
        info!(
            "Copying backup -- {} uncompressed -- for job {} on {}...",
            size,
            id.name(),
            location
        );

        let progress = PercentageLogger::new(
            total_bytes,
            self.progress_increment,
            format!("Copying backup for job {} on {}", id.name(), location),
        );
        let mut writer = ProgressWriter::new(&mut file, progress);
        self.artifact.stream_from_remote(&mut writer).await?;
        writer.shutdown().await.map_err(|e| {
            Error::generic(format!(
                "Error closing backup file for job {} on {}: {}",
                id.name(),
                location,
                e
            ))
        })?;
        drop(file);

        let local = self.backup.calculate_checksum(id).await?;
        let remote = self.artifact.checksum().await?;
        if !local.matches(&remote) {
            return Err(Error::generic(format!(
                "Backup is corrupted, checksum failed for {} {} - checksums don't match for {}",
                location,
                id.name(),
                describe_mismatch(&local.mismatched_files(&remote))
            )));
        }

        self.backup.add_checksum(id, local).await?;
        self.artifact.delete().await?;

        info!("Finished validity checks -- for job {} on {}...", id.name(), location);
        Ok(())
    }
}

pub struct BackupUploadExecutable {
    backup: Arc<LocalBackup>,
    instance: Arc<dyn Instance>,
    artifact: Arc<dyn RemoteArtifact>,
    progress_increment: u64,
}

impl BackupUploadExecutable {
    pub fn new(
        backup: Arc<LocalBackup>,
        instance: Arc<dyn Instance>,
        artifact: Arc<dyn RemoteArtifact>,
        progress_increment: u64,
    ) -> Self {
        Self {
            backup,
            instance,
            artifact,
            progress_increment,
        }
    }
}

#[async_trait]
impl Executable for BackupUploadExecutable {
    async fn execute(&self) -> Result<()> {
        let id = self.artifact.identifier();
        let location = self.artifact.location();

        let mut file = self.backup.read_artifact(id).await?;
        let size = self.backup.artifact_size(id).await?;
        let total_bytes = self.backup.artifact_byte_size(id).await?;
        info!(
            "Copying backup for job {} on {} -- {} uncompressed...",
            id.name(),
            location,
            size
        );

        let progress = PercentageLogger::new(
            total_bytes,
            self.progress_increment,
            format!("Copying backup for job {} on {}", id.name(), location),
        );
        let mut reader = ProgressReader::new(&mut file, progress);
        self.artifact.stream_to_remote(&mut reader).await?;
        drop(file);
        self.instance.mark_artifact_dir_created();

        let local = self.backup.fetch_checksum(id).await?.ok_or_else(|| {
            Error::generic(format!(
                "Backup couldn't be transferred, no checksum recorded for {} {}",
                location,
                id.name()
            ))
        })?;
        let remote = self.artifact.checksum().await?;
        if !local.matches(&remote) {
            return Err(Error::generic(format!(
                "Backup couldn't be transferred, checksum failed for {} {} - checksums don't match for {}",
                location,
                id.name(),
                describe_mismatch(&local.mismatched_files(&remote))
            )));
        }

        info!("Finished copying backup for job {} on {}", id.name(), location);
        Ok(())
    }
}
