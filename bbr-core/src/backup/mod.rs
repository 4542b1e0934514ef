//! Local backup directories.
//!
//! A backup is a directory named `<deployment>_<yyyyMMddTHHmmssZ>` holding
//! one tar per artifact, a YAML `metadata` file with the checksums taken at
//! download time, and optionally the deployment's `manifest.yml`.

pub mod manager;
pub mod metadata;

use crate::artifact::ArtifactIdentifier;
use crate::checksum::{calculate_tar_checksum, BackupChecksum};
use crate::instance::Instance;
use crate::transfer::format_bytes;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use metadata::{format_metadata_time, BackupMetadata};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub use manager::{BackupManager, DirectoryBackupManager};
pub use metadata::METADATA_TIME_FORMAT;

/// Name of the metadata file inside a backup directory.
pub const METADATA_FILE_NAME: &str = "metadata";

/// Name of the saved deployment manifest.
pub const MANIFEST_FILE_NAME: &str = "manifest.yml";

/// Timestamp layout of backup directory names.
pub const DIRECTORY_TIME_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Handle to one backup directory on local disk.
#[derive(Debug)]
pub struct LocalBackup {
    path: PathBuf,

    /// Serialises read-modify-write of the metadata file
    metadata_lock: Mutex<()>,
}

impl LocalBackup {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self {
            path,
            metadata_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory name, e.g. `redis_20170301T123005Z`.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn metadata_path(&self) -> PathBuf {
        self.path.join(METADATA_FILE_NAME)
    }

    fn artifact_path(&self, id: &ArtifactIdentifier) -> Result<PathBuf> {
        let file_name = id.file_name();
        if file_name.contains('/') || file_name.contains('\\') || file_name.starts_with('.') {
            return Err(Error::generic(format!(
                "invalid artifact name '{}': not a valid file name",
                id.name()
            )));
        }
        Ok(self.path.join(file_name))
    }

    /// Open a new artifact file for writing.
    pub async fn create_artifact(&self, id: &ArtifactIdentifier) -> Result<File> {
        let path = self.artifact_path(id)?;
        debug!("Creating artifact file {}", path.display());
        let file = File::create(&path).await.map_err(|e| {
            Error::generic(format!("Error creating artifact file {}: {}", path.display(), e))
        })?;
        Ok(file)
    }

    /// Open an existing artifact file for reading.
    pub async fn read_artifact(&self, id: &ArtifactIdentifier) -> Result<File> {
        let path = self.artifact_path(id)?;
        let file = File::open(&path).await.map_err(|e| {
            Error::generic(format!("Error reading artifact file {}: {}", path.display(), e))
        })?;
        Ok(file)
    }

    /// Checksum recorded in metadata at download time, if any.
    pub async fn fetch_checksum(&self, id: &ArtifactIdentifier) -> Result<Option<BackupChecksum>> {
        let metadata = self.read_metadata().await?;
        Ok(metadata.checksum_for(id).cloned())
    }

    /// Recompute the checksum of an artifact file from disk.
    pub async fn calculate_checksum(&self, id: &ArtifactIdentifier) -> Result<BackupChecksum> {
        let path = self.artifact_path(id)?;
        let checksum = tokio::task::spawn_blocking(move || {
            let file = std::fs::File::open(&path)?;
            calculate_tar_checksum(std::io::BufReader::new(file))
        })
        .await??;
        Ok(checksum)
    }

    /// Record an artifact checksum in metadata. Safe under concurrent callers.
    pub async fn add_checksum(&self, id: &ArtifactIdentifier, checksum: BackupChecksum) -> Result<()> {
        let _guard = self.metadata_lock.lock().await;
        let mut metadata = self.read_metadata().await?;
        metadata.add_checksum(id, checksum);
        self.write_metadata(&metadata).await
    }

    /// Write the initial metadata. Fails if a metadata file already exists.
    pub async fn create_metadata_file_with_start_time(&self, start: DateTime<Utc>) -> Result<()> {
        let _guard = self.metadata_lock.lock().await;
        let yaml = BackupMetadata::with_start_time(start).to_yaml()?;
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.metadata_path())
            .await
            .map_err(|e| {
                Error::generic(format!(
                    "Unable to create metadata file in {}: {}",
                    self.path.display(),
                    e
                ))
            })?;
        file.write_all(yaml.as_bytes()).await?;
        file.shutdown().await?;
        Ok(())
    }

    pub async fn add_finish_time(&self, finish: DateTime<Utc>) -> Result<()> {
        let _guard = self.metadata_lock.lock().await;
        let mut metadata = self.read_metadata().await?;
        metadata.backup_activity.finish_time = Some(format_metadata_time(finish));
        self.write_metadata(&metadata).await
    }

    /// Every instance in metadata has a `(name, index)` match among
    /// `instances`.
    pub async fn deployment_matches(
        &self,
        deployment_name: &str,
        instances: &[Arc<dyn Instance>],
    ) -> Result<bool> {
        let metadata = self.read_metadata().await?;
        for recorded in &metadata.instances {
            let found = instances
                .iter()
                .any(|i| i.name() == recorded.name && i.index() == recorded.index);
            if !found {
                warn!(
                    "Instance {}/{} from the backup is not present in deployment '{}'",
                    recorded.name, recorded.index, deployment_name
                );
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Re-checksum every artifact the metadata mentions and compare with the
    /// recorded checksums. A missing file or a mismatch is `Ok(false)`.
    pub async fn valid(&self) -> Result<bool> {
        let metadata = self.read_metadata().await?;

        for (id, recorded) in metadata.artifacts() {
            let path = self.artifact_path(&id)?;
            if !tokio::fs::try_exists(&path).await? {
                warn!("Backup artifact {} is missing", path.display());
                return Ok(false);
            }

            let actual = self.calculate_checksum(&id).await?;
            if !actual.matches(recorded) {
                warn!(
                    "Checksum mismatch for {}: {:?}",
                    id.file_name(),
                    actual.mismatched_files(recorded)
                );
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Save the deployment manifest verbatim as `manifest.yml`.
    pub async fn save_manifest(&self, manifest: &str) -> Result<()> {
        let path = self.path.join(MANIFEST_FILE_NAME);
        tokio::fs::write(&path, manifest).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o666)).await?;
        }
        Ok(())
    }

    /// Human-readable on-disk size of an artifact.
    pub async fn artifact_size(&self, id: &ArtifactIdentifier) -> Result<String> {
        Ok(format_bytes(self.artifact_byte_size(id).await?))
    }

    /// On-disk size in bytes, counted in 512-byte blocks like `du`.
    pub async fn artifact_byte_size(&self, id: &ArtifactIdentifier) -> Result<u64> {
        let path = self.artifact_path(id)?;
        let metadata = tokio::fs::metadata(&path).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            Ok(metadata.blocks() * 512)
        }
        #[cfg(not(unix))]
        {
            Ok(metadata.len())
        }
    }

    pub async fn read_metadata(&self) -> Result<BackupMetadata> {
        let path = self.metadata_path();
        let contents = tokio::fs::read_to_string(&path).await.map_err(|e| {
            Error::generic(format!("Unable to read backup metadata {}: {}", path.display(), e))
        })?;
        let metadata = BackupMetadata::from_yaml(&contents).map_err(|e| {
            Error::generic(format!("Backup metadata {} is invalid: {}", path.display(), e))
        })?;
        Ok(metadata)
    }

    async fn write_metadata(&self, metadata: &BackupMetadata) -> Result<()> {
        let yaml = metadata.to_yaml()?;
        tokio::fs::write(self.metadata_path(), yaml).await?;
        Ok(())
    }
}
