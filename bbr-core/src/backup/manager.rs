//! Creating and opening backup directories.

use super::{LocalBackup, DIRECTORY_TIME_FORMAT};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

#[async_trait]
pub trait BackupManager: Send + Sync {
    /// Create `<target>/<deployment>_<timestamp>` and return a handle to it.
    async fn create(
        &self,
        target: &Path,
        deployment_name: &str,
        now: DateTime<Utc>,
    ) -> Result<Arc<LocalBackup>>;

    /// Open an existing backup directory.
    async fn open(&self, path: &Path) -> Result<Arc<LocalBackup>>;
}

/// Backups stored as plain directories on the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct DirectoryBackupManager;

impl DirectoryBackupManager {
    pub fn new() -> Self {
        Self
    }
}

pub fn backup_directory_name(deployment_name: &str, now: DateTime<Utc>) -> String {
    format!("{}_{}", deployment_name, now.format(DIRECTORY_TIME_FORMAT))
}

#[async_trait]
impl BackupManager for DirectoryBackupManager {
    async fn create(
        &self,
        target: &Path,
        deployment_name: &str,
        now: DateTime<Utc>,
    ) -> Result<Arc<LocalBackup>> {
        match tokio::fs::metadata(target).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(Error::generic(format!(
                    "{}: is not a directory",
                    target.display()
                )))
            }
            Err(_) => {
                return Err(Error::generic(format!(
                    "{}: no such file or directory",
                    target.display()
                )))
            }
        }

        let path = target.join(backup_directory_name(deployment_name, now));
        tokio::fs::create_dir(&path).await.map_err(|e| {
            Error::generic(format!(
                "failed creating directory {}: {}",
                path.display(),
                e
            ))
        })?;

        info!("Created backup directory {}", path.display());
        Ok(Arc::new(LocalBackup::new(path)))
    }

    async fn open(&self, path: &Path) -> Result<Arc<LocalBackup>> {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_dir() => Ok(Arc::new(LocalBackup::new(path.to_path_buf()))),
            Ok(_) => Err(Error::generic(format!("{}: is not a directory", path.display()))),
            Err(e) => Err(Error::generic(format!("{}: {}", path.display(), e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2017, 3, 1, 12, 30, 5).unwrap()
    }

    #[test]
    fn test_directory_name() {
        assert_eq!(backup_directory_name("redis", now()), "redis_20170301T123005Z");
    }

    #[tokio::test]
    async fn test_create_backup_directory() {
        let target = TempDir::new().unwrap();
        let backup = DirectoryBackupManager::new()
            .create(target.path(), "redis", now())
            .await
            .unwrap();

        assert!(backup.path().is_dir());
        assert_eq!(backup.name(), "redis_20170301T123005Z");
        let entries: Vec<_> = std::fs::read_dir(target.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_create_fails_when_directory_exists() {
        let target = TempDir::new().unwrap();
        let manager = DirectoryBackupManager::new();
        manager.create(target.path(), "redis", now()).await.unwrap();
        assert!(manager.create(target.path(), "redis", now()).await.is_err());
    }

    #[tokio::test]
    async fn test_create_requires_existing_target() {
        let target = TempDir::new().unwrap();
        let missing = target.path().join("missing");
        assert!(DirectoryBackupManager::new()
            .create(&missing, "redis", now())
            .await
            .is_err());

        let file = target.path().join("file");
        std::fs::write(&file, b"x").unwrap();
        assert!(DirectoryBackupManager::new()
            .create(&file, "redis", now())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_open_requires_existing_directory() {
        let target = TempDir::new().unwrap();
        let manager = DirectoryBackupManager::new();
        assert!(manager.open(target.path()).await.is_ok());
        assert!(manager.open(&target.path().join("nope")).await.is_err());
    }
}
