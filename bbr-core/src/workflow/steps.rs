//! The steps the orchestrators assemble into workflows.
//!
//! Each step classifies its failures into the error kind that decides the
//! exit code: lock failures become `Lock`, unlock failures `PostUnlock`, and
//! so on.

use super::{Session, Step};
use crate::backup::BackupManager;
use crate::copier::ArtifactCopier;
use crate::deployment::DeploymentManager;
use crate::orderer::LockOrderer;
use crate::{Error, Errors};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

fn classify(errors: Errors, wrap: fn(String) -> Error) -> Errors {
    errors.into_iter().map(|e| wrap(e.to_string())).collect()
}

fn errors_to_result(errors: Errors, wrap: fn(String) -> Error) -> Result<(), Errors> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(classify(errors, wrap))
    }
}

pub struct FindDeploymentStep {
    deployment_manager: Arc<dyn DeploymentManager>,
}

impl FindDeploymentStep {
    pub fn new(deployment_manager: Arc<dyn DeploymentManager>) -> Self {
        Self { deployment_manager }
    }
}

#[async_trait]
impl Step for FindDeploymentStep {
    async fn run(&self, session: &mut Session) -> Result<(), Errors> {
        info!("Looking for scripts");
        // Nothing has been changed on the deployment yet.
        let deployment = self
            .deployment_manager
            .find(session.deployment_name())
            .await
            .map_err(|e| Error::PreCheck(e.to_string()))?;

        for instance in deployment.instances() {
            for job in instance.jobs() {
                debug!("Found job {} ({}) on {}", job.name(), job.release(), job.instance_identifier());
            }
        }
        session.set_deployment(deployment);
        Ok(())
    }
}

/// Pre-backup checks. Nothing on the deployment is changed.
pub struct BackupableStep {
    orderer: Arc<dyn LockOrderer>,
}

impl BackupableStep {
    pub fn new(orderer: Arc<dyn LockOrderer>) -> Self {
        Self { orderer }
    }
}

#[async_trait]
impl Step for BackupableStep {
    async fn run(&self, session: &mut Session) -> Result<(), Errors> {
        let deployment = session.deployment()?;
        let name = deployment.name();

        if !deployment.is_backupable() {
            return Err(Error::PreCheck(format!("Deployment '{}' has no backup scripts", name)).into());
        }

        let dir_errors = deployment.check_artifact_dir().await;
        if !dir_errors.is_empty() {
            return Err(classify(dir_errors, Error::PreCheck));
        }

        if !deployment.has_unique_custom_artifact_names() {
            return Err(Error::PreCheck(format!(
                "Multiple jobs in deployment '{}' specified the same backup name",
                name
            ))
            .into());
        }

        deployment
            .custom_artifact_names_match()
            .map_err(|e| Error::PreCheck(e.to_string()))?;

        deployment
            .validate_locking_dependencies(self.orderer.as_ref())
            .map_err(|e| Error::PreCheck(e.to_string()))?;

        Ok(())
    }
}

/// Create the local backup directory and its metadata.
pub struct CreateArtifactStep {
    backup_manager: Arc<dyn BackupManager>,
    deployment_manager: Arc<dyn DeploymentManager>,
    with_manifest: bool,
}

impl CreateArtifactStep {
    pub fn new(
        backup_manager: Arc<dyn BackupManager>,
        deployment_manager: Arc<dyn DeploymentManager>,
        with_manifest: bool,
    ) -> Self {
        Self {
            backup_manager,
            deployment_manager,
            with_manifest,
        }
    }
}

#[async_trait]
impl Step for CreateArtifactStep {
    async fn run(&self, session: &mut Session) -> Result<(), Errors> {
        let now = session.now();
        let backup = self
            .backup_manager
            .create(session.artifact_path(), session.deployment_name(), now)
            .await?;
        session.set_backup(Arc::clone(&backup));

        backup.create_metadata_file_with_start_time(now).await?;

        if self.with_manifest {
            self.deployment_manager
                .save_manifest(session.deployment_name(), &backup)
                .await?;
        }
        Ok(())
    }
}

pub struct LockStep {
    orderer: Arc<dyn LockOrderer>,
}

impl LockStep {
    pub fn new(orderer: Arc<dyn LockOrderer>) -> Self {
        Self { orderer }
    }
}

#[async_trait]
impl Step for LockStep {
    async fn run(&self, session: &mut Session) -> Result<(), Errors> {
        let deployment = session.deployment()?;
        errors_to_result(deployment.pre_backup_lock(self.orderer.as_ref()).await, Error::Lock)
    }
}

pub struct BackupStep;

#[async_trait]
impl Step for BackupStep {
    async fn run(&self, session: &mut Session) -> Result<(), Errors> {
        let deployment = session.deployment()?;
        errors_to_result(deployment.backup().await, Error::Backup)
    }
}

/// `post-backup-unlock`, told whether the backup scripts succeeded.
pub struct UnlockStep {
    orderer: Arc<dyn LockOrderer>,
    after_successful_backup: bool,
}

impl UnlockStep {
    pub fn new(orderer: Arc<dyn LockOrderer>, after_successful_backup: bool) -> Self {
        Self {
            orderer,
            after_successful_backup,
        }
    }
}

#[async_trait]
impl Step for UnlockStep {
    async fn run(&self, session: &mut Session) -> Result<(), Errors> {
        let deployment = session.deployment()?;
        let errors = deployment
            .post_backup_unlock(self.after_successful_backup, self.orderer.as_ref())
            .await;
        errors_to_result(errors, Error::PostUnlock)
    }
}

/// Copy every backup artifact into the local backup.
pub struct DrainStep {
    copier: ArtifactCopier,
}

impl DrainStep {
    pub fn new(copier: ArtifactCopier) -> Self {
        Self { copier }
    }
}

#[async_trait]
impl Step for DrainStep {
    async fn run(&self, session: &mut Session) -> Result<(), Errors> {
        let deployment = session.deployment()?;
        let backup = session.require_backup()?;

        let errors = self
            .copier
            .download_backup_from_deployment(&backup, deployment.instances())
            .await;
        errors_to_result(errors, Error::Drain)?;

        info!(
            "Backup created of {} on {}",
            deployment.name(),
            session.now().format("%Y-%m-%d %H:%M:%S %Z")
        );
        Ok(())
    }
}

/// Clean up every instance and close its connection.
pub struct CleanupStep;

#[async_trait]
impl Step for CleanupStep {
    async fn run(&self, session: &mut Session) -> Result<(), Errors> {
        let deployment = session.deployment()?;
        let errors = deployment.cleanup().await;
        if errors.is_empty() {
            return Ok(());
        }
        Err(Error::Cleanup(format!(
            "Deployment '{}' failed while cleaning up with error: {}",
            deployment.name(),
            errors
        ))
        .into())
    }
}

/// Remove leftover artifact directories regardless of who created them.
pub struct CleanupPreviousStep;

#[async_trait]
impl Step for CleanupPreviousStep {
    async fn run(&self, session: &mut Session) -> Result<(), Errors> {
        let deployment = session.deployment()?;
        let errors = deployment.cleanup_previous().await;
        if errors.is_empty() {
            return Ok(());
        }
        Err(Error::Cleanup(format!(
            "Deployment '{}' failed while cleaning up with error: {}",
            deployment.name(),
            errors
        ))
        .into())
    }
}

pub struct AddFinishTimeStep;

#[async_trait]
impl Step for AddFinishTimeStep {
    async fn run(&self, session: &mut Session) -> Result<(), Errors> {
        if let Some(backup) = session.backup() {
            backup.add_finish_time(session.now()).await?;
        }
        Ok(())
    }
}

/// Stands in for a step that has been switched off.
pub struct SkipStep {
    name: String,
}

impl SkipStep {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Step for SkipStep {
    async fn run(&self, _session: &mut Session) -> Result<(), Errors> {
        info!("Skipping {} for deployment", self.name);
        Ok(())
    }
}

/// Open the backup to restore and re-verify every artifact checksum.
pub struct ValidateArtifactStep {
    backup_manager: Arc<dyn BackupManager>,
}

impl ValidateArtifactStep {
    pub fn new(backup_manager: Arc<dyn BackupManager>) -> Self {
        Self { backup_manager }
    }
}

#[async_trait]
impl Step for ValidateArtifactStep {
    async fn run(&self, session: &mut Session) -> Result<(), Errors> {
        let backup = self.backup_manager.open(session.artifact_path()).await?;
        session.set_backup(Arc::clone(&backup));

        if !backup.valid().await? {
            return Err(Error::ArtifactInvalid("Backup is corrupted".to_string()).into());
        }
        Ok(())
    }
}

/// Restore pre-checks: the deployment has restore scripts and the same
/// shape as the backup.
pub struct RestorableStep {
    orderer: Arc<dyn LockOrderer>,
}

impl RestorableStep {
    pub fn new(orderer: Arc<dyn LockOrderer>) -> Self {
        Self { orderer }
    }
}

#[async_trait]
impl Step for RestorableStep {
    async fn run(&self, session: &mut Session) -> Result<(), Errors> {
        let deployment = session.deployment()?;
        let backup = session.require_backup()?;
        let name = deployment.name();

        if !deployment.is_restorable() {
            return Err(Error::PreCheck(format!("Deployment '{}' has no restore scripts", name)).into());
        }

        if !backup.deployment_matches(name, deployment.instances()).await? {
            return Err(Error::PreCheck(format!(
                "Deployment '{}' does not match the structure of the provided backup",
                name
            ))
            .into());
        }

        let dir_errors = deployment.check_artifact_dir().await;
        if !dir_errors.is_empty() {
            return Err(classify(dir_errors, Error::PreCheck));
        }

        deployment
            .validate_locking_dependencies(self.orderer.as_ref())
            .map_err(|e| Error::PreCheck(e.to_string()))?;
        Ok(())
    }
}

/// Upload every restore artifact from the local backup.
pub struct CopyToRemoteStep {
    copier: ArtifactCopier,
}

impl CopyToRemoteStep {
    pub fn new(copier: ArtifactCopier) -> Self {
        Self { copier }
    }
}

#[async_trait]
impl Step for CopyToRemoteStep {
    async fn run(&self, session: &mut Session) -> Result<(), Errors> {
        let deployment = session.deployment()?;
        let backup = session.require_backup()?;
        let errors = self
            .copier
            .upload_backup_to_deployment(&backup, deployment.instances())
            .await;
        errors.into_result()
    }
}

pub struct PreRestoreLockStep {
    orderer: Arc<dyn LockOrderer>,
}

impl PreRestoreLockStep {
    pub fn new(orderer: Arc<dyn LockOrderer>) -> Self {
        Self { orderer }
    }
}

#[async_trait]
impl Step for PreRestoreLockStep {
    async fn run(&self, session: &mut Session) -> Result<(), Errors> {
        let deployment = session.deployment()?;
        errors_to_result(deployment.pre_restore_lock(self.orderer.as_ref()).await, Error::Lock)
    }
}

pub struct RestoreStep;

#[async_trait]
impl Step for RestoreStep {
    async fn run(&self, session: &mut Session) -> Result<(), Errors> {
        let deployment = session.deployment()?;
        deployment.restore().await.into_result()
    }
}

pub struct PostRestoreUnlockStep {
    orderer: Arc<dyn LockOrderer>,
}

impl PostRestoreUnlockStep {
    pub fn new(orderer: Arc<dyn LockOrderer>) -> Self {
        Self { orderer }
    }
}

#[async_trait]
impl Step for PostRestoreUnlockStep {
    async fn run(&self, session: &mut Session) -> Result<(), Errors> {
        let deployment = session.deployment()?;
        errors_to_result(
            deployment.post_restore_unlock(self.orderer.as_ref()).await,
            Error::PostUnlock,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deployment::Deployment;
    use crate::executor::ParallelExecutor;
    use crate::instance::Instance;
    use crate::orderer::{KahnLockOrderer, CYCLIC_GRAPH_MESSAGE};
    use crate::testutil::{FakeInstance, FakeJob};
    use crate::{system_clock, ErrorKind};

    fn session_with(instances: Vec<FakeInstance>) -> Session {
        let mut session = Session::new("redis", "/tmp", system_clock());
        session.set_deployment(Arc::new(Deployment::new(
            "redis",
            instances
                .into_iter()
                .map(|i| Arc::new(i) as Arc<dyn Instance>)
                .collect(),
            Arc::new(ParallelExecutor),
        )));
        session
    }

    fn kinds(errors: &Errors) -> Vec<ErrorKind> {
        errors.iter().map(|e| e.kind()).collect()
    }

    #[tokio::test]
    async fn test_backupable_rejects_deployment_without_scripts() {
        let mut session = session_with(vec![FakeInstance::new("a", "0", "1")]);
        let errors = BackupableStep::new(Arc::new(KahnLockOrderer::for_backup()))
            .run(&mut session)
            .await
            .unwrap_err();
        assert_eq!(errors.to_string(), "Deployment 'redis' has no backup scripts");
        assert_eq!(kinds(&errors), vec![ErrorKind::PreCheck]);
    }

    #[tokio::test]
    async fn test_backupable_reports_cycle() {
        let mut session = session_with(vec![FakeInstance::new("a", "0", "1").with_jobs(vec![
            Arc::new(FakeJob::new("redis", "r").backup_locked_before(&[("redis-writer", "r")])),
            Arc::new(FakeJob::new("redis-writer", "r").backup_locked_before(&[("redis", "r")])),
        ])]);
        let errors = BackupableStep::new(Arc::new(KahnLockOrderer::for_backup()))
            .run(&mut session)
            .await
            .unwrap_err();
        assert_eq!(errors.to_string(), CYCLIC_GRAPH_MESSAGE);
        assert_eq!(errors.exit_code(), 1);
        assert!(!errors.recommends_cleanup());
    }

    #[tokio::test]
    async fn test_backupable_reports_every_existing_artifact_dir() {
        let mut session = session_with(vec![
            FakeInstance::new("a", "0", "1")
                .with_jobs(vec![Arc::new(FakeJob::new("x", "r"))])
                .with_existing_artifact_dir(),
            FakeInstance::new("b", "0", "2").with_existing_artifact_dir(),
        ]);
        let errors = BackupableStep::new(Arc::new(KahnLockOrderer::for_backup()))
            .run(&mut session)
            .await
            .unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[tokio::test]
    async fn test_lock_backup_unlock_classification() {
        let mut session = session_with(vec![FakeInstance::new("a", "0", "1").with_jobs(vec![Arc::new(
            FakeJob::new("x", "r")
                .failing("pre-backup-lock")
                .failing("backup")
                .failing("post-backup-unlock(false)"),
        )])]);
        let orderer: Arc<dyn LockOrderer> = Arc::new(KahnLockOrderer::for_backup());

        let lock = LockStep::new(orderer.clone()).run(&mut session).await.unwrap_err();
        assert_eq!(kinds(&lock), vec![ErrorKind::Lock]);
        let backup = BackupStep.run(&mut session).await.unwrap_err();
        assert_eq!(kinds(&backup), vec![ErrorKind::Backup]);
        let unlock = UnlockStep::new(orderer.clone(), false)
            .run(&mut session)
            .await
            .unwrap_err();
        assert_eq!(kinds(&unlock), vec![ErrorKind::PostUnlock]);
        assert!(UnlockStep::new(orderer, true).run(&mut session).await.is_ok());
    }

    #[tokio::test]
    async fn test_cleanup_wraps_with_deployment_name() {
        let mut session = session_with(vec![
            FakeInstance::new("a", "0", "1").failing_cleanup("connection reset"),
        ]);
        let errors = CleanupStep.run(&mut session).await.unwrap_err();
        assert!(errors.is_cleanup());
        assert_eq!(
            errors.to_string(),
            "Deployment 'redis' failed while cleaning up with error: Remote command failed: connection reset"
        );
    }

    #[tokio::test]
    async fn test_steps_need_a_deployment() {
        let mut session = Session::new("redis", "/tmp", system_clock());
        assert!(BackupStep.run(&mut session).await.is_err());
        assert!(CleanupStep.run(&mut session).await.is_err());
    }

    #[tokio::test]
    async fn test_add_finish_time_without_backup_is_a_no_op() {
        let mut session = Session::new("redis", "/tmp", system_clock());
        assert!(AddFinishTimeStep.run(&mut session).await.is_ok());
        assert!(SkipStep::new("lock").run(&mut session).await.is_ok());
    }
}
