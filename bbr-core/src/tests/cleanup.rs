use super::helpers::*;
use crate::deployment::Deployment;
use crate::executor::ParallelExecutor;
use crate::instance::Instance;
use crate::job::Job;
use crate::orchestrator::{BackupCleaner, PreBackupChecker, RestoreCleaner};
use crate::orderer::KahnLockOrderer;
use crate::testutil::{FakeInstance, FakeJob};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn deployment(instances: Vec<Arc<FakeInstance>>) -> Deployment {
    Deployment::new(
        "redis",
        instances
            .into_iter()
            .map(|i| i as Arc<dyn Instance>)
            .collect(),
        Arc::new(ParallelExecutor),
    )
}

#[tokio::test]
async fn test_backup_cleanup_unlocks_and_removes_leftovers() {
    let job = Arc::new(FakeJob::new("redis", "redis"));
    let instance = Arc::new(
        FakeInstance::new("redis-dedicated-node", "0", "fake-uuid").with_jobs(vec![job.clone() as Arc<dyn Job>]),
    );
    let manager = Arc::new(StaticDeploymentManager::new(deployment(vec![instance.clone()])));

    let cleaner = BackupCleaner::new(manager, Arc::new(KahnLockOrderer::for_backup()), fixed_clock());
    let errors = cleaner.cleanup("redis", &CancellationToken::new()).await;

    assert!(errors.is_empty(), "unexpected errors: {}", errors);
    assert_eq!(job.calls(), vec!["post-backup-unlock(false) redis"]);
    assert_eq!(instance.cleanup_previous_count(), 1);
    assert_eq!(instance.cleanup_count(), 0);
}

#[tokio::test]
async fn test_restore_cleanup_runs_after_unlock_failure() {
    let job = Arc::new(FakeJob::new("redis", "redis").failing("post-restore-unlock"));
    let instance = Arc::new(
        FakeInstance::new("redis-dedicated-node", "0", "fake-uuid").with_jobs(vec![job.clone() as Arc<dyn Job>]),
    );
    let manager = Arc::new(StaticDeploymentManager::new(deployment(vec![instance.clone()])));

    let cleaner = RestoreCleaner::new(manager, Arc::new(KahnLockOrderer::for_restore()), fixed_clock());
    let errors = cleaner.cleanup("redis", &CancellationToken::new()).await;

    assert_eq!(errors.len(), 1);
    assert_eq!(errors.restore_exit_code(), 42);
    assert_eq!(job.calls(), vec!["post-restore-unlock redis"]);
    assert_eq!(instance.cleanup_previous_count(), 1);
}

#[tokio::test]
async fn test_pre_backup_check_passes_and_closes_connections() {
    let instance = Arc::new(
        FakeInstance::new("redis-dedicated-node", "0", "fake-uuid")
            .with_jobs(vec![Arc::new(FakeJob::new("redis", "redis")) as Arc<dyn Job>]),
    );
    let manager = Arc::new(StaticDeploymentManager::new(deployment(vec![instance.clone()])));

    let checker = PreBackupChecker::new(manager, Arc::new(KahnLockOrderer::for_backup()), fixed_clock());
    let errors = checker.check("redis", &CancellationToken::new()).await;

    assert!(errors.is_empty(), "unexpected errors: {}", errors);
    assert_eq!(instance.cleanup_count(), 1);
}

#[tokio::test]
async fn test_pre_backup_check_reports_existing_artifact_directory() {
    let job = Arc::new(FakeJob::new("redis", "redis"));
    let instance = Arc::new(
        FakeInstance::new("redis-dedicated-node", "0", "fake-uuid")
            .with_jobs(vec![job.clone() as Arc<dyn Job>])
            .with_existing_artifact_dir(),
    );
    let manager = Arc::new(StaticDeploymentManager::new(deployment(vec![instance.clone()])));

    let checker = PreBackupChecker::new(manager, Arc::new(KahnLockOrderer::for_backup()), fixed_clock());
    let errors = checker.check("redis", &CancellationToken::new()).await;

    assert_eq!(
        errors.to_string(),
        "Directory /var/vcap/store/bbr-backup already exists on instance redis-dedicated-node/fake-uuid"
    );
    assert!(!errors.recommends_cleanup());
    assert!(job.calls().is_empty());
    assert_eq!(instance.cleanup_count(), 1);
}
