use crate::backup::{DirectoryBackupManager, LocalBackup};
use crate::checksum::sha256_hex;
use crate::copier::ArtifactCopier;
use crate::deployment::{Deployment, DeploymentManager};
use crate::executor::ParallelExecutor;
use crate::instance::{DeployedInstance, Instance};
use crate::orchestrator::{Backuper, Restorer};
use crate::orderer::KahnLockOrderer;
use crate::testutil::{build_tar, FakeRunner};
use crate::{Error, NowFn, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const FIND_SCRIPTS: &str = "sudo sh -c 'find /var/vcap/jobs/*/bin/bbr/* -type f'";
pub const STAT_ARTIFACT_DIR: &str = "stat /var/vcap/store/bbr-backup";
pub const REMOVE_ARTIFACT_DIR: &str = "sudo rm -rf /var/vcap/store/bbr-backup";
pub const REDIS_CHECKSUM: &str =
    "cd /var/vcap/store/bbr-backup/redis && sudo sh -c 'find . -type f | xargs --no-run-if-empty shasum -a 256'";
pub const REDIS_BACKUP_SCRIPT: &str =
    "sudo BBR_ARTIFACT_DIRECTORY=/var/vcap/store/bbr-backup/redis/ BBR_VERSION=1.0.0 /var/vcap/jobs/redis/bin/bbr/backup";
pub const REDIS_DUMP: &[(&str, &str)] = &[("backupdump1", "backupcontent1"), ("backupdump2", "backupcontent2")];

pub fn fixed_clock() -> NowFn {
    Arc::new(|| Utc.with_ymd_and_hms(2017, 3, 1, 12, 30, 5).unwrap())
}

/// `shasum -a 256` output for the given files, paths printed as given.
pub fn shasum_output(files: &[(&str, &str)]) -> String {
    files
        .iter()
        .map(|(path, contents)| format!("{}  {}\n", sha256_hex(contents.as_bytes()), path))
        .collect()
}

/// A runner for `redis-dedicated-node/fake-uuid` hosting a single `redis`
/// job with the given scripts, whose artifact directory holds `REDIS_DUMP`.
pub fn redis_runner(scripts: &[&str]) -> Arc<FakeRunner> {
    let runner = Arc::new(FakeRunner::new());
    let paths: String = scripts
        .iter()
        .map(|s| format!("/var/vcap/jobs/redis/bin/bbr/{}\n", s))
        .collect();
    runner.respond(FIND_SCRIPTS, 0, &paths, "");
    runner.respond(STAT_ARTIFACT_DIR, 1, "", "stat: cannot stat: No such file or directory");
    runner.respond(REDIS_CHECKSUM, 0, &shasum_output(REDIS_DUMP), "");
    runner.respond("sudo du -sh /var/vcap/store/bbr-backup/redis | cut -f1", 0, "4.0K\n", "");
    runner.respond("sudo du -sb /var/vcap/store/bbr-backup/redis | cut -f1", 0, "4096\n", "");
    runner.set_stream_out_data(build_tar(REDIS_DUMP));
    runner
}

pub async fn redis_deployment(runner: Arc<FakeRunner>) -> Deployment {
    let instance = DeployedInstance::discover(runner, "redis-dedicated-node", "0", "fake-uuid", true, &[], "1.0.0")
        .await
        .unwrap();
    Deployment::new(
        "redis",
        vec![Arc::new(instance) as Arc<dyn Instance>],
        Arc::new(ParallelExecutor),
    )
}

/// Serves one prebuilt deployment and counts lookups.
pub struct StaticDeploymentManager {
    deployment: Arc<Deployment>,
    manifest: Option<String>,
    finds: AtomicUsize,
}

impl StaticDeploymentManager {
    pub fn new(deployment: Deployment) -> Self {
        Self {
            deployment: Arc::new(deployment),
            manifest: None,
            finds: AtomicUsize::new(0),
        }
    }

    pub fn with_manifest(mut self, manifest: &str) -> Self {
        self.manifest = Some(manifest.to_string());
        self
    }

    pub fn finds(&self) -> usize {
        self.finds.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeploymentManager for StaticDeploymentManager {
    async fn find(&self, deployment_name: &str) -> Result<Arc<Deployment>> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        if deployment_name != self.deployment.name() {
            return Err(Error::generic(format!("Deployment '{}' not found", deployment_name)));
        }
        Ok(Arc::clone(&self.deployment))
    }

    async fn save_manifest(&self, _deployment_name: &str, backup: &LocalBackup) -> Result<()> {
        match &self.manifest {
            Some(manifest) => backup.save_manifest(manifest).await,
            None => Err(Error::generic("no manifest")),
        }
    }
}

pub fn backuper(manager: Arc<StaticDeploymentManager>) -> Backuper {
    Backuper::new(
        manager,
        Arc::new(DirectoryBackupManager::new()),
        Arc::new(KahnLockOrderer::for_backup()),
        ArtifactCopier::new(Arc::new(ParallelExecutor)),
        fixed_clock(),
    )
}

pub fn restorer(manager: Arc<StaticDeploymentManager>) -> Restorer {
    Restorer::new(
        manager,
        Arc::new(DirectoryBackupManager::new()),
        Arc::new(KahnLockOrderer::for_restore()),
        ArtifactCopier::new(Arc::new(ParallelExecutor)),
        fixed_clock(),
    )
}
