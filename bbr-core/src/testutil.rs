//! In-memory fakes shared by the unit tests.

use crate::artifact::{ArtifactIdentifier, RemoteArtifact};
use crate::backup::LocalBackup;
use crate::checksum::{calculate_tar_checksum, BackupChecksum};
use crate::instance::Instance;
use crate::job::{Job, JobSpecifier};
use crate::remote::{CommandOutput, RemoteRunner};
use crate::transfer::format_bytes;
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Build an in-memory tar holding `(path, contents)` regular files.
///
/// Names are written verbatim, the way GNU tar records them, so `./x` stays
/// `./x`.
pub fn build_tar(files: &[(&str, &str)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.as_old_mut().name[..path.len()].copy_from_slice(path.as_bytes());
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append(&header, contents.as_bytes()).unwrap();
    }
    builder.into_inner().unwrap()
}

/// A backup in `dir` with its metadata file already written.
pub async fn new_local_backup(dir: &TempDir) -> Arc<LocalBackup> {
    let backup = LocalBackup::new(dir.path().to_path_buf());
    backup
        .create_metadata_file_with_start_time(Utc.with_ymd_and_hms(2017, 3, 1, 12, 30, 5).unwrap())
        .await
        .unwrap();
    Arc::new(backup)
}

/// Scripted [`RemoteRunner`]. Commands without a canned response succeed
/// with empty output.
#[derive(Default)]
pub struct FakeRunner {
    responses: Mutex<HashMap<String, CommandOutput>>,
    commands: Mutex<Vec<String>>,
    stream_out_data: Mutex<Vec<u8>>,
    streamed_in: Mutex<Vec<u8>>,
    closed: AtomicBool,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, cmd: &str, status: i32, stdout: &str, stderr: &str) {
        self.responses.lock().unwrap().insert(
            cmd.to_string(),
            CommandOutput {
                stdout: stdout.as_bytes().to_vec(),
                stderr: stderr.as_bytes().to_vec(),
                status,
            },
        );
    }

    /// Every command run or streamed so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn set_stream_out_data(&self, data: Vec<u8>) {
        *self.stream_out_data.lock().unwrap() = data;
    }

    pub fn streamed_in(&self) -> Vec<u8> {
        self.streamed_in.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteRunner for FakeRunner {
    fn host(&self) -> &str {
        "fake-host"
    }

    async fn run(&self, cmd: &str) -> Result<CommandOutput> {
        self.commands.lock().unwrap().push(cmd.to_string());
        Ok(self
            .responses
            .lock()
            .unwrap()
            .get(cmd)
            .cloned()
            .unwrap_or_default())
    }

    async fn stream_out(
        &self,
        cmd: &str,
        writer: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<()> {
        self.commands.lock().unwrap().push(cmd.to_string());
        let data = self.stream_out_data.lock().unwrap().clone();
        writer.write_all(&data).await?;
        Ok(())
    }

    async fn stream_in(&self, cmd: &str, reader: &mut (dyn AsyncRead + Send + Unpin)) -> Result<()> {
        self.commands.lock().unwrap().push(cmd.to_string());
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await?;
        self.streamed_in.lock().unwrap().extend(data);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Job whose lifecycle calls are recorded as `"<action> <name>"`.
pub struct FakeJob {
    name: String,
    release: String,
    instance_identifier: String,
    has_backup: bool,
    has_restore: bool,
    backup_artifact_name: Option<String>,
    restore_artifact_name: Option<String>,
    backup_locked_before: Vec<JobSpecifier>,
    restore_locked_before: Vec<JobSpecifier>,
    failing: HashSet<String>,
    log: Arc<Mutex<Vec<String>>>,
}

fn specifiers(pairs: &[(&str, &str)]) -> Vec<JobSpecifier> {
    pairs.iter().map(|(n, r)| JobSpecifier::new(*n, *r)).collect()
}

impl FakeJob {
    pub fn new(name: &str, release: &str) -> Self {
        Self {
            name: name.to_string(),
            release: release.to_string(),
            instance_identifier: "instance/fake-uuid".to_string(),
            has_backup: true,
            has_restore: true,
            backup_artifact_name: None,
            restore_artifact_name: None,
            backup_locked_before: Vec::new(),
            restore_locked_before: Vec::new(),
            failing: HashSet::new(),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn on_instance(mut self, identifier: &str) -> Self {
        self.instance_identifier = identifier.to_string();
        self
    }

    pub fn backup_locked_before(mut self, pairs: &[(&str, &str)]) -> Self {
        self.backup_locked_before = specifiers(pairs);
        self
    }

    pub fn restore_locked_before(mut self, pairs: &[(&str, &str)]) -> Self {
        self.restore_locked_before = specifiers(pairs);
        self
    }

    pub fn without_backup(mut self) -> Self {
        self.has_backup = false;
        self
    }

    pub fn without_restore(mut self) -> Self {
        self.has_restore = false;
        self
    }

    pub fn with_backup_artifact_name(mut self, name: &str) -> Self {
        self.backup_artifact_name = Some(name.to_string());
        self
    }

    pub fn with_restore_artifact_name(mut self, name: &str) -> Self {
        self.restore_artifact_name = Some(name.to_string());
        self
    }

    /// Make `action` (e.g. `"backup"`, `"post-backup-unlock(false)"`) fail.
    pub fn failing(mut self, action: &str) -> Self {
        self.failing.insert(action.to_string());
        self
    }

    /// Record calls into a log shared with other jobs.
    pub fn sharing_log(mut self, log: &Arc<Mutex<Vec<String>>>) -> Self {
        self.log = Arc::clone(log);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn call(&self, action: &str) -> Result<()> {
        self.log.lock().unwrap().push(format!("{} {}", action, self.name));
        if self.failing.contains(action) {
            return Err(Error::Remote(format!(
                "Error attempting to run {} script for job {} on {}. Error: boom",
                action, self.name, self.instance_identifier
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Job for FakeJob {
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
        self.has_backup
    }

    fn has_restore(&self) -> bool {
        self.has_restore
    }

    fn backup_artifact_name(&self) -> Option<&str> {
        self.backup_artifact_name.as_deref()
    }

    fn restore_artifact_name(&self) -> Option<&str> {
        self.restore_artifact_name.as_deref()
    }

    fn backup_artifact_directory(&self) -> String {
        format!("/var/vcap/store/bbr-backup/{}", self.name)
    }

    fn restore_artifact_directory(&self) -> String {
        format!("/var/vcap/store/bbr-backup/{}", self.name)
    }

    fn backup_should_be_locked_before(&self) -> &[JobSpecifier] {
        &self.backup_locked_before
    }

    fn restore_should_be_locked_before(&self) -> &[JobSpecifier] {
        &self.restore_locked_before
    }

    async fn pre_backup_lock(&self) -> Result<()> {
        self.call("pre-backup-lock")
    }

    async fn backup(&self) -> Result<()> {
        self.call("backup")
    }

    async fn post_backup_unlock(&self, after_successful_backup: bool) -> Result<()> {
        self.call(&format!("post-backup-unlock({})", after_successful_backup))
    }

    async fn pre_restore_lock(&self) -> Result<()> {
        self.call("pre-restore-lock")
    }

    async fn restore(&self) -> Result<()> {
        self.call("restore")
    }

    async fn post_restore_unlock(&self) -> Result<()> {
        self.call("post-restore-unlock")
    }
}

/// Artifact whose remote side is a byte buffer.
pub struct FakeArtifact {
    identifier: ArtifactIdentifier,
    instance_name: String,
    instance_id: String,
    data: Vec<u8>,
    remote_checksum: Option<BackupChecksum>,
    uploaded: Mutex<Vec<u8>>,
    deleted: AtomicBool,
    fail_delete: bool,
}

impl FakeArtifact {
    pub fn new(identifier: ArtifactIdentifier, instance_name: &str, instance_id: &str) -> Self {
        Self {
            identifier,
            instance_name: instance_name.to_string(),
            instance_id: instance_id.to_string(),
            data: Vec::new(),
            remote_checksum: None,
            uploaded: Mutex::new(Vec::new()),
            deleted: AtomicBool::new(false),
            fail_delete: false,
        }
    }

    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    /// Report this checksum instead of the one computed from the data.
    pub fn with_remote_checksum(mut self, checksum: BackupChecksum) -> Self {
        self.remote_checksum = Some(checksum);
        self
    }

    pub fn failing_delete(mut self) -> Self {
        self.fail_delete = true;
        self
    }

    pub fn uploaded(&self) -> Vec<u8> {
        self.uploaded.lock().unwrap().clone()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteArtifact for FakeArtifact {
    fn identifier(&self) -> &ArtifactIdentifier {
        &self.identifier
    }

    fn instance_name(&self) -> &str {
        &self.instance_name
    }

    fn instance_id(&self) -> &str {
        &self.instance_id
    }

    async fn stream_from_remote(&self, writer: &mut (dyn AsyncWrite + Send + Unpin)) -> Result<()> {
        writer.write_all(&self.data).await?;
        Ok(())
    }

    async fn stream_to_remote(&self, reader: &mut (dyn AsyncRead + Send + Unpin)) -> Result<()> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await?;
        *self.uploaded.lock().unwrap() = data;
        Ok(())
    }

    async fn checksum(&self) -> Result<BackupChecksum> {
        if let Some(checksum) = &self.remote_checksum {
            return Ok(checksum.clone());
        }
        let uploaded = self.uploaded();
        let source = if uploaded.is_empty() { self.data.clone() } else { uploaded };
        if source.is_empty() {
            return Ok(BackupChecksum::new());
        }
        Ok(calculate_tar_checksum(source.as_slice())?)
    }

    async fn size(&self) -> Result<String> {
        Ok(format_bytes(self.data.len() as u64))
    }

    async fn size_in_bytes(&self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }

    async fn delete(&self) -> Result<()> {
        if self.fail_delete {
            return Err(Error::Remote("rm: permission denied".to_string()));
        }
        self.deleted.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Instance with canned jobs and artifacts.
pub struct FakeInstance {
    name: String,
    index: String,
    id: String,
    jobs: Vec<Arc<dyn Job>>,
    backup_artifacts: Vec<Arc<dyn RemoteArtifact>>,
    restore_artifacts: Vec<Arc<dyn RemoteArtifact>>,
    artifact_dir_exists: bool,
    created: AtomicBool,
    cleanup_error: Option<String>,
    cleanups: AtomicUsize,
    previous_cleanups: AtomicUsize,
}

impl FakeInstance {
    pub fn new(name: &str, index: &str, id: &str) -> Self {
        Self {
            name: name.to_string(),
            index: index.to_string(),
            id: id.to_string(),
            jobs: Vec::new(),
            backup_artifacts: Vec::new(),
            restore_artifacts: Vec::new(),
            artifact_dir_exists: false,
            created: AtomicBool::new(false),
            cleanup_error: None,
            cleanups: AtomicUsize::new(0),
            previous_cleanups: AtomicUsize::new(0),
        }
    }

    pub fn with_jobs(mut self, jobs: Vec<Arc<dyn Job>>) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn with_backup_artifacts(mut self, artifacts: Vec<Arc<dyn RemoteArtifact>>) -> Self {
        self.backup_artifacts = artifacts;
        self
    }

    pub fn with_restore_artifacts(mut self, artifacts: Vec<Arc<dyn RemoteArtifact>>) -> Self {
        self.restore_artifacts = artifacts;
        self
    }

    pub fn with_existing_artifact_dir(mut self) -> Self {
        self.artifact_dir_exists = true;
        self
    }

    pub fn failing_cleanup(mut self, message: &str) -> Self {
        self.cleanup_error = Some(message.to_string());
        self
    }

    pub fn cleanup_count(&self) -> usize {
        self.cleanups.load(Ordering::SeqCst)
    }

    pub fn cleanup_previous_count(&self) -> usize {
        self.previous_cleanups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Instance for FakeInstance {
    fn name(&self) -> &str {
        &self.name
    }

    fn index(&self) -> &str {
        &self.index
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn jobs(&self) -> &[Arc<dyn Job>] {
        &self.jobs
    }

    async fn artifact_dir_exists(&self) -> Result<bool> {
        Ok(self.artifact_dir_exists)
    }

    fn artifacts_to_backup(&self) -> Vec<Arc<dyn RemoteArtifact>> {
        self.backup_artifacts.clone()
    }

    fn artifacts_to_restore(&self) -> Vec<Arc<dyn RemoteArtifact>> {
        self.restore_artifacts.clone()
    }

    fn mark_artifact_dir_created(&self) {
        self.created.store(true, Ordering::SeqCst);
    }

    fn artifact_dir_created(&self) -> bool {
        self.created.load(Ordering::SeqCst)
    }

    async fn cleanup(&self) -> Result<()> {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
        match &self.cleanup_error {
            Some(msg) => Err(Error::Remote(msg.clone())),
            None => Ok(()),
        }
    }

    async fn cleanup_previous(&self) -> Result<()> {
        self.previous_cleanups.fetch_add(1, Ordering::SeqCst);
        match &self.cleanup_error {
            Some(msg) => Err(Error::Remote(msg.clone())),
            None => Ok(()),
        }
    }
}
