//! Finding the jobs on an instance and reading their `metadata` scripts.

use super::script::{JobHost, ScriptJob, ScriptKind, Scripts};
use super::{Job, JobProperties, JobSpecifier};
use crate::remote::{sudo_with_env, RemoteRunner, ENV_VERSION, JOBS_DIRECTORY};
use crate::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{debug, warn};

/// Document printed by a job's `metadata` script.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct JobMetadata {
    /// Deprecated; only detected so a warning can be logged.
    #[serde(default)]
    pub backup_name: Option<String>,

    /// Deprecated; only detected so a warning can be logged.
    #[serde(default)]
    pub restore_name: Option<String>,

    #[serde(default)]
    pub backup_should_be_locked_before: Vec<JobSpecifier>,

    #[serde(default)]
    pub restore_should_be_locked_before: Vec<JobSpecifier>,

    #[serde(default)]
    pub skip_bbr_scripts: bool,
}

impl JobMetadata {
    pub fn parse(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }
}

/// Group script paths of the form `/var/vcap/jobs/<job>/bin/bbr/<script>` by
/// job. Unrecognised script names are ignored.
pub fn group_scripts(paths: &str) -> BTreeMap<String, Scripts> {
    let prefix = format!("{}/", JOBS_DIRECTORY);
    let mut jobs: BTreeMap<String, Scripts> = BTreeMap::new();

    for path in paths.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let Some(rest) = path.strip_prefix(&prefix) else {
            continue;
        };
        let parts: Vec<&str> = rest.split('/').collect();
        let [job, "bin", "bbr", script] = parts.as_slice() else {
            continue;
        };
        match ScriptKind::from_file_name(script) {
            Some(kind) => {
                jobs.entry(job.to_string())
                    .or_default()
                    .insert(kind, path.to_string());
            }
            None => debug!("Ignoring unknown script {}", path),
        }
    }

    jobs
}

/// Discover every backup-aware job on one instance.
pub async fn discover_jobs(
    runner: Arc<dyn RemoteRunner>,
    host: &JobHost,
    properties: &[JobProperties],
    bbr_version: &str,
    artifact_dir_created: Arc<AtomicBool>,
) -> Result<Vec<Arc<dyn Job>>> {
    let cmd = format!("sudo sh -c 'find {}/*/bin/bbr/* -type f'", JOBS_DIRECTORY);
    let output = runner.run(&cmd).await?;
    if !output.success() && !output.stderr_str().contains("No such file or directory") {
        return Err(Error::Remote(format!(
            "finding scripts failed on {}/{}: {}",
            host.instance_name,
            host.instance_id,
            output.stderr_str().trim()
        )));
    }

    let mut jobs: Vec<Arc<dyn Job>> = Vec::new();
    for (name, scripts) in group_scripts(&output.stdout_str()) {
        let metadata = match scripts.get(&ScriptKind::Metadata) {
            Some(path) => read_metadata(runner.as_ref(), host, &name, path, bbr_version).await?,
            None => JobMetadata::default(),
        };

        if metadata.skip_bbr_scripts {
            debug!(
                "Skipping scripts for job {} on {}/{}",
                name, host.instance_name, host.instance_id
            );
            continue;
        }
        if metadata.backup_name.is_some() {
            warn!(
                "Job {} on {}/{} sets 'backup_name' in its metadata; this is deprecated and ignored",
                name, host.instance_name, host.instance_id
            );
        }
        if metadata.restore_name.is_some() {
            warn!(
                "Job {} on {}/{} sets 'restore_name' in its metadata; this is deprecated and ignored",
                name, host.instance_name, host.instance_id
            );
        }

        let props = properties.iter().find(|p| p.name == name);
        jobs.push(Arc::new(ScriptJob::new(
            Arc::clone(&runner),
            name.clone(),
            props.map(|p| p.release.clone()).unwrap_or_default(),
            host,
            scripts,
            metadata,
            props.map(|p| p.backup_one_restore_all).unwrap_or(false),
            bbr_version,
            Arc::clone(&artifact_dir_created),
        )));
    }

    Ok(jobs)
}

async fn read_metadata(
    runner: &dyn RemoteRunner,
    host: &JobHost,
    job: &str,
    path: &str,
    bbr_version: &str,
) -> Result<JobMetadata> {
    let output = runner
        .run(&sudo_with_env(&[(ENV_VERSION, bbr_version.to_string())], path))
        .await?;
    if !output.success() {
        return Err(Error::Remote(format!(
            "Error attempting to run metadata script for job {} on {}/{}. Error: {}",
            job,
            host.instance_name,
            host.instance_id,
            output.stderr_str().trim()
        )));
    }

    JobMetadata::parse(&output.stdout_str()).map_err(|e| {
        Error::generic(format!(
            "Reading job metadata for {}/{} failed: {}",
            host.instance_name, host.instance_id, e
        ))
    })
}
