//! Remote artifacts backed by a directory on an instance.

use super::{ArtifactIdentifier, RemoteArtifact};
use crate::checksum::{parse_shasum_output, BackupChecksum};
use crate::remote::{run_checked, RemoteRunner};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};

/// A job's artifact directory on a remote instance, moved as a tar stream.
pub struct RemoteDirArtifact {
    runner: Arc<dyn RemoteRunner>,
    identifier: ArtifactIdentifier,
    instance_name: String,
    instance_id: String,
    directory: String,
}

impl RemoteDirArtifact {
    pub fn new(
        runner: Arc<dyn RemoteRunner>,
        identifier: ArtifactIdentifier,
        instance_name: impl Into<String>,
        instance_id: impl Into<String>,
        directory: impl Into<String>,
    ) -> Self {
        Self {
            runner,
            identifier,
            instance_name: instance_name.into(),
            instance_id: instance_id.into(),
            directory: directory.into(),
        }
    }
}

#[async_trait]
impl RemoteArtifact for RemoteDirArtifact {
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
        let cmd = format!("sudo tar -C {} -c .", self.directory);
        self.runner.stream_out(&cmd, writer).await
    }

    async fn stream_to_remote(&self, reader: &mut (dyn AsyncRead + Send + Unpin)) -> Result<()> {
        let cmd = format!(
            "sudo sh -c 'mkdir -p {dir} && tar -C {dir} -x'",
            dir = self.directory
        );
        self.runner.stream_in(&cmd, reader).await
    }

    async fn checksum(&self) -> Result<BackupChecksum> {
        let cmd = format!(
            "cd {} && sudo sh -c 'find . -type f | xargs --no-run-if-empty shasum -a 256'",
            self.directory
        );
        let output = run_checked(self.runner.as_ref(), &cmd).await?;
        Ok(parse_shasum_output(&output))
    }

    async fn size(&self) -> Result<String> {
        let cmd = format!("sudo du -sh {} | cut -f1", self.directory);
        let output = run_checked(self.runner.as_ref(), &cmd).await?;
        Ok(output.trim().to_string())
    }

    async fn size_in_bytes(&self) -> Result<u64> {
        let cmd = format!("sudo du -sb {} | cut -f1", self.directory);
        let output = run_checked(self.runner.as_ref(), &cmd).await?;
        output.trim().parse::<u64>().map_err(|e| {
            Error::Remote(format!(
                "unable to parse size of {} on {}: {} ({:?})",
                self.directory,
                self.location(),
                e,
                output.trim()
            ))
        })
    }

    async fn delete(&self) -> Result<()> {
        let cmd = format!("sudo rm -rf {}", self.directory);
        run_checked(self.runner.as_ref(), &cmd).await?;
        Ok(())
    }
}
