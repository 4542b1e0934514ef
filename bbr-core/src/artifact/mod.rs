//! Artifact identity and the remote artifact contract.
//!
//! The file name derived from an [`ArtifactIdentifier`] is the only link
//! between the instance that produced an artifact and the restore that
//! consumes it, so the naming rules here define the on-disk layout.

pub mod remote;

use crate::checksum::BackupChecksum;
use crate::Result;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

pub use remote::RemoteDirArtifact;

/// Identity of one artifact within a backup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArtifactIdentifier {
    /// Tied to the instance that produced it.
    Default {
        instance_name: String,
        instance_index: String,
        instance_id: String,
        name: String,
    },
    /// Named by the job; unique across the deployment.
    Custom { name: String },
}

impl ArtifactIdentifier {
    pub fn default_artifact(
        instance_name: impl Into<String>,
        instance_index: impl Into<String>,
        instance_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        ArtifactIdentifier::Default {
            instance_name: instance_name.into(),
            instance_index: instance_index.into(),
            instance_id: instance_id.into(),
            name: name.into(),
        }
    }

    pub fn custom(name: impl Into<String>) -> Self {
        ArtifactIdentifier::Custom { name: name.into() }
    }

    pub fn name(&self) -> &str {
        match self {
            ArtifactIdentifier::Default { name, .. } | ArtifactIdentifier::Custom { name } => name,
        }
    }

    pub fn has_custom_name(&self) -> bool {
        matches!(self, ArtifactIdentifier::Custom { .. })
    }

    /// File name of the artifact inside the backup directory.
    pub fn file_name(&self) -> String {
        match self {
            ArtifactIdentifier::Default {
                instance_name,
                instance_index,
                name,
                ..
            } => default_artifact_file_name(instance_name, instance_index, name),
            ArtifactIdentifier::Custom { name } => custom_artifact_file_name(name),
        }
    }
}

pub fn default_artifact_file_name(instance_name: &str, instance_index: &str, name: &str) -> String {
    format!("{}-{}-{}.tar", instance_name, instance_index, name)
}

pub fn custom_artifact_file_name(name: &str) -> String {
    format!("{}.tar", name)
}

/// An artifact living on a remote instance.
#[async_trait]
pub trait RemoteArtifact: Send + Sync {
    fn identifier(&self) -> &ArtifactIdentifier;

    fn instance_name(&self) -> &str;

    fn instance_id(&self) -> &str;

    /// `<instance-name>/<instance-id>`, as used in operator-facing messages.
    fn location(&self) -> String {
        format!("{}/{}", self.instance_name(), self.instance_id())
    }

    /// Stream the artifact's tar bytes into `writer`.
    async fn stream_from_remote(&self, writer: &mut (dyn AsyncWrite + Send + Unpin)) -> Result<()>;

    /// Unpack the tar bytes read from `reader` into the remote location.
    async fn stream_to_remote(&self, reader: &mut (dyn AsyncRead + Send + Unpin)) -> Result<()>;

    /// Per-file SHA-256 computed on the remote side.
    async fn checksum(&self) -> Result<BackupChecksum>;

    /// Human-readable size.
    async fn size(&self) -> Result<String>;

    async fn size_in_bytes(&self) -> Result<u64>;

    /// Remove the remote copy.
    async fn delete(&self) -> Result<()>;
}
