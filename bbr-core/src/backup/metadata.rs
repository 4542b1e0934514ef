//! YAML schema of the `metadata` file stored in every backup directory.

use crate::artifact::ArtifactIdentifier;
use crate::checksum::BackupChecksum;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp layout used inside the metadata file.
pub const METADATA_TIME_FORMAT: &str = "%Y/%m/%d %H:%M:%S %Z";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackupMetadata {
    pub backup_activity: BackupActivity,

    #[serde(default)]
    pub instances: Vec<InstanceMetadata>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom_artifacts: Vec<ArtifactMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackupActivity {
    pub start_time: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceMetadata {
    pub name: String,

    /// Kept as a string so YAML renders it quoted.
    pub index: String,

    #[serde(default)]
    pub artifacts: Vec<ArtifactMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub name: String,

    #[serde(default)]
    pub checksums: BackupChecksum,
}

pub fn format_metadata_time(time: DateTime<Utc>) -> String {
    time.format(METADATA_TIME_FORMAT).to_string()
}

impl BackupMetadata {
    pub fn with_start_time(start: DateTime<Utc>) -> Self {
        Self {
            backup_activity: BackupActivity {
                start_time: format_metadata_time(start),
                finish_time: None,
            },
            ..Default::default()
        }
    }

    pub fn from_yaml(contents: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(contents)
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Record the checksum of an artifact under the right list.
    pub fn add_checksum(&mut self, id: &ArtifactIdentifier, checksum: BackupChecksum) {
        let artifact = ArtifactMetadata {
            name: id.name().to_string(),
            checksums: checksum,
        };

        match id {
            ArtifactIdentifier::Custom { .. } => self.custom_artifacts.push(artifact),
            ArtifactIdentifier::Default {
                instance_name,
                instance_index,
                ..
            } => {
                let existing = self
                    .instances
                    .iter_mut()
                    .find(|i| &i.name == instance_name && &i.index == instance_index);
                match existing {
                    Some(instance) => instance.artifacts.push(artifact),
                    None => self.instances.push(InstanceMetadata {
                        name: instance_name.clone(),
                        index: instance_index.clone(),
                        artifacts: vec![artifact],
                    }),
                }
            }
        }
    }

    /// Stored checksum for an artifact, if the metadata mentions it.
    pub fn checksum_for(&self, id: &ArtifactIdentifier) -> Option<&BackupChecksum> {
        match id {
            ArtifactIdentifier::Custom { name } => self
                .custom_artifacts
                .iter()
                .find(|a| &a.name == name)
                .map(|a| &a.checksums),
            ArtifactIdentifier::Default {
                instance_name,
                instance_index,
                name,
                ..
            } => self
                .instances
                .iter()
                .filter(|i| &i.name == instance_name && &i.index == instance_index)
                .flat_map(|i| i.artifacts.iter())
                .find(|a| &a.name == name)
                .map(|a| &a.checksums),
        }
    }

    /// Every artifact the metadata mentions, with the checksum recorded for it.
    pub fn artifacts(&self) -> Vec<(ArtifactIdentifier, &BackupChecksum)> {
        let mut all = Vec::new();
        for instance in &self.instances {
            for artifact in &instance.artifacts {
                all.push((
                    ArtifactIdentifier::default_artifact(
                        instance.name.clone(),
                        instance.index.clone(),
                        "",
                        artifact.name.clone(),
                    ),
                    &artifact.checksums,
                ));
            }
        }
        for artifact in &self.custom_artifacts {
            all.push((ArtifactIdentifier::custom(artifact.name.clone()), &artifact.checksums));
        }
        all
    }
}
