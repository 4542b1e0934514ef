//! Per-file SHA-256 checksums of backup artifacts.
//!
//! An artifact is a tar stream; its checksum maps every regular file inside
//! the tar to the hex SHA-256 of its contents. The same mapping is computed
//! remotely before a transfer and locally after it.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::{self, Read};

/// Maximum number of mismatched paths shown in an error message.
pub const MAX_REPORTED_MISMATCHES: usize = 10;

/// Mapping of file path (as it appears in the tar) to hex SHA-256.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackupChecksum(BTreeMap<String, String>);

impl BackupChecksum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, digest: impl Into<String>) {
        self.0.insert(path.into(), digest.into());
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.0.get(path).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    /// Same key set and the same digest for every key.
    pub fn matches(&self, other: &BackupChecksum) -> bool {
        self == other
    }

    /// Paths whose digest differs or that are present on only one side,
    /// sorted.
    pub fn mismatched_files(&self, other: &BackupChecksum) -> Vec<String> {
        let mut mismatched: Vec<String> = self
            .0
            .iter()
            .filter(|(path, digest)| other.0.get(*path) != Some(*digest))
            .map(|(path, _)| path.clone())
            .collect();
        mismatched.extend(
            other
                .0
                .keys()
                .filter(|path| !self.0.contains_key(*path))
                .cloned(),
        );
        mismatched.sort();
        mismatched
    }
}

impl FromIterator<(String, String)> for BackupChecksum {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Render a mismatch the way operators see it:
/// `[a b c]. Checksum failed for N files in total`.
pub fn describe_mismatch(mismatched: &[String]) -> String {
    let shown: Vec<&str> = mismatched
        .iter()
        .take(MAX_REPORTED_MISMATCHES)
        .map(String::as_str)
        .collect();
    format!(
        "[{}]. Checksum failed for {} files in total",
        shown.join(" "),
        mismatched.len()
    )
}

/// Hex SHA-256 of a byte slice.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Checksum every regular file inside a tar stream.
///
/// Entry paths are kept exactly as written in the tar, so an archive made
/// with `tar -C <dir> -c .` yields `./`-prefixed keys matching
/// [`parse_shasum_output`] over `find .`. Directories and the synthetic `./`
/// entry are skipped.
pub fn calculate_tar_checksum<R: Read>(reader: R) -> io::Result<BackupChecksum> {
    let mut archive = tar::Archive::new(reader);
    let mut checksum = BackupChecksum::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let path = entry.path()?.to_string_lossy().into_owned();
        if is_root_entry(&path) {
            continue;
        }

        let mut hasher = Sha256::new();
        io::copy(&mut entry, &mut hasher)?;
        checksum.insert(path, hex::encode(hasher.finalize()));
    }

    Ok(checksum)
}

fn is_root_entry(path: &str) -> bool {
    matches!(path, "" | "." | "./")
}

/// Parse `shasum -a 256` output (`<digest>  <path>` per line). Paths are
/// kept verbatim; a `*` binary-mode marker is dropped.
pub fn parse_shasum_output(output: &str) -> BackupChecksum {
    output
        .lines()
        .filter_map(|line| {
            let line = line.trim_end();
            let (digest, path) = line.split_once(char::is_whitespace)?;
            let path = path.trim_start();
            let path = path.strip_prefix('*').unwrap_or(path);
            if digest.is_empty() || is_root_entry(path) || path == "-" {
                return None;
            }
            Some((path.to_string(), digest.to_string()))
        })
        .collect()
}
