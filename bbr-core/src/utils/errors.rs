//! Error taxonomy for the orchestrator.
//!
//! Every failure is tagged with a kind. The kinds decide which workflow edge is
//! taken, whether the operator is advised to run a cleanup, and which bits end
//! up in the process exit code.

use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Generic(String),

    /// Pre-backup checks rejected the deployment before anything was touched.
    #[error("{0}")]
    PreCheck(String),

    #[error("{0}")]
    Lock(String),

    #[error("{0}")]
    Backup(String),

    #[error("{0}")]
    PostUnlock(String),

    #[error("{0}")]
    Drain(String),

    #[error("{0}")]
    Cleanup(String),

    #[error("{0}")]
    ArtifactInvalid(String),

    #[error("Remote command failed: {0}")]
    Remote(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Category of an [`Error`], independent of its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Generic,
    PreCheck,
    Lock,
    Backup,
    PostUnlock,
    Drain,
    Cleanup,
    ArtifactInvalid,
}

impl Error {
    pub fn generic(msg: impl Into<String>) -> Self {
        Error::Generic(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::PreCheck(_) => ErrorKind::PreCheck,
            Error::Lock(_) => ErrorKind::Lock,
            Error::Backup(_) => ErrorKind::Backup,
            Error::PostUnlock(_) => ErrorKind::PostUnlock,
            Error::Drain(_) => ErrorKind::Drain,
            Error::Cleanup(_) => ErrorKind::Cleanup,
            Error::ArtifactInvalid(_) => ErrorKind::ArtifactInvalid,
            Error::Generic(_) | Error::Remote(_) | Error::Io(_) | Error::Yaml(_) => {
                ErrorKind::Generic
            }
        }
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Error::Generic(format!("background task failed: {}", e))
    }
}

impl ErrorKind {
    /// Exit-code bit contributed by this kind on the backup side.
    pub fn exit_bits(self) -> i32 {
        match self {
            ErrorKind::Generic
            | ErrorKind::PreCheck
            | ErrorKind::Drain
            | ErrorKind::ArtifactInvalid => 1,
            ErrorKind::Lock => 1 << 2,
            ErrorKind::Backup => 1 << 3,
            ErrorKind::PostUnlock => 1 << 4,
            ErrorKind::Cleanup => 1 << 5,
        }
    }
}

/// Ordered collection of every error a workflow produced.
#[derive(Debug, Default)]
pub struct Errors(Vec<Error>);

impl Errors {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, err: Error) {
        self.0.push(err);
    }

    pub fn extend(&mut self, other: Errors) {
        self.0.extend(other.0);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Error> {
        self.0.iter()
    }

    /// `Ok(())` when empty, otherwise the collection itself.
    pub fn into_result(self) -> Result<(), Errors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    /// Exactly one error, and it is a cleanup failure.
    pub fn is_cleanup(&self) -> bool {
        self.0.len() == 1 && self.0[0].kind() == ErrorKind::Cleanup
    }

    /// Only unlock and cleanup failures, with at least one unlock failure.
    pub fn is_post_backup(&self) -> bool {
        let mut saw_unlock = false;
        for err in &self.0 {
            match err.kind() {
                ErrorKind::PostUnlock => saw_unlock = true,
                ErrorKind::Cleanup => {}
                _ => return false,
            }
        }
        saw_unlock
    }

    pub fn is_fatal(&self) -> bool {
        !self.0.is_empty() && !self.is_cleanup() && !self.is_post_backup()
    }

    /// Whether the operator should be pointed at `backup-cleanup`.
    ///
    /// Pre-check failures never touched the deployment, so there is nothing
    /// to clean up after them.
    pub fn recommends_cleanup(&self) -> bool {
        self.is_fatal()
            && !self
                .0
                .iter()
                .all(|e| matches!(e.kind(), ErrorKind::PreCheck | ErrorKind::Cleanup))
    }

    /// Backup-side exit code: OR of the bits of every kind present.
    pub fn exit_code(&self) -> i32 {
        self.0.iter().fold(0, |code, e| code | e.kind().exit_bits())
    }

    /// Restore-side exit code.
    pub fn restore_exit_code(&self) -> i32 {
        if self.0.is_empty() {
            0
        } else if self.is_cleanup() {
            2
        } else if self.is_post_backup() {
            42
        } else {
            1
        }
    }

    /// Multi-line rendering for the terminal: a count header, then one
    /// error per line.
    pub fn report(&self) -> String {
        let mut out = format!("{} error{} occurred:", self.0.len(), plural(self.0.len()));
        for (i, err) in self.0.iter().enumerate() {
            out.push_str(&format!("\nerror {}:\n{}", i + 1, err));
        }
        out
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

impl fmt::Display for Errors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self.0.iter().map(|e| e.to_string()).collect();
        write!(f, "{}", messages.join("\n"))
    }
}

impl std::error::Error for Errors {}

impl From<Vec<Error>> for Errors {
    fn from(errs: Vec<Error>) -> Self {
        Self(errs)
    }
}

impl From<Error> for Errors {
    fn from(err: Error) -> Self {
        Self(vec![err])
    }
}

impl FromIterator<Error> for Errors {
    fn from_iter<I: IntoIterator<Item = Error>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Errors {
    type Item = Error;
    type IntoIter = std::vec::IntoIter<Error>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
