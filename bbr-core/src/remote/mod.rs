//! Transport contract for talking to deployment instances.
//!
//! Everything the orchestrator does on a VM goes through a [`RemoteRunner`]:
//! plain commands, and commands whose stdout or stdin carries an artifact
//! stream. The concrete transport (SSH in the CLI) lives outside the core.

use crate::{Error, Result};
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

/// Root directory for backup artifacts on every instance.
pub const ARTIFACT_DIRECTORY: &str = "/var/vcap/store/bbr-backup";

/// Root directory under which jobs are installed.
pub const JOBS_DIRECTORY: &str = "/var/vcap/jobs";

/// Environment variable naming the artifact directory for a script.
pub const ENV_ARTIFACT_DIRECTORY: &str = "BBR_ARTIFACT_DIRECTORY";

/// Environment variable telling `post-backup-unlock` how the backup went.
pub const ENV_AFTER_BACKUP_SUCCESSFUL: &str = "BBR_AFTER_BACKUP_SCRIPTS_SUCCESSFUL";

/// Environment variable carrying the orchestrator version.
pub const ENV_VERSION: &str = "BBR_VERSION";

/// Captured result of a remote command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub status: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }

    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Runs commands on one remote instance.
#[async_trait]
pub trait RemoteRunner: Send + Sync {
    /// Human-readable address of the remote end, for log lines.
    fn host(&self) -> &str;

    /// Run a command and capture its output. A non-zero exit status is not
    /// an error at this level.
    async fn run(&self, cmd: &str) -> Result<CommandOutput>;

    /// Run a command and copy its stdout into `writer`.
    async fn stream_out(
        &self,
        cmd: &str,
        writer: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<()>;

    /// Run a command with `reader` copied into its stdin.
    async fn stream_in(&self, cmd: &str, reader: &mut (dyn AsyncRead + Send + Unpin))
        -> Result<()>;

    /// Tear down the connection.
    async fn close(&self) -> Result<()>;
}

/// Run `cmd` and fail unless it exits zero; returns stdout.
pub async fn run_checked(runner: &dyn RemoteRunner, cmd: &str) -> Result<String> {
    let output = runner.run(cmd).await?;
    if !output.success() {
        return Err(Error::Remote(format!(
            "'{}' on {} exited {}: {}",
            cmd,
            runner.host(),
            output.status,
            output.stderr_str().trim()
        )));
    }
    Ok(output.stdout_str())
}

/// Build a `sudo` command line that exports `env` to `command`.
pub fn sudo_with_env(env: &[(&str, String)], command: &str) -> String {
    let mut line = String::from("sudo");
    for (key, value) in env {
        line.push_str(&format!(" {}={}", key, value));
    }
    line.push(' ');
    line.push_str(command);
    line
}
