//! What a finished command prints and how it exits.

use bbr_core::Errors;

/// Which exit code mapping and cleanup advice a command reports with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// `pre-backup-check`: reads only, never advises a cleanup.
    Check,
    Backup,
    Restore,
}

/// Rendered result of a run.
#[derive(Debug, Default)]
pub struct Report {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    pub exit_code: u8,
}

impl Report {
    pub fn new(deployment_name: &str, errors: &Errors, outcome: Outcome) -> Self {
        let mut report = Report::default();

        if errors.is_empty() {
            if outcome == Outcome::Check {
                report
                    .stdout
                    .push(format!("Deployment '{}' can be backed up.", deployment_name));
            }
            return report;
        }

        if outcome == Outcome::Check {
            report
                .stderr
                .push(format!("Deployment '{}' cannot be backed up.", deployment_name));
        }
        report.stderr.push(errors.report());

        if let Some(command) = cleanup_command(errors, outcome) {
            report.stderr.push(format!(
                "It is recommended that you run `bbr {}` to ensure that any temp files are cleaned up and all jobs are unlocked.",
                command
            ));
        }

        let code = match outcome {
            Outcome::Check => 1,
            Outcome::Backup => errors.exit_code(),
            Outcome::Restore => errors.restore_exit_code(),
        };
        report.exit_code = u8::try_from(code).unwrap_or(1);
        report
    }

    pub fn print(&self) {
        for line in &self.stdout {
            println!("{}", line);
        }
        for line in &self.stderr {
            eprintln!("{}", line);
        }
    }
}

fn cleanup_command(errors: &Errors, outcome: Outcome) -> Option<&'static str> {
    if !errors.recommends_cleanup() {
        return None;
    }
    match outcome {
        Outcome::Check => None,
        Outcome::Backup => Some("backup-cleanup"),
        Outcome::Restore => Some("restore-cleanup"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::{InventoryDeploymentManager, SshConnector};
    use bbr_core::backup::DirectoryBackupManager;
    use bbr_core::copier::ArtifactCopier;
    use bbr_core::executor::SerialExecutor;
    use bbr_core::orchestrator::{BackupOptions, Backuper, PreBackupChecker};
    use bbr_core::orderer::KahnLockOrderer;
    use bbr_core::Error;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    fn empty_inventory() -> Arc<InventoryDeploymentManager> {
        Arc::new(InventoryDeploymentManager::new(
            Vec::new(),
            Arc::new(SshConnector),
            Arc::new(SerialExecutor),
            "1.0.0",
        ))
    }

    fn advises_cleanup(report: &Report) -> bool {
        report.stderr.iter().any(|l| l.starts_with("It is recommended"))
    }

    #[tokio::test]
    async fn test_unknown_deployment_backup_has_no_cleanup_advice() {
        let dir = TempDir::new().unwrap();
        let backuper = Backuper::new(
            empty_inventory(),
            Arc::new(DirectoryBackupManager::new()),
            Arc::new(KahnLockOrderer::for_backup()),
            ArtifactCopier::new(Arc::new(SerialExecutor)),
            bbr_core::system_clock(),
        );
        let options = BackupOptions {
            artifact_path: dir.path().to_path_buf(),
            ..Default::default()
        };
        let errors = backuper
            .backup("redis", &options, &CancellationToken::new())
            .await;

        let report = Report::new("redis", &errors, Outcome::Backup);
        assert_eq!(report.exit_code, 1);
        assert!(report.stderr[0].contains("Deployment 'redis' not found"));
        assert!(!advises_cleanup(&report));
    }

    #[tokio::test]
    async fn test_failed_check_has_no_cleanup_advice() {
        let checker = PreBackupChecker::new(
            empty_inventory(),
            Arc::new(KahnLockOrderer::for_backup()),
            bbr_core::system_clock(),
        );
        let errors = checker.check("redis", &CancellationToken::new()).await;

        let report = Report::new("redis", &errors, Outcome::Check);
        assert_eq!(report.exit_code, 1);
        assert_eq!(report.stderr[0], "Deployment 'redis' cannot be backed up.");
        assert!(!advises_cleanup(&report));

        // Even an error that would warrant a cleanup after a backup.
        let errors = Errors::from(Error::Lock("redis lock failed".to_string()));
        assert!(errors.recommends_cleanup());
        assert!(!advises_cleanup(&Report::new("redis", &errors, Outcome::Check)));
    }

    #[test]
    fn test_successful_check_prints_to_stdout() {
        let report = Report::new("redis", &Errors::new(), Outcome::Check);
        assert_eq!(report.stdout, vec!["Deployment 'redis' can be backed up."]);
        assert!(report.stderr.is_empty());
        assert_eq!(report.exit_code, 0);
    }

    #[test]
    fn test_failed_backup_and_restore_advise_matching_cleanup() {
        let errors = Errors::from(Error::Backup("backup script failed".to_string()));
        let report = Report::new("redis", &errors, Outcome::Backup);
        assert_eq!(report.exit_code, 8);
        assert!(report.stderr.iter().any(|l| l.contains("`bbr backup-cleanup`")));

        let errors = Errors::from(Error::generic("restore script failed"));
        let report = Report::new("redis", &errors, Outcome::Restore);
        assert_eq!(report.exit_code, 1);
        assert!(report.stderr.iter().any(|l| l.contains("`bbr restore-cleanup`")));
    }

    #[test]
    fn test_post_unlock_only_exit_code() {
        let errors = Errors::from(vec![
            Error::PostUnlock("unlock failed".to_string()),
            Error::Cleanup("cleanup failed".to_string()),
        ]);
        let report = Report::new("redis", &errors, Outcome::Backup);
        assert_eq!(report.exit_code, 48);
        assert!(!advises_cleanup(&report));
        assert_eq!(Report::new("redis", &errors, Outcome::Restore).exit_code, 42);
    }
}
