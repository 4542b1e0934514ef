//! Entry points: each orchestrator assembles a workflow from steps and runs
//! it for one deployment.

pub mod backup;
pub mod check;
pub mod cleanup;
pub mod restore;

pub use backup::{BackupOptions, Backuper};
pub use check::PreBackupChecker;
pub use cleanup::{BackupCleaner, RestoreCleaner};
pub use restore::Restorer;
