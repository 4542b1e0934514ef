//! Phase executors.
//!
//! Work is handed over as ordered phases of executables. No executable of a
//! phase starts before every executable of the previous phase has finished,
//! and a failure never stops the remaining work: every error is collected.

pub mod artifact;
pub mod job;

use crate::{Error, Errors, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

pub use artifact::{BackupDownloadExecutable, BackupUploadExecutable};
pub use job::{JobAction, JobExecutable};

/// One unit of work inside a phase.
#[async_trait]
pub trait Executable: Send + Sync {
    async fn execute(&self) -> Result<()>;
}

pub type ExecutablePhases = Vec<Vec<Arc<dyn Executable>>>;

#[async_trait]
pub trait Executor: Send + Sync {
    /// Run every phase in order and return all errors.
    async fn run(&self, phases: ExecutablePhases) -> Errors;
}

/// Runs executables one after another, in declaration order.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialExecutor;

#[async_trait]
impl Executor for SerialExecutor {
    async fn run(&self, phases: ExecutablePhases) -> Errors {
        let mut errors = Errors::new();
        for phase in phases {
            for executable in phase {
                if let Err(e) = executable.execute().await {
                    errors.push(e);
                }
            }
        }
        errors
    }
}

/// Runs the executables of a phase concurrently, one task each.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParallelExecutor;

#[async_trait]
impl Executor for ParallelExecutor {
    async fn run(&self, phases: ExecutablePhases) -> Errors {
        let mut errors = Errors::new();
        for phase in phases {
            let handles: Vec<_> = phase
                .into_iter()
                .map(|executable| tokio::spawn(async move { executable.execute().await }))
                .collect();

            // Wait for the whole phase before moving on
            for handle in handles {
                match handle.await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => errors.push(e),
                    Err(e) => {
                        warn!("Executable task panicked: {}", e);
                        errors.push(Error::from(e));
                    }
                }
            }
        }
        errors
    }
}
