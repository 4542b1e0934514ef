//! BBR Core Library
//!
//! Orchestrates backup and restore of multi-VM deployments: discovers the
//! lifecycle scripts each job ships, runs them in lock order across the fleet,
//! and streams the resulting artifacts into a checksummed local backup.

pub mod artifact;
pub mod backup;
pub mod checksum;
pub mod copier;
pub mod deployment;
pub mod executor;
pub mod instance;
pub mod job;
pub mod orchestrator;
pub mod orderer;
pub mod remote;
pub mod transfer;
pub mod utils;
pub mod workflow;

#[cfg(test)]
mod testutil;
#[cfg(test)]
mod tests;

use chrono::{DateTime, Utc};
use std::sync::Arc;

// Re-export commonly used types
pub use utils::errors::{Error, ErrorKind, Errors};
pub type Result<T> = std::result::Result<T, Error>;

/// Clock used wherever a timestamp is recorded.
pub type NowFn = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Clock backed by the system time.
pub fn system_clock() -> NowFn {
    Arc::new(Utc::now)
}
