//! Lock ordering of jobs.
//!
//! Each job may declare jobs that must be locked after it. Those declarations
//! form a directed graph over every job in the deployment; a Kahn sort turns it
//! into phases. Jobs in one phase have no ordering between them, phases run in
//! order for locking and in reverse for unlocking.

use crate::job::{Job, JobSpecifier};
use crate::{Error, Result};
use std::collections::BTreeSet;
use std::sync::Arc;

pub const CYCLIC_GRAPH_MESSAGE: &str = "job locking dependency graph is cyclic";

/// Ordered groups of jobs.
pub type Phases = Vec<Vec<Arc<dyn Job>>>;

/// Selects which declaration of a job constrains the order.
pub trait LockingSpecifier: Send + Sync {
    fn locked_before<'a>(&self, job: &'a dyn Job) -> Result<&'a [JobSpecifier]>;
}

/// Uses `backup_should_be_locked_before`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackupLockingSpecifier;

impl LockingSpecifier for BackupLockingSpecifier {
    fn locked_before<'a>(&self, job: &'a dyn Job) -> Result<&'a [JobSpecifier]> {
        Ok(job.backup_should_be_locked_before())
    }
}

/// Uses `restore_should_be_locked_before`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RestoreLockingSpecifier;

impl LockingSpecifier for RestoreLockingSpecifier {
    fn locked_before<'a>(&self, job: &'a dyn Job) -> Result<&'a [JobSpecifier]> {
        Ok(job.restore_should_be_locked_before())
    }
}

/// Director backups run with a fixed order; any declaration is rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectorLockingSpecifier;

impl LockingSpecifier for DirectorLockingSpecifier {
    fn locked_before<'a>(&self, job: &'a dyn Job) -> Result<&'a [JobSpecifier]> {
        let declared = job.backup_should_be_locked_before();
        if !declared.is_empty() || !job.restore_should_be_locked_before().is_empty() {
            return Err(Error::generic(format!(
                "director job '{}' specifies locking dependencies, which are not allowed for director jobs",
                job.name()
            )));
        }
        Ok(declared)
    }
}

pub trait LockOrderer: Send + Sync {
    fn order(&self, jobs: &[Arc<dyn Job>]) -> Result<Phases>;
}

/// Kahn topological sort over `locked_before` declarations.
#[derive(Debug, Clone, Default)]
pub struct KahnLockOrderer<S> {
    specifier: S,
}

impl<S: LockingSpecifier> KahnLockOrderer<S> {
    pub fn new(specifier: S) -> Self {
        Self { specifier }
    }
}

impl KahnLockOrderer<BackupLockingSpecifier> {
    pub fn for_backup() -> Self {
        Self::new(BackupLockingSpecifier)
    }
}

impl KahnLockOrderer<RestoreLockingSpecifier> {
    pub fn for_restore() -> Self {
        Self::new(RestoreLockingSpecifier)
    }
}

impl<S: LockingSpecifier> LockOrderer for KahnLockOrderer<S> {
    fn order(&self, jobs: &[Arc<dyn Job>]) -> Result<Phases> {
        // Edge (a, b): job a locks before job b.
        let mut edges: BTreeSet<(usize, usize)> = BTreeSet::new();
        for (before, job) in jobs.iter().enumerate() {
            for target in self.specifier.locked_before(job.as_ref())? {
                for (after, candidate) in jobs.iter().enumerate() {
                    if candidate.name() == target.name && candidate.release() == target.release {
                        edges.insert((before, after));
                    }
                }
            }
        }

        let mut in_degree = vec![0usize; jobs.len()];
        for &(_, after) in &edges {
            in_degree[after] += 1;
        }

        let mut emitted = vec![false; jobs.len()];
        let mut remaining = jobs.len();
        let mut phases = Vec::new();

        while remaining > 0 {
            let ready: Vec<usize> = (0..jobs.len())
                .filter(|&i| !emitted[i] && in_degree[i] == 0)
                .collect();
            if ready.is_empty() {
                return Err(Error::generic(CYCLIC_GRAPH_MESSAGE));
            }

            for &i in &ready {
                emitted[i] = true;
                for &(_, after) in edges.range((i, 0)..=(i, usize::MAX)) {
                    in_degree[after] -= 1;
                }
            }
            remaining -= ready.len();
            phases.push(ready.into_iter().map(|i| Arc::clone(&jobs[i])).collect());
        }

        Ok(phases)
    }
}

/// Unlock order: the lock phases, last first.
pub fn reversed(phases: &Phases) -> Phases {
    phases.iter().rev().cloned().collect()
}
