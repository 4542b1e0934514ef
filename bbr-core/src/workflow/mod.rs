//! Workflow engine.
//!
//! A workflow is a graph of named steps. Each node has an optional success
//! edge and an optional failure edge; a run starts at the start node, follows
//! the edge matching each step's outcome, and stops where no edge leads on.
//! Failures are collected rather than returned early, so unlock and cleanup
//! steps still run after something went wrong.

pub mod session;
pub mod steps;

use crate::{Error, Errors};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub use session::Session;

pub const CANCELLED_MESSAGE: &str = "operation cancelled";

#[async_trait]
pub trait Step: Send + Sync {
    async fn run(&self, session: &mut Session) -> Result<(), Errors>;
}

/// Handle to a node of a [`Workflow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeId(usize);

struct Node {
    name: String,
    step: Box<dyn Step>,
    on_success: Option<NodeId>,
    on_failure: Option<NodeId>,
}

#[derive(Default)]
pub struct Workflow {
    nodes: Vec<Node>,
    start: Option<NodeId>,
}

impl Workflow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node. The first node added is the start node unless
    /// [`Workflow::start_at`] says otherwise.
    pub fn add_step(&mut self, name: impl Into<String>, step: impl Step + 'static) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            name: name.into(),
            step: Box::new(step),
            on_success: None,
            on_failure: None,
        });
        if self.start.is_none() {
            self.start = Some(id);
        }
        id
    }

    pub fn start_at(&mut self, node: NodeId) {
        self.start = Some(node);
    }

    pub fn on_success(&mut self, from: NodeId, to: NodeId) {
        self.nodes[from.0].on_success = Some(to);
    }

    pub fn on_failure(&mut self, from: NodeId, to: NodeId) {
        self.nodes[from.0].on_failure = Some(to);
    }

    pub fn on_success_or_failure(&mut self, from: NodeId, to: NodeId) {
        self.on_success(from, to);
        self.on_failure(from, to);
    }

    /// Run to completion and return every error the steps produced.
    ///
    /// Cancellation is checked after each step. Once the token fires, one
    /// "operation cancelled" error is recorded and only failure edges are
    /// followed from then on.
    pub async fn run(&self, session: &mut Session, cancel: &CancellationToken) -> Errors {
        let mut errors = Errors::new();
        let mut cancelled = false;
        let mut current = self.start;

        while let Some(id) = current {
            let node = &self.nodes[id.0];
            debug!("Running step '{}'", node.name);

            let failed = match node.step.run(session).await {
                Ok(()) => false,
                Err(step_errors) => {
                    debug!("Step '{}' failed with {} errors", node.name, step_errors.len());
                    errors.extend(step_errors);
                    true
                }
            };

            if !cancelled && cancel.is_cancelled() {
                warn!("Cancelled during step '{}'", node.name);
                errors.push(Error::generic(CANCELLED_MESSAGE));
                cancelled = true;
            }

            current = if failed || cancelled {
                node.on_failure
            } else {
                node.on_success
            };
        }

        errors
    }
}
