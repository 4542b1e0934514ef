//! Utility modules shared across the orchestrator.

pub mod errors;

pub use errors::{Error, ErrorKind, Errors};
