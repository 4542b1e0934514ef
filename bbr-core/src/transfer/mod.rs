//! Artifact streaming helpers: percentage progress logging around the
//! readers and writers that carry artifacts between hosts.

pub mod progress;
pub mod progress_io;

pub use progress::{format_bytes, PercentageLogger, DEFAULT_PROGRESS_INCREMENT};
pub use progress_io::{ProgressReader, ProgressWriter};
