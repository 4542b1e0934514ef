//! bbr - command-line front end
//!
//! Connects to the instances of a configured deployment over SSH and drives
//! the backup, restore and cleanup workflows of `bbr-core`.

pub mod config;
pub mod inventory;
pub mod report;
pub mod signal;
pub mod ssh;
pub mod utils;

pub use config::Config;
