//! Utility modules for the bbr command.

pub mod logger;
