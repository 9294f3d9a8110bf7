//! Infrastructure adapters for configuration, persistence, git, and logging.

pub mod config;
pub mod git;
pub mod logging;
pub mod persistence;
