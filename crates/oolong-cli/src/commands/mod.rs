//! Subcommand implementations. Each `execute` returns `Ok(false)` when the command
//! ran but found errors, so `main` can exit non-zero.

pub mod analyze;
pub mod build;
pub mod fmt;
