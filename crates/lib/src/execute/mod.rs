//! Running external build tools.
//!
//! Every tool the pipeline drives (configure, make, patch, hooks, phpize)
//! goes through a [`CommandRunner`], which redirects the tool's output into
//! the run's [`BuildLog`] so the user-facing stream stays quiet.

pub mod cmd;
pub mod log;

pub use cmd::{Cmd, CommandError, CommandRunner};
pub use log::BuildLog;
