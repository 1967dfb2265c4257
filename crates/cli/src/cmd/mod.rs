mod build;
mod definitions;

pub use build::cmd_build;
pub use definitions::cmd_definitions;
