//! Lua runtime for definitions and plugins.
//!
//! Definitions and plugins are Lua scripts that edit the shared
//! [`BuildConfig`] through the global `build` table. Nothing they do touches
//! process-wide state: everything they can reach hangs off a
//! [`ScriptContext`].
//!
//! # Submodules
//!
//! - [`globals`] - The `build` table (`build.add_flag()`, `build.install_package()`, ...)
//! - [`runtime`] - Lua VM creation and script loading

pub mod globals;
pub mod runtime;

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use crate::config::BuildConfig;
use crate::execute::CommandRunner;
use crate::plugin::PluginRegistry;

/// State shared between the pipeline and the scripts it runs.
#[derive(Debug, Clone)]
pub struct ScriptContext {
  pub config: Rc<RefCell<BuildConfig>>,
  pub plugins: Rc<RefCell<PluginRegistry>>,
  pub runner: Rc<CommandRunner>,
  /// Name of the definition being built.
  pub definition: String,
  /// The share tree.
  pub root: PathBuf,
}
