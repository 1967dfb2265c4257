//! Before/after install hooks: trigger executables, then plugin callbacks.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::types::{BuildError, Stage};
use crate::execute::{Cmd, CommandRunner};
use crate::plugin::{Capability, PluginRegistry};
use crate::settings::vars;

/// Environment handed to trigger executables.
#[derive(Debug, Clone)]
pub struct HookEnv<'a> {
  pub prefix: &'a Path,
  pub source_dir: &'a Path,
  pub root: &'a Path,
}

/// Executable files in `dir`, sorted by name. Missing directory: none.
pub fn triggers(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
  if !dir.is_dir() {
    return Ok(Vec::new());
  }

  let mut found = Vec::new();
  for entry in fs::read_dir(dir)? {
    let path = entry?.path();
    if path.is_file() && is_executable(&path) {
      found.push(path);
    }
  }
  found.sort();
  Ok(found)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
  use std::os::unix::fs::PermissionsExt;
  fs::metadata(path).is_ok_and(|m| m.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
  true
}

/// Run every trigger in `dir`. The first failing trigger aborts.
pub async fn run_triggers(runner: &CommandRunner, dir: &Path, env: &HookEnv<'_>) -> Result<Vec<PathBuf>, BuildError> {
  let found = triggers(dir)?;
  if found.is_empty() {
    debug!(dir = %dir.display(), "no triggers");
  }

  for trigger in &found {
    info!(trigger = %trigger.display(), "running trigger");
    let cmd = Cmd::new(trigger.display().to_string())
      .cwd(env.source_dir)
      .env("PREFIX", env.prefix.display().to_string())
      .env("SOURCE_PATH", env.source_dir.display().to_string())
      .env(vars::ROOT, env.root.display().to_string());
    runner.run(&cmd).await.map_err(|source| BuildError::Hook {
      hook: trigger.display().to_string(),
      source,
    })?;
  }

  Ok(found)
}

/// Call `capability` on every plugin providing it, as `fn(prefix, source_dir)`.
pub async fn run_plugins(
  plugins: &RefCell<PluginRegistry>,
  capability: Capability,
  stage: Stage,
  env: &HookEnv<'_>,
) -> Result<(), BuildError> {
  // Cloned so callbacks may register plugins themselves.
  let hooked = plugins.borrow().with_capability(capability);

  for plugin in hooked {
    let args = (env.prefix.display().to_string(), env.source_dir.display().to_string());
    plugin
      .call(capability, args)
      .await
      .map_err(|e| BuildError::PluginHook {
        plugin: plugin.name().to_string(),
        stage,
        message: e.to_string(),
      })?;
  }
  Ok(())
}
