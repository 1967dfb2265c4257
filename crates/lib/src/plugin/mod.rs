//! Typed plugin registry.
//!
//! Plugins are Lua files under `plugins.d/`. Loading one runs it once; it
//! extends the build API by calling `build.register_command` for plain
//! helpers or `build.register_plugin{...}` for lifecycle callbacks from a
//! fixed capability set:
//!
//! ```lua
//! build.register_plugin {
//!   name = "extension",
//!   install_extension = function(name, version) ... end,
//!   install_extension_source = function(name, revision) ... end,
//!   before_install = function(prefix, source) ... end,
//!   after_install = function(prefix, source) ... end,
//! }
//! ```
//!
//! Plugins are keyed by name; registering the same name again replaces the
//! earlier plugin.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use mlua::prelude::*;
use thiserror::Error;
use tracing::{debug, info};

use crate::extension::{ExtensionError, ExtensionInstaller};
use crate::lua::runtime::load_file;

/// Name of the plugin that replaces the builtin extension installer.
pub const EXTENSION_PLUGIN: &str = "extension";

/// Errors that can occur while loading plugins.
#[derive(Debug, Error)]
pub enum PluginError {
  #[error("failed to read plugin directory '{path}': {source}")]
  ReadDir {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to load plugin '{path}': {source}")]
  Load {
    path: PathBuf,
    #[source]
    source: LuaError,
  },
}

/// Lifecycle points a plugin may hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Capability {
  InstallExtension,
  InstallExtensionSource,
  BeforeInstall,
  AfterInstall,
}

impl Capability {
  pub const ALL: [Capability; 4] = [
    Capability::InstallExtension,
    Capability::InstallExtensionSource,
    Capability::BeforeInstall,
    Capability::AfterInstall,
  ];

  /// Key used in the `register_plugin` table.
  pub fn key(&self) -> &'static str {
    match self {
      Self::InstallExtension => "install_extension",
      Self::InstallExtensionSource => "install_extension_source",
      Self::BeforeInstall => "before_install",
      Self::AfterInstall => "after_install",
    }
  }

  pub fn from_key(key: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|c| c.key() == key)
  }
}

impl fmt::Display for Capability {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.key())
  }
}

/// A registered plugin and the callbacks it provides.
#[derive(Debug, Clone)]
pub struct Plugin {
  name: String,
  callbacks: BTreeMap<Capability, LuaFunction>,
}

impl FromLua for Plugin {
  fn from_lua(value: LuaValue, _lua: &Lua) -> LuaResult<Self> {
    let table = match value {
      LuaValue::Table(t) => t,
      _ => {
        return Err(LuaError::FromLuaConversionError {
          from: value.type_name(),
          to: "Plugin".to_string(),
          message: Some("expected table".to_string()),
        });
      }
    };

    let name: String = table
      .get("name")
      .map_err(|_| LuaError::external("plugin requires a `name` string"))?;

    let mut callbacks = BTreeMap::new();
    for pair in table.pairs::<String, LuaValue>() {
      let (key, value) = pair?;
      if key == "name" {
        continue;
      }
      let capability = Capability::from_key(&key)
        .ok_or_else(|| LuaError::external(format!("plugin '{}': unknown capability '{}'", name, key)))?;
      let LuaValue::Function(func) = value else {
        return Err(LuaError::external(format!(
          "plugin '{}': capability '{}' must be a function",
          name, key
        )));
      };
      callbacks.insert(capability, func);
    }

    Ok(Plugin { name, callbacks })
  }
}

impl Plugin {
  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn provides(&self, capability: Capability) -> bool {
    self.callbacks.contains_key(&capability)
  }

  pub fn capabilities(&self) -> impl Iterator<Item = Capability> + '_ {
    self.callbacks.keys().copied()
  }

  /// Invoke a capability. Returns `false` if the plugin does not provide it.
  pub async fn call(&self, capability: Capability, args: impl IntoLuaMulti) -> LuaResult<bool> {
    match self.callbacks.get(&capability) {
      Some(func) => {
        debug!(plugin = %self.name, %capability, "calling plugin");
        func.call_async::<()>(args).await?;
        Ok(true)
      }
      None => Ok(false),
    }
  }
}

/// All plugins registered during this run, keyed by name.
#[derive(Debug, Default)]
pub struct PluginRegistry {
  plugins: BTreeMap<String, Plugin>,
}

impl PluginRegistry {
  /// Register `plugin`, returning the plugin it replaced.
  pub fn register(&mut self, plugin: Plugin) -> Option<Plugin> {
    info!(plugin = %plugin.name, "registered plugin");
    self.plugins.insert(plugin.name.clone(), plugin)
  }

  pub fn get(&self, name: &str) -> Option<&Plugin> {
    self.plugins.get(name)
  }

  pub fn len(&self) -> usize {
    self.plugins.len()
  }

  pub fn is_empty(&self) -> bool {
    self.plugins.is_empty()
  }

  /// Plugins providing `capability`, in name order.
  pub fn with_capability(&self, capability: Capability) -> Vec<Plugin> {
    self
      .plugins
      .values()
      .filter(|p| p.provides(capability))
      .cloned()
      .collect()
  }
}

/// What `load_all` found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginDirStatus {
  /// The directory does not exist; nothing was loaded.
  Missing,
  /// Files loaded, in load order.
  Loaded(Vec<PathBuf>),
}

/// Run every `.lua` file in `dir`, in directory enumeration order.
pub async fn load_all(lua: &Lua, dir: &Path) -> Result<PluginDirStatus, PluginError> {
  if !dir.is_dir() {
    debug!(dir = %dir.display(), "no plugin directory");
    return Ok(PluginDirStatus::Missing);
  }

  let read_err = |source| PluginError::ReadDir {
    path: dir.to_path_buf(),
    source,
  };

  let mut files = Vec::new();
  for entry in std::fs::read_dir(dir).map_err(read_err)? {
    let path = entry.map_err(read_err)?.path();
    if path.is_file() && path.extension().is_some_and(|ext| ext == "lua") {
      files.push(path);
    }
  }

  for path in &files {
    info!(plugin = %path.display(), "loading plugin");
    load_file(lua, path).await.map_err(|source| PluginError::Load {
      path: path.clone(),
      source,
    })?;
  }

  Ok(PluginDirStatus::Loaded(files))
}

/// Extension installs delegated to the `extension` plugin.
pub struct PluginExtensionInstaller {
  plugin: Plugin,
}

impl PluginExtensionInstaller {
  /// Use `plugin` if it provides either extension capability.
  pub fn new(plugin: Plugin) -> Option<Self> {
    let usable = plugin.provides(Capability::InstallExtension) || plugin.provides(Capability::InstallExtensionSource);
    usable.then_some(Self { plugin })
  }

  async fn delegate(&self, capability: Capability, name: &str, spec: &str) -> Result<(), ExtensionError> {
    let called = self
      .plugin
      .call(capability, (name.to_string(), spec.to_string()))
      .await
      .map_err(|e| ExtensionError::Plugin(e.to_string()))?;
    if !called {
      return Err(ExtensionError::Plugin(format!(
        "plugin '{}' does not provide {}",
        self.plugin.name, capability
      )));
    }
    Ok(())
  }
}

impl ExtensionInstaller for PluginExtensionInstaller {
  async fn install_extension(&self, name: &str, version: &str) -> Result<(), ExtensionError> {
    self.delegate(Capability::InstallExtension, name, version).await
  }

  async fn install_extension_source(&self, name: &str, revision: &str) -> Result<(), ExtensionError> {
    self.delegate(Capability::InstallExtensionSource, name, revision).await
  }
}
