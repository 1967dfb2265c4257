//! The `build` global table.
//!
//! This module registers the `build` table that definitions and plugins use:
//! - `build.os`, `build.arch` - Host platform (e.g., "darwin", "x86_64")
//! - `build.definition`, `build.prefix`, `build.root` - Run information
//! - `build.add_flag()`, `build.remove_flag()`, `build.replace_flag()`, `build.flags()` - Configure flags
//! - `build.add_patch()` - Queue a patch
//! - `build.install_package()` - Select the source tarball
//! - `build.install_extension()`, `build.install_extension_source()` - Queue an extension
//! - `build.with_apxs2()` - Build the Apache 2 module
//! - `build.set_ini()` - Default php.ini variant
//! - `build.log()`, `build.run()` - Logging and running commands
//! - `build.register_command()`, `build.register_plugin{}` - Extend the API

use mlua::prelude::*;
use tracing::info;

use super::ScriptContext;
use crate::archive::ArchiveKind;
use crate::config::Package;
use crate::execute::Cmd;
use crate::extension::ExtensionRequest;
use crate::platform::Platform;
use crate::plugin::Plugin;

/// Names in the `build` table that `register_command` may not replace.
pub const BUILTIN_COMMANDS: &[&str] = &[
  "os",
  "arch",
  "definition",
  "prefix",
  "root",
  "add_flag",
  "remove_flag",
  "replace_flag",
  "flags",
  "add_patch",
  "install_package",
  "install_extension",
  "install_extension_source",
  "with_apxs2",
  "set_ini",
  "log",
  "run",
  "register_command",
  "register_plugin",
];

/// Register the `build` global table in the Lua runtime.
pub fn register_globals(lua: &Lua, ctx: ScriptContext) -> LuaResult<()> {
  let build = lua.create_table()?;

  let (os, arch) = match Platform::current() {
    Some(platform) => (platform.os.as_str(), platform.arch.as_str()),
    None => (std::env::consts::OS, std::env::consts::ARCH),
  };
  build.set("os", os)?;
  build.set("arch", arch)?;
  build.set("definition", ctx.definition.clone())?;
  build.set("prefix", ctx.config.borrow().prefix().display().to_string())?;
  build.set("root", ctx.root.display().to_string())?;

  register_flag_functions(lua, &build, &ctx)?;
  register_package_functions(lua, &build, &ctx)?;

  let config = ctx.config.clone();
  build.set(
    "set_ini",
    lua.create_function(move |_, variant: String| {
      config.borrow_mut().set_ini(variant);
      Ok(())
    })?,
  )?;

  let runner = ctx.runner.clone();
  let definition = ctx.definition.clone();
  build.set(
    "log",
    lua.create_function(move |_, message: String| {
      info!(definition = %definition, "{}", message);
      runner.log().write_line(&message).map_err(LuaError::external)
    })?,
  )?;

  let runner = ctx.runner.clone();
  build.set(
    "run",
    lua.create_async_function(move |_, (program, args): (String, Option<Vec<String>>)| {
      let runner = runner.clone();
      async move {
        let cmd = Cmd::new(program).args(args.unwrap_or_default());
        runner.run(&cmd).await.map_err(LuaError::external)
      }
    })?,
  )?;

  build.set(
    "register_command",
    lua.create_function(|lua, (name, func): (String, LuaFunction)| {
      if BUILTIN_COMMANDS.contains(&name.as_str()) {
        return Err(LuaError::external(format!(
          "cannot override built-in command '{}'",
          name
        )));
      }
      let build: LuaTable = lua.globals().get("build")?;
      build.set(name, func)
    })?,
  )?;

  let plugins = ctx.plugins.clone();
  build.set(
    "register_plugin",
    lua.create_function(move |_, plugin: Plugin| {
      plugins.borrow_mut().register(plugin);
      Ok(())
    })?,
  )?;

  lua.globals().set("build", build)?;
  Ok(())
}

fn register_flag_functions(lua: &Lua, build: &LuaTable, ctx: &ScriptContext) -> LuaResult<()> {
  let config = ctx.config.clone();
  build.set(
    "add_flag",
    lua.create_function(move |_, (name, value): (String, Option<String>)| {
      config.borrow_mut().add_flag(name, value);
      Ok(())
    })?,
  )?;

  let config = ctx.config.clone();
  build.set(
    "remove_flag",
    lua.create_function(move |_, prefix: String| Ok(config.borrow_mut().remove_flag(&prefix)))?,
  )?;

  let config = ctx.config.clone();
  build.set(
    "replace_flag",
    lua.create_function(move |_, (prefix, name, value): (String, String, Option<String>)| {
      config.borrow_mut().replace_flag(&prefix, name, value);
      Ok(())
    })?,
  )?;

  let config = ctx.config.clone();
  build.set(
    "flags",
    lua.create_function(move |_, ()| {
      Ok(config.borrow().flags().iter().map(ToString::to_string).collect::<Vec<_>>())
    })?,
  )?;

  let config = ctx.config.clone();
  build.set(
    "add_patch",
    lua.create_function(move |_, path: String| {
      let resolved = config.borrow_mut().add_patch(&path);
      Ok(resolved.display().to_string())
    })?,
  )?;

  Ok(())
}

fn register_package_functions(lua: &Lua, build: &LuaTable, ctx: &ScriptContext) -> LuaResult<()> {
  let config = ctx.config.clone();
  build.set(
    "install_package",
    lua.create_function(move |_, (urls, opts): (LuaValue, Option<LuaTable>)| {
      let package = parse_package(urls, opts)?;
      config.borrow_mut().set_package(package);
      Ok(())
    })?,
  )?;

  let config = ctx.config.clone();
  build.set(
    "install_extension",
    lua.create_function(move |_, (name, version): (String, String)| {
      config.borrow_mut().add_extension(ExtensionRequest::release(name, version));
      Ok(())
    })?,
  )?;

  let config = ctx.config.clone();
  build.set(
    "install_extension_source",
    lua.create_function(move |_, (name, revision): (String, String)| {
      config
        .borrow_mut()
        .add_extension(ExtensionRequest::revision(name, revision));
      Ok(())
    })?,
  )?;

  let config = ctx.config.clone();
  build.set(
    "with_apxs2",
    lua.create_function(move |_, path: Option<String>| {
      let path = match path {
        Some(path) => path,
        None => which::which("apxs2")
          .or_else(|_| which::which("apxs"))
          .map(|p| p.display().to_string())
          .map_err(|_| LuaError::external("with_apxs2: neither apxs2 nor apxs found on PATH"))?,
      };
      let mut config = config.borrow_mut();
      config.add_flag("--with-apxs2", Some(path.clone()));
      config.set_apxs2(path);
      Ok(())
    })?,
  )?;

  Ok(())
}

/// `install_package(url)`, `install_package({mirror, ...})`, optionally
/// followed by `{ kind = "bz2" }`.
fn parse_package(urls: LuaValue, opts: Option<LuaTable>) -> LuaResult<Package> {
  let urls: Vec<String> = match urls {
    LuaValue::String(s) => vec![s.to_string_lossy()],
    LuaValue::Table(t) => t.sequence_values::<String>().collect::<LuaResult<_>>()?,
    other => {
      return Err(LuaError::FromLuaConversionError {
        from: other.type_name(),
        to: "Package".to_string(),
        message: Some("expected a URL or a list of URLs".to_string()),
      });
    }
  };
  if urls.is_empty() {
    return Err(LuaError::external("install_package requires at least one URL"));
  }

  let kind = match opts {
    Some(opts) => opts.get::<Option<String>>("kind")?,
    None => None,
  };
  let kind = kind
    .map(|k| ArchiveKind::from_name(&k).ok_or_else(|| LuaError::external(format!("unsupported archive kind '{}'", k))))
    .transpose()?;

  Ok(Package { urls, kind })
}
