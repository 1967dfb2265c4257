use std::path::Path;

use mlua::prelude::*;

use super::{ScriptContext, globals};

/// Create a Lua runtime with the `build` table registered.
pub fn create_runtime(ctx: ScriptContext) -> LuaResult<Lua> {
  let lua = Lua::new();
  globals::register_globals(&lua, ctx)?;
  Ok(lua)
}

/// Run the Lua file at `path`.
///
/// Runs as a coroutine so scripts may call async functions such as
/// `build.run`. Chunk names carry the path so errors point at the script.
pub async fn load_file(lua: &Lua, path: &Path) -> LuaResult<()> {
  let content = tokio::fs::read_to_string(path)
    .await
    .map_err(|e| LuaError::external(format!("cannot read '{}': {}", path.display(), e)))?;

  lua
    .load(&content)
    .set_name(format!("@{}", path.display()))
    .exec_async()
    .await
}

#[cfg(test)]
mod tests {
  use std::fs;

  use super::*;
  use tempfile::TempDir;

  #[tokio::test]
  async fn load_file_reports_script_path_in_errors() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("8.3.2");
    fs::write(&path, "error('definition exploded')").unwrap();

    let lua = Lua::new();
    let err = load_file(&lua, &path).await.unwrap_err();
    let message = err.to_string();
    assert!(message.contains("definition exploded"), "{}", message);
    assert!(message.contains("8.3.2"), "{}", message);
  }

  #[tokio::test]
  async fn load_file_missing_is_an_error() {
    let lua = Lua::new();
    assert!(load_file(&lua, Path::new("/nonexistent/8.3.2")).await.is_err());
  }
}
