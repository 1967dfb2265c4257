//! Build definition lookup.
//!
//! A definition is a Lua script named after the PHP version it builds. The
//! builtin ones live in the share tree's `definitions/` directory, but any
//! existing file can be passed instead of a name.

pub mod version;

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

/// Errors that can occur while looking up definitions.
#[derive(Debug, Error)]
pub enum DefinitionError {
  /// Neither a file at that path nor a builtin definition by that name.
  #[error("definition not found: {0}")]
  NotFound(String),

  /// The definitions directory could not be read.
  #[error("failed to read definitions from '{path}': {source}")]
  ReadDir {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// Lookup of builtin definitions.
#[derive(Debug, Clone)]
pub struct Registry {
  dir: PathBuf,
}

impl Registry {
  pub fn new(dir: impl Into<PathBuf>) -> Self {
    Self { dir: dir.into() }
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  /// Resolve a definition name or path to a file.
  ///
  /// An existing file path always wins, even when a builtin definition has
  /// the same name, and is returned as given.
  pub fn resolve(&self, name: &str) -> Result<PathBuf, DefinitionError> {
    let candidate = Path::new(name);
    if candidate.is_file() {
      debug!(path = %candidate.display(), "using definition file");
      return Ok(candidate.to_path_buf());
    }

    let builtin = self.dir.join(name);
    if !name.is_empty() && builtin.is_file() {
      debug!(path = %builtin.display(), "using builtin definition");
      return Ok(builtin);
    }

    Err(DefinitionError::NotFound(name.to_string()))
  }

  /// All builtin definition names, in version order.
  ///
  /// A missing directory lists nothing. Hidden files are skipped.
  pub fn list(&self) -> Result<Vec<String>, DefinitionError> {
    if !self.dir.is_dir() {
      return Ok(Vec::new());
    }

    let read_err = |source| DefinitionError::ReadDir {
      path: self.dir.clone(),
      source,
    };

    let mut names = Vec::new();
    for entry in fs::read_dir(&self.dir).map_err(read_err)? {
      let entry = entry.map_err(read_err)?;
      if !entry.path().is_file() {
        continue;
      }
      let name = entry.file_name().to_string_lossy().to_string();
      if !name.starts_with('.') {
        names.push(name);
      }
    }

    version::sort(&mut names);
    Ok(names)
  }
}

/// Name a resolved definition file is known by (source dir, log file).
pub fn definition_name(path: &Path) -> String {
  path
    .file_name()
    .map(|n| n.to_string_lossy().to_string())
    .unwrap_or_else(|| path.to_string_lossy().to_string())
}
