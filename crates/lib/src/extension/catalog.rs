//! The extension catalog (`extension/definitions.json`).

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use super::ExtensionError;

/// Release tarballs of extensions missing from the catalog come from PECL.
pub const PECL_DIST_URL: &str = "https://pecl.php.net/get/{name}-{version}.tgz";

/// Build instructions for one extension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CatalogEntry {
  /// Release URL template; `{name}` and `{version}` are substituted.
  pub dist_url: Option<String>,
  /// Git repository for revision installs.
  pub source_url: Option<String>,
  /// Extra arguments for the extension's configure script.
  pub configure_args: Vec<String>,
  /// Load with `zend_extension=` instead of `extension=`.
  pub zend_extension: bool,
  /// Subdirectory of the checkout holding `config.m4`.
  pub source_dir: Option<String>,
}

/// Known extensions, keyed by name.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Catalog {
  #[serde(flatten)]
  entries: BTreeMap<String, CatalogEntry>,
}

impl Catalog {
  /// Load the catalog. A missing file is an empty catalog.
  pub fn load(path: &Path) -> Result<Self, ExtensionError> {
    let content = match fs::read_to_string(path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        debug!(path = %path.display(), "no extension catalog");
        return Ok(Self::default());
      }
      Err(e) => return Err(e.into()),
    };

    serde_json::from_str(&content).map_err(|e| ExtensionError::Catalog {
      path: path.display().to_string(),
      message: e.to_string(),
    })
  }

  pub fn get(&self, name: &str) -> Option<&CatalogEntry> {
    self.entries.get(name)
  }

  /// Release tarball URL for `name` at `version`.
  pub fn dist_url(&self, name: &str, version: &str) -> String {
    let template = self
      .get(name)
      .and_then(|entry| entry.dist_url.as_deref())
      .unwrap_or(PECL_DIST_URL);
    template.replace("{name}", name).replace("{version}", version)
  }

  pub fn source_url(&self, name: &str) -> Option<&str> {
    self.get(name).and_then(|entry| entry.source_url.as_deref())
  }
}
