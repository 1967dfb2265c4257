//! The mutable build configuration.
//!
//! A [`BuildConfig`] is created once per run from the base flags, the share
//! tree's `default_configure_options` file and the environment. Definitions
//! and plugins then edit it through the Lua `build` table, and the configure
//! step consumes it.
//!
//! Flag order is part of the contract: definitions rely on later flags on the
//! configure command line overriding earlier ones. Nothing here reorders or
//! deduplicates flags; the only edits are appends and prefix-based removal.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::archive::ArchiveKind;
use crate::extension::ExtensionRequest;
use crate::settings::Settings;

/// A single configure flag, `name` or `name=value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flag {
  pub name: String,
  pub value: Option<String>,
}

impl Flag {
  pub fn new(name: impl Into<String>, value: Option<String>) -> Self {
    Self {
      name: name.into(),
      value,
    }
  }

  /// Parse `name=value` (split at the first `=`) or a bare `name`.
  pub fn parse(token: &str) -> Self {
    match token.split_once('=') {
      Some((name, value)) => Self::new(name, Some(value.to_string())),
      None => Self::new(token, None),
    }
  }
}

impl fmt::Display for Flag {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.value {
      Some(value) => write!(f, "{}={}", self.name, value),
      None => write!(f, "{}", self.name),
    }
  }
}

/// The source tarball a definition installs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
  /// Candidate URLs, tried in order.
  pub urls: Vec<String>,
  /// Explicit archive kind; inferred from the filename when `None`.
  pub kind: Option<ArchiveKind>,
}

/// Everything the pipeline needs to know about one build.
#[derive(Debug, Clone)]
pub struct BuildConfig {
  prefix: PathBuf,
  patches_dir: PathBuf,
  flags: Vec<Flag>,
  patches: Vec<PathBuf>,
  package: Option<Package>,
  ini: Option<String>,
  zts: bool,
  make_args: Vec<String>,
  extensions: Vec<ExtensionRequest>,
  apxs2: Option<PathBuf>,
}

impl BuildConfig {
  /// An empty configuration for `prefix`.
  pub fn new(prefix: impl Into<PathBuf>, patches_dir: impl Into<PathBuf>) -> Self {
    Self {
      prefix: prefix.into(),
      patches_dir: patches_dir.into(),
      flags: Vec::new(),
      patches: Vec::new(),
      package: None,
      ini: None,
      zts: false,
      make_args: Vec::new(),
      extensions: Vec::new(),
      apxs2: None,
    }
  }

  /// The starting configuration for a run.
  ///
  /// Base flags point PHP at the prefix's `etc/` and `libexec/`, followed by
  /// the default configure options file (missing file means no defaults).
  pub fn with_defaults(prefix: &Path, settings: &Settings) -> io::Result<Self> {
    let mut config = Self::new(prefix, settings.patches_dir());

    let etc = prefix.join("etc");
    config.add_flag("--prefix", Some(prefix.display().to_string()));
    config.add_flag("--with-config-file-path", Some(etc.display().to_string()));
    config.add_flag(
      "--with-config-file-scan-dir",
      Some(etc.join("conf.d").display().to_string()),
    );
    config.add_flag("--libexecdir", Some(prefix.join("libexec").display().to_string()));

    let defaults = settings.default_configure_options();
    match fs::read_to_string(&defaults) {
      Ok(content) => {
        for flag in parse_options(&content) {
          config.flags.push(flag);
        }
      }
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        debug!(path = %defaults.display(), "no default configure options")
      }
      Err(e) => return Err(e),
    }

    config.zts = settings.zts;
    config.make_args = settings.make_args.clone();
    Ok(config)
  }

  pub fn prefix(&self) -> &Path {
    &self.prefix
  }

  pub fn flags(&self) -> &[Flag] {
    &self.flags
  }

  /// Append `name` or `name=value`.
  pub fn add_flag(&mut self, name: impl Into<String>, value: Option<String>) {
    self.flags.push(Flag::new(name, value));
  }

  /// Remove every flag whose name starts with `prefix`.
  ///
  /// Returns how many flags were removed.
  pub fn remove_flag(&mut self, prefix: &str) -> usize {
    let before = self.flags.len();
    self.flags.retain(|flag| !flag.name.starts_with(prefix));
    before - self.flags.len()
  }

  /// `remove_flag(prefix)` followed by `add_flag(name, value)`.
  pub fn replace_flag(&mut self, prefix: &str, name: impl Into<String>, value: Option<String>) {
    self.remove_flag(prefix);
    self.add_flag(name, value);
  }

  pub fn has_flag(&self, prefix: &str) -> bool {
    self.flags.iter().any(|flag| flag.name.starts_with(prefix))
  }

  /// The full configure argument list: flags in order, then `extra`.
  pub fn configure_args(&self, extra: &[String]) -> Vec<String> {
    self
      .flags
      .iter()
      .map(Flag::to_string)
      .chain(extra.iter().cloned())
      .collect()
  }

  pub fn patches(&self) -> &[PathBuf] {
    &self.patches
  }

  /// Register a patch. Names are looked up in the builtin patches directory
  /// unless they point at an existing file.
  pub fn add_patch(&mut self, path: &str) -> PathBuf {
    let candidate = Path::new(path);
    let resolved = if candidate.is_file() {
      candidate.to_path_buf()
    } else {
      self.patches_dir.join(path)
    };
    self.patches.push(resolved.clone());
    resolved
  }

  pub fn package(&self) -> Option<&Package> {
    self.package.as_ref()
  }

  pub fn set_package(&mut self, package: Package) {
    self.package = Some(package);
  }

  pub fn ini(&self) -> Option<&str> {
    self.ini.as_deref()
  }

  pub fn set_ini(&mut self, variant: impl Into<String>) {
    self.ini = Some(variant.into());
  }

  pub fn zts(&self) -> bool {
    self.zts
  }

  pub fn make_args(&self) -> &[String] {
    &self.make_args
  }

  pub fn extensions(&self) -> &[ExtensionRequest] {
    &self.extensions
  }

  pub fn add_extension(&mut self, request: ExtensionRequest) {
    self.extensions.push(request);
  }

  pub fn apxs2(&self) -> Option<&Path> {
    self.apxs2.as_deref()
  }

  pub fn set_apxs2(&mut self, path: impl Into<PathBuf>) {
    self.apxs2 = Some(path.into());
  }
}

/// Parse a configure options file: whitespace separated flags, `#` comments.
pub fn parse_options(content: &str) -> Vec<Flag> {
  content
    .lines()
    .map(|line| line.split('#').next().unwrap_or(""))
    .flat_map(str::split_whitespace)
    .map(Flag::parse)
    .collect()
}
