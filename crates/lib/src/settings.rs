//! Environment-driven settings for a single php-build run.
//!
//! Every knob php-build honours comes from the environment and is read once,
//! when the run starts. Tests construct settings from an explicit lookup via
//! [`Settings::from_vars`] instead of touching the process environment.

use std::path::{Path, PathBuf};

use crate::consts::APP_NAME;

/// Environment variable names.
pub mod vars {
  pub const DEBUG: &str = "PHP_BUILD_DEBUG";
  pub const ROOT: &str = "PHP_BUILD_ROOT";
  pub const DEFINITION_PATH: &str = "PHP_BUILD_DEFINITION_PATH";
  pub const TMPDIR: &str = "PHP_BUILD_TMPDIR";
  pub const CONFIGURE_OPTS: &str = "PHP_BUILD_CONFIGURE_OPTS";
  pub const CONFIGURE_OPTS_COMPAT: &str = "CONFIGURE_OPTS";
  pub const EXTRA_MAKE_ARGUMENTS: &str = "PHP_BUILD_EXTRA_MAKE_ARGUMENTS";
  pub const ZTS_ENABLE: &str = "PHP_BUILD_ZTS_ENABLE";
  pub const KEEP_OBJECT_FILES: &str = "PHP_BUILD_KEEP_OBJECT_FILES";
  pub const INSTALL_EXTENSION: &str = "PHP_BUILD_INSTALL_EXTENSION";
  pub const MAKE: &str = "MAKE";
  pub const PATCH: &str = "PATCH";
  pub const GIT: &str = "GIT";
}

/// External programs the pipeline shells out to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tools {
  pub make: String,
  pub patch: String,
  pub git: String,
}

impl Default for Tools {
  fn default() -> Self {
    Self {
      make: "make".to_string(),
      patch: "patch".to_string(),
      git: "git".to_string(),
    }
  }
}

/// Settings for one run, resolved from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
  /// Builtin share tree (definitions, patches, plugins, hooks).
  pub root: PathBuf,
  /// Directory builtin definitions are looked up in.
  pub definition_path: PathBuf,
  /// Temp root holding `packages/`, `source/` and the build logs.
  pub tmp_dir: PathBuf,
  pub debug: bool,
  /// Extra configure flags, appended after everything else.
  pub configure_opts: Vec<String>,
  pub make_args: Vec<String>,
  pub zts: bool,
  pub keep_object_files: bool,
  /// Raw `name=version` list of extensions to install after the build.
  pub install_extension: Option<String>,
  pub tools: Tools,
}

impl Settings {
  /// Read settings from the process environment.
  pub fn from_env() -> Self {
    Self::from_vars(|key| std::env::var(key).ok())
  }

  /// Read settings through `var`. Empty values count as unset.
  pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
    let get = |key: &str| var(key).filter(|v| !v.trim().is_empty());

    let root = get(vars::ROOT).map(PathBuf::from).unwrap_or_else(default_root);
    let definition_path = get(vars::DEFINITION_PATH)
      .map(PathBuf::from)
      .unwrap_or_else(|| root.join("definitions"));
    let tmp_dir = get(vars::TMPDIR)
      .map(PathBuf::from)
      .unwrap_or_else(|| std::env::temp_dir().join(APP_NAME));

    let mut configure_opts = Vec::new();
    for key in [vars::CONFIGURE_OPTS, vars::CONFIGURE_OPTS_COMPAT] {
      if let Some(opts) = get(key) {
        configure_opts.extend(split_words(&opts));
      }
    }

    let defaults = Tools::default();
    let tools = Tools {
      make: get(vars::MAKE).unwrap_or(defaults.make),
      patch: get(vars::PATCH).unwrap_or(defaults.patch),
      git: get(vars::GIT).unwrap_or(defaults.git),
    };

    Self {
      root,
      definition_path,
      tmp_dir,
      debug: get(vars::DEBUG).is_some_and(|v| is_truthy(&v)),
      configure_opts,
      make_args: get(vars::EXTRA_MAKE_ARGUMENTS)
        .map(|v| split_words(&v))
        .unwrap_or_default(),
      zts: get(vars::ZTS_ENABLE).is_some_and(|v| is_truthy(&v)),
      keep_object_files: get(vars::KEEP_OBJECT_FILES).is_some_and(|v| is_truthy(&v)),
      install_extension: get(vars::INSTALL_EXTENSION),
      tools,
    }
  }

  pub fn patches_dir(&self) -> PathBuf {
    self.root.join("patches")
  }

  pub fn plugins_dir(&self) -> PathBuf {
    self.root.join("plugins.d")
  }

  pub fn before_install_dir(&self) -> PathBuf {
    self.root.join("before-install.d")
  }

  pub fn after_install_dir(&self) -> PathBuf {
    self.root.join("after-install.d")
  }

  pub fn default_configure_options(&self) -> PathBuf {
    self.root.join("default_configure_options")
  }

  pub fn extension_catalog(&self) -> PathBuf {
    self.root.join("extension").join("definitions.json")
  }

  /// Cache of downloaded tarballs, keyed by filename.
  pub fn packages_dir(&self) -> PathBuf {
    self.tmp_dir.join("packages")
  }

  /// Parent of the per-definition extracted source trees.
  pub fn source_root(&self) -> PathBuf {
    self.tmp_dir.join("source")
  }

  /// Parent of extension checkouts, kept apart from definition trees.
  pub fn extension_source_root(&self) -> PathBuf {
    self.tmp_dir.join("extensions")
  }
}

/// Returns true for the usual spellings of "enabled".
pub fn is_truthy(value: &str) -> bool {
  matches!(
    value.trim().to_ascii_lowercase().as_str(),
    "on" | "yes" | "true" | "1"
  )
}

fn split_words(value: &str) -> Vec<String> {
  value.split_whitespace().map(str::to_string).collect()
}

/// `<exe>/../share/php-build` for installed binaries, the checkout's share
/// tree otherwise.
fn default_root() -> PathBuf {
  let installed = std::env::current_exe().ok().and_then(|exe| {
    let bin_dir = exe.parent()?;
    let candidate = bin_dir.parent()?.join("share").join(APP_NAME);
    candidate.is_dir().then_some(candidate)
  });

  installed.unwrap_or_else(|| {
    Path::new(env!("CARGO_MANIFEST_DIR"))
      .join("..")
      .join("..")
      .join("share")
      .join(APP_NAME)
  })
}
