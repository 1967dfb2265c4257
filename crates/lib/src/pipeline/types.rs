//! Pipeline types: stages, requests, reports, and the error taxonomy.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use super::patch::PatchOutcome;
use crate::archive::ArchiveError;
use crate::consts::DEFINITION_NOT_FOUND_EXIT;
use crate::download::{DownloadArtifact, DownloadError};
use crate::execute::CommandError;
use crate::extension::ExtensionOutcome;
use crate::plugin::{PluginDirStatus, PluginError};

/// Pipeline states, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
  Init,
  Resolve,
  Download,
  Configure,
  BeforeInstallHook,
  ApplyPatches,
  Compile,
  Install,
  CleanObjects,
  WriteIni,
  CommentExtensionDir,
  AfterInstallHook,
  InstallExtensions,
  Done,
}

impl Stage {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Init => "init",
      Self::Resolve => "resolve",
      Self::Download => "download",
      Self::Configure => "configure",
      Self::BeforeInstallHook => "before-install",
      Self::ApplyPatches => "patch",
      Self::Compile => "compile",
      Self::Install => "install",
      Self::CleanObjects => "clean",
      Self::WriteIni => "ini",
      Self::CommentExtensionDir => "extension-dir",
      Self::AfterInstallHook => "after-install",
      Self::InstallExtensions => "extensions",
      Self::Done => "done",
    }
  }
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// OS signals that cancel a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
  Interrupt,
  Terminate,
}

impl Signal {
  /// Conventional `128 + signo` exit status.
  pub fn exit_code(&self) -> i32 {
    match self {
      Self::Interrupt => 130,
      Self::Terminate => 143,
    }
  }
}

impl fmt::Display for Signal {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Interrupt => f.write_str("SIGINT"),
      Self::Terminate => f.write_str("SIGTERM"),
    }
  }
}

/// What to build and where.
#[derive(Debug, Clone)]
pub struct BuildRequest {
  /// Definition name or path to a definition file.
  pub definition: String,
  /// Absolute install prefix.
  pub prefix: PathBuf,
  /// php.ini variant (`development`, `production`) or a file path.
  pub ini: Option<String>,
}

/// Errors that abort a build.
#[derive(Debug, Error)]
pub enum BuildError {
  #[error("definition not found: {0}")]
  DefinitionNotFound(String),

  #[error("definition '{0}' did not call build.install_package")]
  NoPackage(String),

  #[error("error in '{path}': {message}")]
  Script { path: PathBuf, message: String },

  #[error(transparent)]
  Plugin(#[from] PluginError),

  #[error("download failed: {0}")]
  Download(#[source] DownloadError),

  #[error("extraction failed: {0}")]
  Extraction(#[source] ArchiveError),

  #[error("configure failed: {0}")]
  Configure(#[source] CommandError),

  #[error("compile failed: {0}")]
  Compile(#[source] CommandError),

  #[error("install failed: {0}")]
  Install(#[source] CommandError),

  #[error("cleaning object files failed: {0}")]
  Clean(#[source] CommandError),

  /// A trigger executable in `before-install.d` / `after-install.d` failed.
  #[error("hook '{hook}' failed: {source}")]
  Hook {
    hook: String,
    #[source]
    source: CommandError,
  },

  /// A plugin's `before_install` / `after_install` callback raised.
  #[error("plugin '{plugin}' failed in {stage}: {message}")]
  PluginHook {
    plugin: String,
    stage: Stage,
    message: String,
  },

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("interrupted by {0}")]
  Interrupted(Signal),
}

impl BuildError {
  /// Process exit status for this failure.
  pub fn exit_code(&self) -> i32 {
    match self {
      Self::DefinitionNotFound(_) => DEFINITION_NOT_FOUND_EXIT,
      Self::Configure(e) | Self::Compile(e) | Self::Install(e) | Self::Clean(e) => e.status(),
      Self::Hook { source, .. } => source.status(),
      Self::Interrupted(signal) => signal.exit_code(),
      _ => 1,
    }
  }
}

impl From<DownloadError> for BuildError {
  fn from(e: DownloadError) -> Self {
    match e {
      DownloadError::Extract(e) => Self::Extraction(e),
      other => Self::Download(other),
    }
  }
}

/// What the failure cleanup did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupOutcome {
  /// No configured source tree to clean.
  Skipped,
  Cleaned,
  Failed(String),
}

/// A failed build, with everything needed to report it.
#[derive(Debug)]
pub struct BuildFailure {
  pub error: BuildError,
  /// Stage that was running when the failure happened.
  pub stage: Stage,
  pub log_path: Option<PathBuf>,
  pub log_tail: Vec<String>,
  pub cleanup: CleanupOutcome,
}

impl BuildFailure {
  pub fn exit_code(&self) -> i32 {
    self.error.exit_code()
  }
}

impl fmt::Display for BuildFailure {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} (during {})", self.error, self.stage)
  }
}

impl std::error::Error for BuildFailure {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    Some(&self.error)
  }
}

/// A successful build.
#[derive(Debug)]
pub struct BuildReport {
  pub definition: String,
  pub definition_path: PathBuf,
  pub prefix: PathBuf,
  pub log_path: PathBuf,
  pub download: DownloadArtifact,
  pub plugins: PluginDirStatus,
  pub triggers: Vec<PathBuf>,
  pub patches: Vec<PatchOutcome>,
  /// Installed php.ini, if a template was found.
  pub ini: Option<PathBuf>,
  pub extensions: Vec<ExtensionOutcome>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn exit_codes_follow_taxonomy() {
    assert_eq!(BuildError::DefinitionNotFound("x".into()).exit_code(), 127);
    assert_eq!(
      BuildError::Compile(CommandError::Failed {
        cmd: "make".into(),
        code: Some(2)
      })
      .exit_code(),
      2
    );
    assert_eq!(BuildError::Interrupted(Signal::Interrupt).exit_code(), 130);
    assert_eq!(BuildError::Interrupted(Signal::Terminate).exit_code(), 143);
    assert_eq!(BuildError::NoPackage("8.3.2".into()).exit_code(), 1);
  }

  #[test]
  fn extraction_errors_are_distinguished() {
    let err: BuildError = DownloadError::Extract(ArchiveError::Unsupported(PathBuf::from("x.zip"))).into();
    assert!(matches!(err, BuildError::Extraction(_)));
    let err: BuildError = DownloadError::NoUrls.into();
    assert!(matches!(err, BuildError::Download(_)));
  }

  #[test]
  fn stages_are_ordered() {
    assert!(Stage::Configure < Stage::BeforeInstallHook);
    assert!(Stage::BeforeInstallHook < Stage::ApplyPatches);
    assert!(Stage::AfterInstallHook < Stage::InstallExtensions);
  }
}
