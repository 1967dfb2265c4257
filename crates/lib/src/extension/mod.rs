//! Installing PHP extensions into a built prefix.
//!
//! Extensions are requested either by a definition (`build.install_extension`)
//! or after the fact through `PHP_BUILD_INSTALL_EXTENSION`, a space separated
//! list of `name=version` pairs where a version starting with `@` names a
//! source revision instead of a release.
//!
//! The work itself sits behind [`ExtensionInstaller`]: the builtin
//! [`PeclInstaller`], or a Lua plugin registered under the name `extension`.
//! Each request succeeds or fails on its own; one broken extension never stops
//! the others.

pub mod catalog;
pub mod pecl;

use std::fmt;

use thiserror::Error;
use tracing::{info, warn};

use crate::consts::REVISION_MARKER;
use crate::download::DownloadError;
use crate::execute::CommandError;

pub use catalog::{Catalog, CatalogEntry};
pub use pecl::PeclInstaller;

/// Errors that can occur while installing one extension.
#[derive(Debug, Error)]
pub enum ExtensionError {
  /// A source install was requested for an extension without a known repository.
  #[error("no source repository known for extension '{0}'")]
  UnknownSource(String),

  #[error("failed to fetch extension sources: {0}")]
  Download(#[from] DownloadError),

  #[error(transparent)]
  Command(#[from] CommandError),

  /// The `extension` plugin raised an error.
  #[error("extension plugin failed: {0}")]
  Plugin(String),

  #[error("failed to read extension catalog '{path}': {message}")]
  Catalog { path: String, message: String },

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

/// What to install for one extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionSource {
  /// A released version, e.g. `2.9.0`.
  Release(String),
  /// A source control revision, e.g. `abcdef`.
  Revision(String),
}

/// A single extension to install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionRequest {
  pub name: String,
  pub source: ExtensionSource,
}

impl ExtensionRequest {
  pub fn release(name: impl Into<String>, version: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      source: ExtensionSource::Release(version.into()),
    }
  }

  pub fn revision(name: impl Into<String>, revision: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      source: ExtensionSource::Revision(revision.into()),
    }
  }

  /// Parse one `name=version` or `name=@revision` token.
  pub fn parse(token: &str) -> Option<Self> {
    let (name, version) = token.split_once('=')?;
    let name = name.trim();
    let version = version.trim();
    if name.is_empty() || version.is_empty() {
      return None;
    }

    match version.strip_prefix(REVISION_MARKER) {
      Some("") => None,
      Some(revision) => Some(Self::revision(name, revision)),
      None => Some(Self::release(name, version)),
    }
  }
}

impl fmt::Display for ExtensionRequest {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.source {
      ExtensionSource::Release(version) => write!(f, "{}={}", self.name, version),
      ExtensionSource::Revision(revision) => write!(f, "{}={}{}", self.name, REVISION_MARKER, revision),
    }
  }
}

/// Parse a `PHP_BUILD_INSTALL_EXTENSION` style list.
///
/// Malformed entries are skipped with a warning.
pub fn parse_spec(spec: &str) -> Vec<ExtensionRequest> {
  spec
    .split_whitespace()
    .filter_map(|token| {
      let parsed = ExtensionRequest::parse(token);
      if parsed.is_none() {
        warn!(entry = token, "skipping malformed extension entry");
      }
      parsed
    })
    .collect()
}

/// Something that can install extensions into the current prefix.
#[allow(async_fn_in_trait)]
pub trait ExtensionInstaller {
  async fn install_extension(&self, name: &str, version: &str) -> Result<(), ExtensionError>;

  async fn install_extension_source(&self, name: &str, revision: &str) -> Result<(), ExtensionError>;
}

/// Result of one extension request.
#[derive(Debug)]
pub enum ExtensionOutcome {
  Installed(ExtensionRequest),
  Failed {
    request: ExtensionRequest,
    error: ExtensionError,
  },
}

impl ExtensionOutcome {
  pub fn is_installed(&self) -> bool {
    matches!(self, Self::Installed(_))
  }
}

/// Install every request in order, collecting per-request outcomes.
pub async fn install_all<I: ExtensionInstaller>(installer: &I, requests: &[ExtensionRequest]) -> Vec<ExtensionOutcome> {
  let mut outcomes = Vec::with_capacity(requests.len());

  for request in requests {
    info!(extension = %request, "installing extension");
    let result = match &request.source {
      ExtensionSource::Release(version) => installer.install_extension(&request.name, version).await,
      ExtensionSource::Revision(revision) => installer.install_extension_source(&request.name, revision).await,
    };

    match result {
      Ok(()) => outcomes.push(ExtensionOutcome::Installed(request.clone())),
      Err(error) => {
        warn!(extension = %request, error = %error, "extension install failed");
        outcomes.push(ExtensionOutcome::Failed {
          request: request.clone(),
          error,
        });
      }
    }
  }

  outcomes
}

#[cfg(test)]
mod tests {
  use std::cell::RefCell;

  use super::*;

  #[test]
  fn parses_release_and_revision() {
    assert_eq!(
      parse_spec("xdebug=2.9.0 redis=@abcdef"),
      vec![
        ExtensionRequest::release("xdebug", "2.9.0"),
        ExtensionRequest::revision("redis", "abcdef"),
      ]
    );
  }

  #[tracing_test::traced_test]
  #[test]
  fn malformed_entries_are_skipped() {
    assert_eq!(
      parse_spec("xdebug apcu= =1.0 redis=@ imagick=3.7.0"),
      vec![ExtensionRequest::release("imagick", "3.7.0")]
    );
    assert!(logs_contain("skipping malformed extension entry"));
  }

  #[test]
  fn empty_spec_is_empty() {
    assert!(parse_spec("   ").is_empty());
  }

  #[test]
  fn display_round_trips_marker() {
    assert_eq!(ExtensionRequest::revision("redis", "abcdef").to_string(), "redis=@abcdef");
  }

  /// Records calls; extensions named "broken" fail.
  #[derive(Default)]
  struct Recorder {
    calls: RefCell<Vec<String>>,
  }

  impl ExtensionInstaller for Recorder {
    async fn install_extension(&self, name: &str, version: &str) -> Result<(), ExtensionError> {
      self.calls.borrow_mut().push(format!("release {} {}", name, version));
      if name == "broken" {
        return Err(ExtensionError::Plugin("boom".to_string()));
      }
      Ok(())
    }

    async fn install_extension_source(&self, name: &str, revision: &str) -> Result<(), ExtensionError> {
      self.calls.borrow_mut().push(format!("source {} {}", name, revision));
      Ok(())
    }
  }

  #[tokio::test]
  async fn dispatches_by_source_kind() {
    let recorder = Recorder::default();
    let outcomes = install_all(&recorder, &parse_spec("xdebug=2.9.0 redis=@abcdef")).await;

    assert!(outcomes.iter().all(ExtensionOutcome::is_installed));
    assert_eq!(*recorder.calls.borrow(), vec!["release xdebug 2.9.0", "source redis abcdef"]);
  }

  #[tokio::test]
  async fn failure_does_not_stop_remaining_extensions() {
    let recorder = Recorder::default();
    let outcomes = install_all(&recorder, &parse_spec("broken=1.0 apcu=5.1.23")).await;

    assert!(matches!(&outcomes[0], ExtensionOutcome::Failed { request, .. } if request.name == "broken"));
    assert!(outcomes[1].is_installed());
    assert_eq!(recorder.calls.borrow().len(), 2);
  }
}
