//! Fetching and unpacking a definition's source package.
//!
//! Downloads are cached by filename under `packages/`, and the extracted tree
//! under `source/<definition>/` is reused across runs: if it already exists,
//! nothing is fetched at all.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::archive::{self, ArchiveError};
use crate::config::Package;
use crate::transport::{Transport, TransportError, remote_filename, url_to_filename};

/// Errors that can occur while downloading a package.
#[derive(Debug, Error)]
pub enum DownloadError {
  #[error("package has no URLs")]
  NoUrls,

  #[error("failed to download {url}: {source}")]
  Transport {
    url: String,
    #[source]
    source: TransportError,
  },

  #[error("failed to copy local package '{path}': {source}")]
  Copy {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error(transparent)]
  Extract(#[from] ArchiveError),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

/// Where a package came from and where its sources ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadArtifact {
  pub url: String,
  /// Cached tarball; `None` when an existing source tree was reused.
  pub package_path: Option<PathBuf>,
  pub source_dir: PathBuf,
}

impl DownloadArtifact {
  pub fn reused(&self) -> bool {
    self.package_path.is_none()
  }
}

/// Make `package` available as an extracted tree at `source_dir`.
///
/// URLs are tried in order until one downloads. Extraction failures are not
/// retried against other mirrors.
pub async fn download_package<T: Transport>(
  transport: &T,
  package: &Package,
  packages_dir: &Path,
  source_dir: &Path,
) -> Result<DownloadArtifact, DownloadError> {
  let first = package.urls.first().ok_or(DownloadError::NoUrls)?;

  if source_dir.is_dir() {
    info!(source = %source_dir.display(), "reusing existing source tree");
    return Ok(DownloadArtifact {
      url: first.clone(),
      package_path: None,
      source_dir: source_dir.to_path_buf(),
    });
  }

  tokio::fs::create_dir_all(packages_dir).await?;

  let mut last_err = DownloadError::NoUrls;
  for url in &package.urls {
    let package_path = match fetch(transport, url, packages_dir).await {
      Ok(path) => path,
      Err(e) => {
        warn!(url = %url, error = %e, "download failed");
        last_err = e;
        continue;
      }
    };

    extract(&package_path, source_dir, package).await?;
    return Ok(DownloadArtifact {
      url: url.clone(),
      package_path: Some(package_path),
      source_dir: source_dir.to_path_buf(),
    });
  }

  Err(last_err)
}

/// Get `url` into the package cache, returning the cached path.
async fn fetch<T: Transport>(transport: &T, url: &str, packages_dir: &Path) -> Result<PathBuf, DownloadError> {
  if let Some(local) = local_path(url) {
    let name = local
      .file_name()
      .map(|n| n.to_string_lossy().to_string())
      .unwrap_or_else(|| url_to_filename(url));
    let dest = packages_dir.join(name);
    if !dest.is_file() {
      debug!(from = %local.display(), to = %dest.display(), "copying local package");
      tokio::fs::copy(&local, &dest)
        .await
        .map_err(|source| DownloadError::Copy { path: local, source })?;
    }
    return Ok(dest);
  }

  let filename = remote_filename(transport, url).await;
  let dest = packages_dir.join(&filename);
  if dest.is_file() {
    info!(package = %dest.display(), "using cached package");
    return Ok(dest);
  }

  info!(url, backend = transport.name(), "downloading");
  let partial = packages_dir.join(format!("{}.part", filename));
  if let Err(source) = transport.get(url, &partial).await {
    let _ = tokio::fs::remove_file(&partial).await;
    return Err(DownloadError::Transport {
      url: url.to_string(),
      source,
    });
  }
  tokio::fs::rename(&partial, &dest).await?;
  Ok(dest)
}

async fn extract(package_path: &Path, source_dir: &Path, package: &Package) -> Result<(), DownloadError> {
  let archive = package_path.to_path_buf();
  let dest = source_dir.to_path_buf();
  let kind = package.kind;

  let result = tokio::task::spawn_blocking(move || archive::extract(&archive, &dest, kind))
    .await
    .map_err(std::io::Error::other)?;

  if let Err(e) = result {
    // A half-extracted tree would be reused by the next run.
    let _ = tokio::fs::remove_dir_all(source_dir).await;
    return Err(e.into());
  }
  Ok(())
}

/// `file://` URLs and plain paths are read from disk.
fn local_path(url: &str) -> Option<PathBuf> {
  if let Some(path) = url.strip_prefix("file://") {
    return Some(PathBuf::from(path));
  }
  (!url.contains("://")).then(|| PathBuf::from(url))
}

#[cfg(test)]
mod tests {
  use std::cell::Cell;
  use std::fs;

  use super::*;
  use crate::archive::ArchiveKind;
  use crate::transport::Headers;
  use crate::util::testutil::{TarEntry, write_tarball};
  use tempfile::TempDir;

  /// Serves one tarball and counts requests. URLs containing "broken" fail.
  struct CountingTransport {
    body: Vec<u8>,
    heads: Cell<usize>,
    gets: Cell<usize>,
  }

  impl CountingTransport {
    fn serving(tarball: &Path) -> Self {
      Self {
        body: fs::read(tarball).unwrap(),
        heads: Cell::new(0),
        gets: Cell::new(0),
      }
    }
  }

  impl Transport for CountingTransport {
    fn name(&self) -> &'static str {
      "counting"
    }

    async fn head(&self, _url: &str) -> Result<Headers, TransportError> {
      self.heads.set(self.heads.get() + 1);
      Ok(Headers::new())
    }

    async fn get(&self, url: &str, dest: &Path) -> Result<(), TransportError> {
      self.gets.set(self.gets.get() + 1);
      if url.contains("broken") {
        return Err(TransportError::Failed {
          backend: "counting",
          url: url.to_string(),
          code: Some(22),
          stderr: "not found".to_string(),
        });
      }
      fs::write(dest, &self.body)?;
      Ok(())
    }
  }

  fn fixture(temp: &TempDir) -> PathBuf {
    let tarball = temp.path().join("fixture.tar.gz");
    write_tarball(
      &tarball,
      ArchiveKind::Gzip,
      &[TarEntry::file("php-8.3.2/configure", "#!/bin/sh\n", 0o755)],
    );
    tarball
  }

  fn package(urls: &[&str]) -> Package {
    Package {
      urls: urls.iter().map(|u| u.to_string()).collect(),
      kind: None,
    }
  }

  #[tokio::test]
  async fn second_download_is_a_noop() {
    let temp = TempDir::new().unwrap();
    let transport = CountingTransport::serving(&fixture(&temp));
    let packages = temp.path().join("packages");
    let source = temp.path().join("source").join("8.3.2");
    let pkg = package(&["https://www.php.net/distributions/php-8.3.2.tar.gz"]);

    let first = download_package(&transport, &pkg, &packages, &source).await.unwrap();
    assert!(!first.reused());
    assert_eq!(first.package_path, Some(packages.join("php-8.3.2.tar.gz")));
    assert!(source.join("configure").is_file());

    let second = download_package(&transport, &pkg, &packages, &source).await.unwrap();
    assert!(second.reused());
    assert_eq!(second.source_dir, source);
    assert_eq!(transport.gets.get(), 1);
  }

  #[tokio::test]
  async fn cached_package_is_not_fetched_again() {
    let temp = TempDir::new().unwrap();
    let transport = CountingTransport::serving(&fixture(&temp));
    let packages = temp.path().join("packages");
    let pkg = package(&["https://example.com/php-8.3.2.tar.gz"]);

    download_package(&transport, &pkg, &packages, &temp.path().join("a")).await.unwrap();
    download_package(&transport, &pkg, &packages, &temp.path().join("b")).await.unwrap();

    assert_eq!(transport.gets.get(), 1);
    assert!(temp.path().join("b").join("configure").is_file());
  }

  #[tokio::test]
  async fn mirrors_are_tried_in_order() {
    let temp = TempDir::new().unwrap();
    let transport = CountingTransport::serving(&fixture(&temp));
    let pkg = package(&["https://broken.example.com/php-8.3.2.tar.gz", "https://example.com/php-8.3.2.tar.gz"]);

    let artifact = download_package(&transport, &pkg, &temp.path().join("packages"), &temp.path().join("src"))
      .await
      .unwrap();

    assert_eq!(artifact.url, "https://example.com/php-8.3.2.tar.gz");
    assert_eq!(transport.gets.get(), 2);
  }

  #[tokio::test]
  async fn all_mirrors_failing_is_a_transport_error() {
    let temp = TempDir::new().unwrap();
    let transport = CountingTransport::serving(&fixture(&temp));
    let pkg = package(&["https://broken.example.com/php.tar.gz"]);

    let err = download_package(&transport, &pkg, &temp.path().join("packages"), &temp.path().join("src"))
      .await
      .unwrap_err();

    assert!(matches!(err, DownloadError::Transport { .. }));
    assert!(!temp.path().join("packages").join("php.tar.gz.part").exists());
  }

  #[tokio::test]
  async fn local_paths_bypass_the_transport() {
    let temp = TempDir::new().unwrap();
    let tarball = fixture(&temp);
    let transport = CountingTransport::serving(&tarball);
    let url = format!("file://{}", tarball.display());

    let artifact = download_package(
      &transport,
      &package(&[url.as_str()]),
      &temp.path().join("packages"),
      &temp.path().join("src"),
    )
    .await
    .unwrap();

    assert_eq!(transport.heads.get(), 0);
    assert_eq!(transport.gets.get(), 0);
    assert_eq!(artifact.package_path, Some(temp.path().join("packages").join("fixture.tar.gz")));
  }

  #[tokio::test]
  async fn failed_extraction_leaves_no_source_tree() {
    let temp = TempDir::new().unwrap();
    let bogus = temp.path().join("bogus.tar.gz");
    fs::write(&bogus, b"not a tarball").unwrap();
    let transport = CountingTransport::serving(&bogus);
    let source = temp.path().join("src");

    let err = download_package(
      &transport,
      &package(&["https://example.com/bogus.tar.gz"]),
      &temp.path().join("packages"),
      &source,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, DownloadError::Extract(_)));
    assert!(!source.exists());
  }
}
