//! Tarball extraction.
//!
//! Source releases ship as gzip or bzip2 compressed tarballs with a single
//! top-level directory (`php-8.3.2/`). Extraction always strips that first
//! component so the contents land directly in the destination. Nothing is
//! written outside the destination, whether through `..` or through links.

use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Component, Path, PathBuf};

use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use tar::Archive;
use thiserror::Error;
use tracing::{debug, info};

/// Compression formats php-build can unpack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
  Gzip,
  Bzip2,
}

impl ArchiveKind {
  /// Infer the kind from a file name (`.tar.gz`, `.tgz`, `.tar.bz2`, ...).
  pub fn from_path(path: &Path) -> Option<Self> {
    let name = path.file_name()?.to_string_lossy().to_ascii_lowercase();
    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
      Some(Self::Gzip)
    } else if name.ends_with(".tar.bz2") || name.ends_with(".tbz2") || name.ends_with(".tbz") {
      Some(Self::Bzip2)
    } else {
      None
    }
  }

  /// Parse an explicit kind as written in a definition.
  pub fn from_name(name: &str) -> Option<Self> {
    match name.to_ascii_lowercase().as_str() {
      "gz" | "gzip" | "tgz" | "tar.gz" => Some(Self::Gzip),
      "bz2" | "bzip2" | "tbz2" | "tar.bz2" => Some(Self::Bzip2),
      _ => None,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Gzip => "gz",
      Self::Bzip2 => "bz2",
    }
  }
}

impl fmt::Display for ArchiveKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// Errors that can occur while unpacking an archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
  /// The archive kind was neither given nor recognizable from the name.
  #[error("unsupported archive type: {0}")]
  Unsupported(PathBuf),

  /// Reading or writing failed (includes corrupt archives).
  #[error("failed to extract '{path}': {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// Extract `archive` into `dest`, stripping the top-level directory.
///
/// `kind` overrides detection from the file extension.
pub fn extract(archive: &Path, dest: &Path, kind: Option<ArchiveKind>) -> Result<(), ArchiveError> {
  let kind = kind
    .or_else(|| ArchiveKind::from_path(archive))
    .ok_or_else(|| ArchiveError::Unsupported(archive.to_path_buf()))?;

  info!(archive = %archive.display(), dest = %dest.display(), %kind, "extracting");

  let io_err = |source| ArchiveError::Io {
    path: archive.to_path_buf(),
    source,
  };

  fs::create_dir_all(dest).map_err(io_err)?;
  let file = BufReader::new(File::open(archive).map_err(io_err)?);

  let unpacked = match kind {
    ArchiveKind::Gzip => unpack_stripped(GzDecoder::new(file), dest),
    ArchiveKind::Bzip2 => unpack_stripped(BzDecoder::new(file), dest),
  };
  unpacked.map_err(io_err)
}

fn unpack_stripped<R: Read>(reader: R, dest: &Path) -> std::io::Result<()> {
  let mut archive = Archive::new(reader);
  let root = dunce::canonicalize(dest)?;

  for entry in archive.entries()? {
    let mut entry = entry?;
    let path = entry.path()?.into_owned();

    // Strip the first component (e.g., php-8.3.2/)
    let stripped = strip_top(&path);

    if stripped.as_os_str().is_empty() {
      continue;
    }
    if !is_contained(&stripped) {
      debug!(path = %path.display(), "skipping entry outside of the source tree");
      continue;
    }

    let dest_path = dest.join(&stripped);
    if !resolves_inside(&root, &dest_path) {
      debug!(path = %path.display(), "skipping entry below a link out of the source tree");
      continue;
    }

    let kind = entry.header().entry_type();
    if kind.is_symlink() || kind.is_hard_link() {
      let Some(target) = entry.link_name()?.map(|t| t.into_owned()) else {
        continue;
      };

      if kind.is_hard_link() {
        // Hard link targets name an archive member, top directory included.
        let target = strip_top(&target);
        if !is_contained(&target) {
          debug!(path = %path.display(), target = %target.display(), "skipping hard link out of the source tree");
          continue;
        }
        if let Some(parent) = dest_path.parent() {
          fs::create_dir_all(parent)?;
        }
        if fs::symlink_metadata(&dest_path).is_ok() {
          fs::remove_file(&dest_path)?;
        }
        fs::hard_link(dest.join(target), &dest_path)?;
        continue;
      }

      let base = stripped.parent().unwrap_or(Path::new(""));
      if target.has_root() || !is_contained(&base.join(&target)) {
        debug!(path = %path.display(), target = %target.display(), "skipping symlink out of the source tree");
        continue;
      }
    }

    if let Some(parent) = dest_path.parent() {
      fs::create_dir_all(parent)?;
    }

    entry.unpack(&dest_path)?;
  }

  Ok(())
}

fn strip_top(path: &Path) -> PathBuf {
  path.components().skip(1).collect()
}

/// Whether a relative path stays below its base once `..` is applied.
fn is_contained(path: &Path) -> bool {
  let mut depth = 0usize;
  for component in path.components() {
    match component {
      Component::Normal(_) => depth += 1,
      Component::CurDir => {}
      Component::ParentDir => match depth.checked_sub(1) {
        Some(d) => depth = d,
        None => return false,
      },
      Component::RootDir | Component::Prefix(_) => return false,
    }
  }
  true
}

/// Whether the deepest existing ancestor of `path` resolves below `root`.
fn resolves_inside(root: &Path, path: &Path) -> bool {
  let Some(parent) = path.parent() else {
    return false;
  };
  parent
    .ancestors()
    .find(|ancestor| fs::symlink_metadata(ancestor).is_ok())
    // A dangling link fails to canonicalize.
    .and_then(|ancestor| dunce::canonicalize(ancestor).ok())
    .is_some_and(|resolved| resolved.starts_with(root))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::testutil::{TarEntry, write_tarball};
  use tempfile::TempDir;

  fn sample_entries() -> Vec<TarEntry> {
    vec![
      TarEntry::file("php-8.3.2/configure", "#!/bin/sh\n", 0o755),
      TarEntry::file("php-8.3.2/main/php.h", "/* php */\n", 0o644),
    ]
  }

  #[test]
  fn kind_from_path() {
    assert_eq!(ArchiveKind::from_path(Path::new("php-8.3.2.tar.gz")), Some(ArchiveKind::Gzip));
    assert_eq!(ArchiveKind::from_path(Path::new("xdebug-3.3.1.tgz")), Some(ArchiveKind::Gzip));
    assert_eq!(ArchiveKind::from_path(Path::new("php-5.3.29.tar.bz2")), Some(ArchiveKind::Bzip2));
    assert_eq!(ArchiveKind::from_path(Path::new("php-8.3.2.tar.xz")), None);
    assert_eq!(ArchiveKind::from_path(Path::new("php-8.3.2.zip")), None);
  }

  #[test]
  fn kind_from_name() {
    assert_eq!(ArchiveKind::from_name("BZ2"), Some(ArchiveKind::Bzip2));
    assert_eq!(ArchiveKind::from_name("gzip"), Some(ArchiveKind::Gzip));
    assert_eq!(ArchiveKind::from_name("xz"), None);
  }

  #[test]
  fn extracts_gzip_and_strips_top_level() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("php-8.3.2.tar.gz");
    write_tarball(&archive, ArchiveKind::Gzip, &sample_entries());

    let dest = temp.path().join("source");
    extract(&archive, &dest, None).unwrap();

    assert!(dest.join("configure").is_file());
    assert!(dest.join("main").join("php.h").is_file());
    assert!(!dest.join("php-8.3.2").exists());
  }

  #[test]
  fn extracts_bzip2() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("php-5.3.29.tar.bz2");
    write_tarball(&archive, ArchiveKind::Bzip2, &sample_entries());

    let dest = temp.path().join("source");
    extract(&archive, &dest, None).unwrap();

    assert_eq!(fs::read_to_string(dest.join("main/php.h")).unwrap(), "/* php */\n");
  }

  #[cfg(unix)]
  #[test]
  fn keeps_executable_bit() {
    use std::os::unix::fs::PermissionsExt;

    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("php.tar.gz");
    write_tarball(&archive, ArchiveKind::Gzip, &sample_entries());

    let dest = temp.path().join("source");
    extract(&archive, &dest, None).unwrap();

    let mode = fs::metadata(dest.join("configure")).unwrap().permissions().mode();
    assert_ne!(mode & 0o111, 0, "configure should stay executable");
  }

  #[test]
  fn explicit_kind_overrides_extension() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("download");
    write_tarball(&archive, ArchiveKind::Bzip2, &sample_entries());

    let dest = temp.path().join("source");
    extract(&archive, &dest, Some(ArchiveKind::Bzip2)).unwrap();
    assert!(dest.join("configure").is_file());
  }

  #[cfg(unix)]
  #[test]
  fn symlink_cannot_redirect_writes_outside() {
    let temp = TempDir::new().unwrap();
    let outside = temp.path().join("outside");
    fs::create_dir_all(&outside).unwrap();
    let archive = temp.path().join("php.tar.gz");
    write_tarball(
      &archive,
      ArchiveKind::Gzip,
      &[
        TarEntry::symlink("top/link", outside.to_str().unwrap()),
        TarEntry::file("top/link/escaped", "gotcha\n", 0o644),
        TarEntry::symlink("top/up", "../../outside"),
        TarEntry::file("top/up/escaped-too", "gotcha\n", 0o644),
        TarEntry::file("top/configure", "#!/bin/sh\n", 0o755),
      ],
    );

    let dest = temp.path().join("source");
    extract(&archive, &dest, None).unwrap();

    assert!(!outside.join("escaped").exists());
    assert!(!outside.join("escaped-too").exists());
    assert!(!fs::symlink_metadata(dest.join("link")).unwrap().file_type().is_symlink());
    assert!(dest.join("link/escaped").is_file());
    assert!(dest.join("up/escaped-too").is_file());
    assert!(dest.join("configure").is_file());
  }

  #[cfg(unix)]
  #[test]
  fn links_within_the_tree_are_kept() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("php.tar.gz");
    write_tarball(
      &archive,
      ArchiveKind::Gzip,
      &[
        TarEntry::file("php-8.3.2/main/php.h", "/* php */\n", 0o644),
        TarEntry::symlink("php-8.3.2/include/php.h", "../main/php.h"),
        TarEntry::hard_link("php-8.3.2/php.h", "php-8.3.2/main/php.h"),
        TarEntry::hard_link("php-8.3.2/passwd", "php-8.3.2/../../etc/passwd"),
      ],
    );

    let dest = temp.path().join("source");
    extract(&archive, &dest, None).unwrap();

    assert_eq!(fs::read_to_string(dest.join("include/php.h")).unwrap(), "/* php */\n");
    assert_eq!(fs::read_to_string(dest.join("php.h")).unwrap(), "/* php */\n");
    assert!(!dest.join("passwd").exists());
  }

  #[test]
  fn unknown_kind_is_unsupported() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("php.zip");
    fs::write(&archive, b"PK").unwrap();

    let result = extract(&archive, &temp.path().join("source"), None);
    assert!(matches!(result, Err(ArchiveError::Unsupported(_))));
  }

  #[test]
  fn corrupt_archive_is_an_error() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("php.tar.gz");
    fs::write(&archive, b"definitely not gzip").unwrap();

    let result = extract(&archive, &temp.path().join("source"), None);
    assert!(matches!(result, Err(ArchiveError::Io { .. })));
  }
}
