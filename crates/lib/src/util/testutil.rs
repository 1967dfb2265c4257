//! Test utilities for phpbuild-lib.
//!
//! Helpers to fabricate source tarballs and stand-in tools (`make`, `patch`)
//! that record how they were invoked.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crate::archive::ArchiveKind;

/// A file or link to place in a generated tarball.
pub struct TarEntry {
  pub path: String,
  pub contents: Vec<u8>,
  pub mode: u32,
  pub link: Option<(tar::EntryType, String)>,
}

impl TarEntry {
  pub fn file(path: &str, contents: &str, mode: u32) -> Self {
    Self {
      path: path.to_string(),
      contents: contents.as_bytes().to_vec(),
      mode,
      link: None,
    }
  }

  pub fn symlink(path: &str, target: &str) -> Self {
    Self::link(path, tar::EntryType::Symlink, target)
  }

  pub fn hard_link(path: &str, target: &str) -> Self {
    Self::link(path, tar::EntryType::Link, target)
  }

  fn link(path: &str, kind: tar::EntryType, target: &str) -> Self {
    Self {
      path: path.to_string(),
      contents: Vec::new(),
      mode: 0o777,
      link: Some((kind, target.to_string())),
    }
  }
}

/// Write a compressed tarball containing `entries` to `path`.
pub fn write_tarball(path: &Path, kind: ArchiveKind, entries: &[TarEntry]) {
  let file = File::create(path).unwrap();
  match kind {
    ArchiveKind::Gzip => {
      let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::fast());
      let encoder = append_entries(encoder, entries);
      encoder.finish().unwrap();
    }
    ArchiveKind::Bzip2 => {
      let encoder = bzip2::write::BzEncoder::new(file, bzip2::Compression::fast());
      let encoder = append_entries(encoder, entries);
      encoder.finish().unwrap();
    }
  }
}

fn append_entries<W: std::io::Write>(writer: W, entries: &[TarEntry]) -> W {
  let mut builder = tar::Builder::new(writer);
  for entry in entries {
    let mut header = tar::Header::new_gnu();
    header.set_size(entry.contents.len() as u64);
    header.set_mode(entry.mode);
    if let Some((kind, target)) = &entry.link {
      header.set_entry_type(*kind);
      builder.append_link(&mut header, &entry.path, target).unwrap();
      continue;
    }
    header.set_cksum();
    builder
      .append_data(&mut header, &entry.path, entry.contents.as_slice())
      .unwrap();
  }
  builder.into_inner().unwrap()
}

/// Write an executable shell script.
#[cfg(unix)]
pub fn write_script(path: &Path, body: &str) -> PathBuf {
  use std::os::unix::fs::PermissionsExt;

  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).unwrap();
  }
  fs::write(path, format!("#!/bin/sh\n{}\n", body)).unwrap();
  fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
  path.to_path_buf()
}

/// Write a stand-in tool that appends its arguments to `record`, then runs `body`.
#[cfg(unix)]
pub fn recording_tool(path: &Path, record: &Path, body: &str) -> PathBuf {
  write_script(
    path,
    &format!("echo \"$*\" >> '{}'\n{}", record.display(), body),
  )
}

/// Lines written to a record file so far.
pub fn read_record(record: &Path) -> Vec<String> {
  fs::read_to_string(record)
    .map(|s| s.lines().map(str::to_string).collect())
    .unwrap_or_default()
}
