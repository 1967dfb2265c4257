//! Shared fixtures for pipeline integration tests.
//!
//! A [`TestEnv`] owns a throwaway share tree, temp root, install prefix and
//! a `bin/` of stand-in tools, so a whole build can run without a compiler
//! or network access.

#![allow(dead_code)]

use std::collections::HashMap;
use std::fs::{self, File};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use phpbuild_lib::settings::{Settings, vars};
use tempfile::TempDir;

/// A configure script that records its arguments and emits a Makefile.
pub const FAKE_CONFIGURE: &str = r#"#!/bin/sh
echo "$*" > configure.args
printf 'all:\n\ttrue\n' > Makefile
"#;

pub const INI_DEVELOPMENT: &str = "[PHP]\nextension_dir = \"./\"\nmemory_limit = 128M\n";

pub struct TestEnv {
  pub temp: TempDir,
  vars: HashMap<String, String>,
}

impl TestEnv {
  pub fn new() -> Self {
    let temp = TempDir::new().unwrap();
    for dir in ["share/definitions", "share/patches", "tmp", "bin"] {
      fs::create_dir_all(temp.path().join(dir)).unwrap();
    }

    let mut env = Self {
      temp,
      vars: HashMap::new(),
    };
    env.set_var(vars::ROOT, env.root().display().to_string());
    env.set_var(vars::TMPDIR, env.tmp().display().to_string());
    env.set_var(vars::MAKE, env.make().display().to_string());
    env.set_var(vars::PATCH, env.patch().display().to_string());
    env.fake_make("");
    env.fake_patch("");
    env
  }

  pub fn path(&self) -> &Path {
    self.temp.path()
  }

  pub fn root(&self) -> PathBuf {
    self.path().join("share")
  }

  pub fn tmp(&self) -> PathBuf {
    self.path().join("tmp")
  }

  pub fn prefix(&self) -> PathBuf {
    self.path().join("prefix")
  }

  pub fn make(&self) -> PathBuf {
    self.path().join("bin/make")
  }

  pub fn patch(&self) -> PathBuf {
    self.path().join("bin/patch")
  }

  pub fn make_record(&self) -> PathBuf {
    self.path().join("make.calls")
  }

  pub fn patch_record(&self) -> PathBuf {
    self.path().join("patch.calls")
  }

  pub fn source_dir(&self, definition: &str) -> PathBuf {
    self.tmp().join("source").join(definition)
  }

  pub fn set_var(&mut self, key: &str, value: impl Into<String>) {
    self.vars.insert(key.to_string(), value.into());
  }

  pub fn settings(&self) -> Settings {
    Settings::from_vars(|key| self.vars.get(key).cloned())
  }

  /// Replace the fake `make`. It records its arguments, then runs `body`.
  pub fn fake_make(&self, body: &str) {
    write_script(
      &self.make(),
      &format!("echo \"$*\" >> '{}'\n{}", self.make_record().display(), body),
    );
  }

  /// Replace the fake `patch`. It records its arguments, then runs `body`.
  pub fn fake_patch(&self, body: &str) {
    write_script(
      &self.patch(),
      &format!("echo \"$*\" >> '{}'\n{}", self.patch_record().display(), body),
    );
  }

  pub fn write_file(&self, rel: &str, content: &str) -> PathBuf {
    let path = self.path().join(rel);
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
  }

  /// A gzipped source tarball with a fake configure and a php.ini template.
  pub fn source_tarball(&self, name: &str) -> PathBuf {
    let path = self.path().join(format!("{}.tar.gz", name));
    let file = File::create(&path).unwrap();
    let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::fast());
    let mut builder = tar::Builder::new(encoder);

    for (entry, content, mode) in [
      ("configure", FAKE_CONFIGURE, 0o755),
      ("php.ini-development", INI_DEVELOPMENT, 0o644),
      ("php.ini-production", "[PHP]\nmemory_limit = 256M\n", 0o644),
    ] {
      let mut header = tar::Header::new_gnu();
      header.set_size(content.len() as u64);
      header.set_mode(mode);
      header.set_cksum();
      builder
        .append_data(&mut header, format!("{}/{}", name, entry), content.as_bytes())
        .unwrap();
    }

    builder.into_inner().unwrap().finish().unwrap();
    path
  }

  /// A builtin definition installing `tarball`, followed by `body`.
  pub fn definition(&self, name: &str, tarball: &Path, body: &str) -> PathBuf {
    let script = format!("build.install_package(\"file://{}\")\n{}\n", tarball.display(), body);
    self.write_file(&format!("share/definitions/{}", name), &script)
  }
}

pub fn write_script(path: &Path, body: &str) -> PathBuf {
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).unwrap();
  }
  fs::write(path, format!("#!/bin/sh\n{}\n", body)).unwrap();
  fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
  path.to_path_buf()
}

/// Lines written to a record file so far.
pub fn read_record(record: &Path) -> Vec<String> {
  fs::read_to_string(record)
    .map(|s| s.lines().map(str::to_string).collect())
    .unwrap_or_default()
}
