//! The per-run build log.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use chrono::Local;

use crate::consts::APP_NAME;

/// Append-only log file that collects all build tool output for one run.
///
/// Named `php-build.<definition>.<timestamp>.log` and opened once. Child
/// processes get duplicated handles via [`BuildLog::stdio`].
#[derive(Debug)]
pub struct BuildLog {
  path: PathBuf,
  file: File,
}

impl BuildLog {
  /// Create the log for `definition` inside `dir`.
  pub fn create(dir: &Path, definition: &str) -> io::Result<Self> {
    fs::create_dir_all(dir)?;
    let stamp = Local::now().format("%Y%m%d%H%M%S");
    let path = dir.join(format!("{}.{}.{}.log", APP_NAME, definition, stamp));
    Self::open(path)
  }

  /// Open (or create) a log at an explicit path, appending.
  pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
    let path = path.into();
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    Ok(Self { path, file })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// A handle suitable for a child's stdout or stderr.
  pub fn stdio(&self) -> io::Result<Stdio> {
    Ok(Stdio::from(self.file.try_clone()?))
  }

  pub fn write_line(&self, line: &str) -> io::Result<()> {
    let mut file = &self.file;
    writeln!(file, "{}", line)
  }

  /// Stage header, e.g. `==> Compile`.
  pub fn section(&self, title: &str) -> io::Result<()> {
    self.write_line(&format!("\n==> {}", title))
  }

  /// The last `n` lines written so far.
  pub fn tail(&self, n: usize) -> io::Result<Vec<String>> {
    let content = fs::read(&self.path)?;
    let content = String::from_utf8_lossy(&content);
    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(n);
    Ok(lines[start..].iter().map(|l| l.to_string()).collect())
  }
}
