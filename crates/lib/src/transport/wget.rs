//! wget backend.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use super::{Headers, Transport, TransportError, parse_headers};

#[derive(Debug, Clone)]
pub struct Wget {
  program: PathBuf,
}

impl Wget {
  pub fn new(program: impl Into<PathBuf>) -> Self {
    Self {
      program: program.into(),
    }
  }

  fn command(&self) -> Command {
    let mut command = Command::new(&self.program);
    command.stdin(Stdio::null()).kill_on_drop(true);
    command
  }
}

impl Transport for Wget {
  fn name(&self) -> &'static str {
    "wget"
  }

  async fn head(&self, url: &str) -> Result<Headers, TransportError> {
    debug!(url, "wget HEAD");
    // --server-response prints the headers on stderr
    let output = self
      .command()
      .args(["--quiet", "--server-response", "--spider", url])
      .output()
      .await?;

    if !output.status.success() {
      return Err(TransportError::from_output(self.name(), url, &output));
    }

    Ok(parse_headers(&String::from_utf8_lossy(&output.stderr)))
  }

  async fn get(&self, url: &str, dest: &Path) -> Result<(), TransportError> {
    debug!(url, dest = %dest.display(), "wget GET");
    let output = self
      .command()
      .args(["--no-verbose", "--output-document"])
      .arg(dest)
      .arg(url)
      .output()
      .await?;

    if !output.status.success() {
      return Err(TransportError::from_output(self.name(), url, &output));
    }
    Ok(())
  }
}
