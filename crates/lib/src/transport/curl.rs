//! curl backend.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use super::{Headers, Transport, TransportError, parse_headers};

#[derive(Debug, Clone)]
pub struct Curl {
  program: PathBuf,
}

impl Curl {
  pub fn new(program: impl Into<PathBuf>) -> Self {
    Self {
      program: program.into(),
    }
  }

  fn command(&self) -> Command {
    let mut command = Command::new(&self.program);
    // -q must come first so ~/.curlrc cannot change the flags below
    command.arg("-q").stdin(Stdio::null()).kill_on_drop(true);
    command
  }
}

impl Transport for Curl {
  fn name(&self) -> &'static str {
    "curl"
  }

  async fn head(&self, url: &str) -> Result<Headers, TransportError> {
    debug!(url, "curl HEAD");
    let output = self
      .command()
      .args(["--silent", "--head", "--location", "--fail", url])
      .output()
      .await?;

    if !output.status.success() {
      return Err(TransportError::from_output(self.name(), url, &output));
    }

    Ok(parse_headers(&String::from_utf8_lossy(&output.stdout)))
  }

  async fn get(&self, url: &str, dest: &Path) -> Result<(), TransportError> {
    debug!(url, dest = %dest.display(), "curl GET");
    let output = self
      .command()
      .args(["--silent", "--show-error", "--location", "--fail", "--output"])
      .arg(dest)
      .arg(url)
      .stdout(Stdio::null())
      .output()
      .await?;

    if !output.status.success() {
      return Err(TransportError::from_output(self.name(), url, &output));
    }
    Ok(())
  }
}
