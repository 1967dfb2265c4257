//! External command execution with output redirected to the build log.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::rc::Rc;

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::log::BuildLog;

/// Errors that can occur while running a build tool.
#[derive(Debug, Error)]
pub enum CommandError {
  /// The program could not be started (usually: not installed).
  #[error("failed to start '{program}': {source}")]
  Spawn {
    program: String,
    #[source]
    source: std::io::Error,
  },

  /// The program ran and exited unsuccessfully.
  #[error("command `{cmd}` failed with exit code {code:?}")]
  Failed { cmd: String, code: Option<i32> },

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

impl CommandError {
  /// Process exit status this failure maps to.
  ///
  /// Mirrors the tool's own status, 127 when it could not be started, and 1
  /// when no status is available (killed by a signal).
  pub fn status(&self) -> i32 {
    match self {
      Self::Failed { code: Some(code), .. } => *code,
      Self::Spawn { .. } => 127,
      _ => 1,
    }
  }
}

/// A command to run: program, arguments, working directory, environment.
#[derive(Debug, Clone, Default)]
pub struct Cmd {
  program: String,
  args: Vec<String>,
  cwd: Option<PathBuf>,
  env: BTreeMap<String, String>,
  stdin: Option<Vec<u8>>,
}

impl Cmd {
  pub fn new(program: impl Into<String>) -> Self {
    Self {
      program: program.into(),
      ..Default::default()
    }
  }

  /// Build from a tool setting such as `MAKE="gmake -s"`: the first word is
  /// the program, the rest become leading arguments.
  pub fn tool(spec: &str) -> Self {
    let mut words = spec.split_whitespace();
    let program = words.next().unwrap_or(spec);
    Self::new(program).args(words)
  }

  pub fn arg(mut self, arg: impl Into<String>) -> Self {
    self.args.push(arg.into());
    self
  }

  pub fn args<I, S>(mut self, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.args.extend(args.into_iter().map(Into::into));
    self
  }

  pub fn cwd(mut self, dir: impl AsRef<Path>) -> Self {
    self.cwd = Some(dir.as_ref().to_path_buf());
    self
  }

  pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.env.insert(key.into(), value.into());
    self
  }

  /// Bytes fed to the child's stdin.
  pub fn stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
    self.stdin = Some(input.into());
    self
  }

  pub fn program(&self) -> &str {
    &self.program
  }

  pub fn get_args(&self) -> &[String] {
    &self.args
  }
}

impl fmt::Display for Cmd {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.program)?;
    for arg in &self.args {
      write!(f, " {}", arg)?;
    }
    Ok(())
  }
}

/// Runs commands with stdout and stderr appended to the build log.
#[derive(Debug, Clone)]
pub struct CommandRunner {
  log: Rc<BuildLog>,
}

impl CommandRunner {
  pub fn new(log: Rc<BuildLog>) -> Self {
    Self { log }
  }

  pub fn log(&self) -> &BuildLog {
    &self.log
  }

  /// Run `cmd` to completion.
  ///
  /// No timeout. The child is killed if the returned future is dropped.
  pub async fn run(&self, cmd: &Cmd) -> Result<(), CommandError> {
    let line = cmd.to_string();
    self.log.write_line(&format!("$ {}", line))?;

    let mut command = Command::new(&cmd.program);
    command
      .args(&cmd.args)
      .envs(&cmd.env)
      .stdout(self.log.stdio()?)
      .stderr(self.log.stdio()?)
      .stdin(if cmd.stdin.is_some() {
        Stdio::piped()
      } else {
        Stdio::null()
      })
      .kill_on_drop(true);
    if let Some(dir) = &cmd.cwd {
      command.current_dir(dir);
    }

    debug!(cmd = %line, cwd = ?cmd.cwd, "spawning process");

    let mut child = command.spawn().map_err(|source| CommandError::Spawn {
      program: cmd.program.clone(),
      source,
    })?;

    if let (Some(input), Some(mut pipe)) = (&cmd.stdin, child.stdin.take()) {
      // A child that exits without reading closes the pipe early.
      if let Err(e) = pipe.write_all(input).await {
        debug!(error = %e, "child closed stdin");
      }
    }

    let status = child.wait().await?;
    if status.success() {
      Ok(())
    } else {
      Err(CommandError::Failed {
        cmd: line,
        code: status.code(),
      })
    }
  }
}

#[cfg(all(test, unix))]
mod tests {
  use std::fs;

  use super::*;
  use tempfile::TempDir;

  fn runner(temp: &TempDir) -> CommandRunner {
    CommandRunner::new(Rc::new(BuildLog::open(temp.path().join("build.log")).unwrap()))
  }

  #[tokio::test]
  async fn output_goes_to_the_log() {
    let temp = TempDir::new().unwrap();
    let runner = runner(&temp);

    runner
      .run(&Cmd::new("sh").args(["-c", "echo hello; echo oops >&2"]))
      .await
      .unwrap();

    let log = fs::read_to_string(runner.log().path()).unwrap();
    assert!(log.contains("$ sh -c echo hello; echo oops >&2"));
    assert!(log.contains("hello\n"));
    assert!(log.contains("oops\n"));
  }

  #[tokio::test]
  async fn failure_carries_exit_code() {
    let temp = TempDir::new().unwrap();
    let err = runner(&temp)
      .run(&Cmd::new("sh").args(["-c", "exit 7"]))
      .await
      .unwrap_err();
    assert!(matches!(err, CommandError::Failed { code: Some(7), .. }));
    assert_eq!(err.status(), 7);
  }

  #[tokio::test]
  async fn missing_program_is_spawn_error() {
    let temp = TempDir::new().unwrap();
    let err = runner(&temp)
      .run(&Cmd::new("php-build-no-such-program"))
      .await
      .unwrap_err();
    assert!(matches!(err, CommandError::Spawn { .. }));
    assert_eq!(err.status(), 127);
  }

  #[tokio::test]
  async fn cwd_env_and_stdin() {
    let temp = TempDir::new().unwrap();
    let work = temp.path().join("work");
    fs::create_dir_all(&work).unwrap();

    runner(&temp)
      .run(
        &Cmd::new("sh")
          .args(["-c", "cat > input.txt; echo \"$GREETING\" > env.txt"])
          .cwd(&work)
          .env("GREETING", "hi")
          .stdin("from stdin\n"),
      )
      .await
      .unwrap();

    assert_eq!(fs::read_to_string(work.join("input.txt")).unwrap(), "from stdin\n");
    assert_eq!(fs::read_to_string(work.join("env.txt")).unwrap(), "hi\n");
  }

  #[test]
  fn tool_splits_words() {
    let cmd = Cmd::tool("gmake -s").arg("install");
    assert_eq!(cmd.program(), "gmake");
    assert_eq!(cmd.get_args(), &["-s".to_string(), "install".to_string()]);
  }
}
