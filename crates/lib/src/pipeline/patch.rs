//! Applying queued patches. Failures are reported, never fatal.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::execute::{Cmd, CommandRunner};

/// Result of applying one patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOutcome {
  Applied(PathBuf),
  /// Already applied, rejected, or missing.
  Failed { patch: PathBuf, error: String },
}

impl PatchOutcome {
  pub fn patch(&self) -> &Path {
    match self {
      Self::Applied(patch) | Self::Failed { patch, .. } => patch,
    }
  }

  pub fn is_applied(&self) -> bool {
    matches!(self, Self::Applied(_))
  }
}

/// Apply `patches` to `source_dir` in order, one `patch -p1` each.
pub async fn apply_all(runner: &CommandRunner, patch_tool: &str, patches: &[PathBuf], source_dir: &Path) -> Vec<PatchOutcome> {
  let mut outcomes = Vec::with_capacity(patches.len());

  for patch in patches {
    let outcome = if !patch.is_file() {
      PatchOutcome::Failed {
        patch: patch.clone(),
        error: "patch file not found".to_string(),
      }
    } else {
      let cmd = Cmd::tool(patch_tool)
        .args(["-p1", "--forward", "--batch", "-i"])
        .arg(patch.display().to_string())
        .cwd(source_dir);
      match runner.run(&cmd).await {
        Ok(()) => PatchOutcome::Applied(patch.clone()),
        Err(e) => PatchOutcome::Failed {
          patch: patch.clone(),
          error: e.to_string(),
        },
      }
    };

    match &outcome {
      PatchOutcome::Applied(patch) => info!(patch = %patch.display(), "applied patch"),
      PatchOutcome::Failed { patch, error } => {
        warn!(patch = %patch.display(), error = %error, "patch did not apply, continuing");
        let _ = runner
          .log()
          .write_line(&format!("patch {} did not apply: {}", patch.display(), error));
      }
    }
    outcomes.push(outcome);
  }

  outcomes
}
