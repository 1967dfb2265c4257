//! CLI output formatting utilities.
//!
//! Status lines, the failure banner, and Unicode symbols. Everything meant
//! for the user goes through here; build-tool noise stays in the build log.

use owo_colors::{OwoColorize, Stream};

use phpbuild_lib::pipeline::{BuildFailure, CleanupOutcome};

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const WARNING: &str = "⚠";
}

const BANNER_TITLE: &str = "BUILD ERROR";

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    symbols::WARNING.if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

/// The boxed report printed when a build fails.
pub fn render_failure_banner(failure: &BuildFailure) -> String {
  let rule = "-".repeat(BANNER_TITLE.len() + 6);
  let mut out = String::new();

  out.push('\n');
  out.push_str(&format!("{}\n", rule));
  out.push_str(&format!(
    "|  {}  |\n",
    BANNER_TITLE.if_supports_color(Stream::Stderr, |s| s.red())
  ));
  out.push_str(&format!("{}\n\n", rule));
  out.push_str(&format!("{}\n", failure));

  if let CleanupOutcome::Failed(reason) = &failure.cleanup {
    out.push_str(&format!("Cleanup failed: {}\n", reason));
  }

  if !failure.log_tail.is_empty() {
    out.push_str(&format!("\nLast {} log lines:\n\n", failure.log_tail.len()));
    for line in &failure.log_tail {
      out.push_str(&format!("  {}\n", line));
    }
  }

  if let Some(path) = &failure.log_path {
    out.push_str(&format!("\nThe full Log is available at '{}'.\n", path.display()));
  }

  out
}
