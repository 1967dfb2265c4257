//! Implementation of `php-build <definition> <prefix>`.
//!
//! Runs one pipeline on a current-thread runtime. Ctrl-C and SIGTERM cancel
//! the build; the pipeline cleans up and the process exits with the
//! signal's conventional status.

use std::path::Path;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::debug;

use phpbuild_lib::extension::ExtensionOutcome;
use phpbuild_lib::pipeline::{BuildError, BuildFailure, BuildReport, BuildRequest, Pipeline, Signal};
use phpbuild_lib::settings::Settings;
use phpbuild_lib::transport::HttpBackend;

use crate::output::{print_error, print_stat, print_success, print_warning, render_failure_banner};

pub fn cmd_build(definition: &str, prefix: &Path, ini: Option<String>) -> Result<ExitCode> {
  let settings = Settings::from_env();
  debug!(
    root = %settings.root.display(),
    tmp = %settings.tmp_dir.display(),
    make = %settings.tools.make,
    "loaded settings"
  );
  let prefix = std::path::absolute(prefix).with_context(|| format!("Invalid prefix '{}'", prefix.display()))?;

  let request = BuildRequest {
    definition: definition.to_string(),
    prefix,
    ini,
  };

  let rt = tokio::runtime::Builder::new_current_thread()
    .enable_all()
    .build()
    .context("Failed to create async runtime")?;

  let started = Instant::now();
  let pipeline = Pipeline::new(settings, HttpBackend::detect(), request);
  let outcome = rt.block_on(pipeline.run(shutdown_signal()));

  match outcome {
    Ok(report) => {
      print_report(&report, started.elapsed());
      Ok(ExitCode::SUCCESS)
    }
    Err(failure) => {
      report_failure(&failure);
      Ok(exit_code(failure.exit_code()))
    }
  }
}

fn print_report(report: &BuildReport, elapsed: Duration) {
  println!();
  print_success(&format!("Installed {} to {}", report.definition, report.prefix.display()));
  if let Some(ini) = &report.ini {
    print_stat("php.ini", &ini.display().to_string());
  }

  let failed_patches = report.patches.iter().filter(|p| !p.is_applied()).count();
  if failed_patches > 0 {
    print_warning(&format!("{} patch(es) did not apply, see the log", failed_patches));
  }
  for outcome in &report.extensions {
    if let ExtensionOutcome::Failed { request, error } = outcome {
      print_warning(&format!("extension {} was not installed: {}", request, error));
    }
  }

  print_stat("Log", &report.log_path.display().to_string());
  print_stat(
    "Took",
    &humantime::format_duration(Duration::from_secs(elapsed.as_secs())).to_string(),
  );
}

fn report_failure(failure: &BuildFailure) {
  match &failure.error {
    BuildError::DefinitionNotFound(name) => {
      print_error(&format!("definition '{}' not found", name));
      eprintln!("Run 'php-build --definitions' to list the available definitions.");
    }
    _ => eprint!("{}", render_failure_banner(failure)),
  }
}

fn exit_code(code: i32) -> ExitCode {
  ExitCode::from(u8::try_from(code).unwrap_or(1))
}

/// Resolves with the first SIGINT or SIGTERM. Never resolves if no handler
/// could be installed.
async fn shutdown_signal() -> Signal {
  let interrupt = async {
    if tokio::signal::ctrl_c().await.is_err() {
      std::future::pending::<()>().await;
    }
  };

  #[cfg(unix)]
  {
    use tokio::signal::unix::{SignalKind, signal};

    let terminate = async {
      match signal(SignalKind::terminate()) {
        Ok(mut stream) => {
          stream.recv().await;
        }
        Err(_) => std::future::pending::<()>().await,
      }
    };

    tokio::select! {
      _ = interrupt => Signal::Interrupt,
      _ = terminate => Signal::Terminate,
    }
  }

  #[cfg(not(unix))]
  {
    interrupt.await;
    Signal::Interrupt
  }
}
