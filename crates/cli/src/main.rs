mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use phpbuild_lib::settings::{is_truthy, vars};

/// Build and install PHP releases into isolated prefixes
#[derive(Parser)]
#[command(name = "php-build")]
#[command(version, about, long_about = None)]
#[command(disable_help_flag = true, disable_version_flag = true)]
#[command(override_usage = "php-build [-i|--ini <env-or-path>] <definition> <prefix>\n       php-build --definitions")]
struct Cli {
  /// php.ini to install: an environment name (development, production) or a file path
  #[arg(short, long, value_name = "ENV_OR_PATH")]
  ini: Option<String>,

  /// List available definitions, oldest first
  #[arg(long, conflicts_with_all = ["definition", "prefix"])]
  definitions: bool,

  /// Print this help
  #[arg(short, long)]
  help: bool,

  /// Print the version
  #[arg(short, long)]
  version: bool,

  /// Definition name or path to a definition file
  definition: Option<String>,

  /// Directory to install into
  prefix: Option<PathBuf>,
}

fn main() -> Result<ExitCode> {
  let cli = Cli::parse();

  init_tracing();

  if cli.help {
    eprint!("{}", Cli::command().render_help());
    return Ok(ExitCode::SUCCESS);
  }

  if cli.version {
    println!("php-build {}", env!("CARGO_PKG_VERSION"));
    return Ok(ExitCode::SUCCESS);
  }

  if cli.definitions {
    cmd::cmd_definitions()?;
    return Ok(ExitCode::SUCCESS);
  }

  match (cli.definition, cli.prefix) {
    (Some(definition), Some(prefix)) => cmd::cmd_build(&definition, &prefix, cli.ini),
    _ => {
      eprint!("{}", Cli::command().render_usage());
      eprintln!();
      Ok(ExitCode::FAILURE)
    }
  }
}

/// `RUST_LOG` wins; `PHP_BUILD_DEBUG` raises the default to debug.
fn init_tracing() {
  let debug = std::env::var(vars::DEBUG).is_ok_and(|v| is_truthy(&v));
  let default = if debug { "debug" } else { "info" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .with_target(debug)
    .without_time()
    .init();
}
