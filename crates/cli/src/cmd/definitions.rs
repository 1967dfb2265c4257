//! Implementation of `php-build --definitions`.

use anyhow::{Context, Result};

use phpbuild_lib::definition::Registry;
use phpbuild_lib::settings::Settings;

/// Print every builtin definition, version-sorted, one per line.
pub fn cmd_definitions() -> Result<()> {
  let settings = Settings::from_env();
  let registry = Registry::new(&settings.definition_path);

  let names = registry.list().context("Failed to list definitions")?;
  for name in names {
    println!("{}", name);
  }

  Ok(())
}
