//! The builtin extension installer.
//!
//! phpize, configure against the prefix's `php-config`, make, make install,
//! then drop an ini file into `etc/conf.d/` so the extension is loaded.

use std::path::{Path, PathBuf};

use tracing::info;

use super::{Catalog, CatalogEntry, ExtensionError, ExtensionInstaller};
use crate::config::Package;
use crate::download::download_package;
use crate::execute::{Cmd, CommandRunner};
use crate::settings::Settings;
use crate::transport::Transport;

pub struct PeclInstaller<'a, T: Transport> {
  transport: &'a T,
  runner: &'a CommandRunner,
  catalog: Catalog,
  prefix: PathBuf,
  packages_dir: PathBuf,
  source_root: PathBuf,
  make: String,
  git: String,
}

impl<'a, T: Transport> PeclInstaller<'a, T> {
  pub fn new(transport: &'a T, runner: &'a CommandRunner, catalog: Catalog, prefix: &Path, settings: &Settings) -> Self {
    Self {
      transport,
      runner,
      catalog,
      prefix: prefix.to_path_buf(),
      packages_dir: settings.packages_dir(),
      source_root: settings.extension_source_root(),
      make: settings.tools.make.clone(),
      git: settings.tools.git.clone(),
    }
  }

  fn entry(&self, name: &str) -> CatalogEntry {
    self.catalog.get(name).cloned().unwrap_or_default()
  }

  async fn build(&self, name: &str, checkout: &Path, entry: &CatalogEntry) -> Result<(), ExtensionError> {
    let dir = match &entry.source_dir {
      Some(sub) => checkout.join(sub),
      None => checkout.to_path_buf(),
    };
    let bin = self.prefix.join("bin");

    self.runner.log().section(&format!("Extension {}", name))?;
    self
      .runner
      .run(&Cmd::new(bin.join("phpize").display().to_string()).cwd(&dir))
      .await?;
    self
      .runner
      .run(
        &Cmd::new(dir.join("configure").display().to_string())
          .arg(format!("--with-php-config={}", bin.join("php-config").display()))
          .args(entry.configure_args.iter().cloned())
          .cwd(&dir),
      )
      .await?;
    self.runner.run(&Cmd::tool(&self.make).cwd(&dir)).await?;
    self.runner.run(&Cmd::tool(&self.make).arg("install").cwd(&dir)).await?;

    let ini = write_extension_ini(&self.prefix, name, entry.zend_extension)?;
    info!(extension = name, ini = %ini.display(), "extension installed");
    Ok(())
  }
}

impl<T: Transport> ExtensionInstaller for PeclInstaller<'_, T> {
  async fn install_extension(&self, name: &str, version: &str) -> Result<(), ExtensionError> {
    let entry = self.entry(name);
    let package = Package {
      urls: vec![self.catalog.dist_url(name, version)],
      kind: None,
    };
    let source_dir = self.source_root.join(format!("{}-{}", name, version));

    download_package(self.transport, &package, &self.packages_dir, &source_dir).await?;
    self.build(name, &source_dir, &entry).await
  }

  async fn install_extension_source(&self, name: &str, revision: &str) -> Result<(), ExtensionError> {
    let entry = self.entry(name);
    let url = entry
      .source_url
      .clone()
      .ok_or_else(|| ExtensionError::UnknownSource(name.to_string()))?;
    let checkout = self.source_root.join(format!("{}-{}", name, revision));

    if !checkout.is_dir() {
      tokio::fs::create_dir_all(&self.source_root).await?;
      self
        .runner
        .run(
          &Cmd::tool(&self.git)
            .arg("clone")
            .arg(&url)
            .arg(checkout.display().to_string()),
        )
        .await?;
    }
    self
      .runner
      .run(&Cmd::tool(&self.git).args(["checkout", revision]).cwd(&checkout))
      .await?;

    self.build(name, &checkout, &entry).await
  }
}

/// Write `<prefix>/etc/conf.d/<name>.ini` enabling the extension.
pub fn write_extension_ini(prefix: &Path, name: &str, zend: bool) -> std::io::Result<PathBuf> {
  let conf_d = prefix.join("etc").join("conf.d");
  std::fs::create_dir_all(&conf_d)?;

  let directive = if zend { "zend_extension" } else { "extension" };
  let path = conf_d.join(format!("{}.ini", name));
  std::fs::write(&path, format!("{}={}.so\n", directive, name))?;
  Ok(path)
}
