//! The configure step.
//!
//! Platform flag fixups are applied to a copy of the build configuration;
//! definitions never see them. After configure, a fixed patch quoting
//! `EXTENSION_DIR` in `Makefile.global` is applied to every tree. It only
//! matters for one old release; elsewhere it fails quietly.

use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};

use super::types::BuildError;
use crate::config::BuildConfig;
use crate::execute::{Cmd, CommandRunner};
use crate::platform::os::Os;
use crate::settings::Settings;

/// Unified diff applied with `patch -p0` after configure.
pub const INSTALL_PATH_FIX: &str = r#"--- Makefile.global
+++ Makefile.global
@@ -1,3 +1,3 @@
 install-modules: build-modules
 	@test -d modules && \
-	$(mkinstalldirs) $(INSTALL_ROOT)$(EXTENSION_DIR)
+	$(mkinstalldirs) "$(INSTALL_ROOT)$(EXTENSION_DIR)"
"#;

/// Host facts that change the configure flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostFlags {
  pub os: Option<Os>,
  /// The host keeps 64-bit libraries in `lib64`.
  pub lib64: bool,
}

impl HostFlags {
  pub fn detect() -> Self {
    let os = Os::current();
    Self {
      os,
      lib64: os == Some(Os::Linux) && crate::platform::has_lib64(),
    }
  }
}

/// Thread-safety flag for a definition: PHP 8 renamed the option.
pub fn zts_flag(definition: &str) -> &'static str {
  let major = definition.split('.').next().and_then(|m| m.parse::<u32>().ok());
  match major {
    Some(major) if major < 8 => "--enable-maintainer-zts",
    _ => "--enable-zts",
  }
}

/// Apply host and ZTS adjustments to `config`.
pub fn apply_host_flags(config: &mut BuildConfig, definition: &str, host: HostFlags) {
  if host.os.is_some_and(|os| os.is_darwin()) {
    for flag in ["--with-png-dir", "--with-freetype-dir"] {
      if config.has_flag(flag) {
        config.replace_flag(flag, flag, Some("/usr/X11".to_string()));
      }
    }
    config.remove_flag("--with-mysql-sock");
  }

  if config.zts() {
    let flag = zts_flag(definition);
    warn!(flag, "thread safety forced on; this is a maintainer build and not meant for production");
    config.add_flag(flag, None);
  }

  if host.lib64 && !config.has_flag("--with-libdir") {
    config.add_flag("--with-libdir", Some("lib64".to_string()));
  }
}

/// Run configure (bootstrapping with buildconf if needed) in `source_dir`.
pub async fn configure(
  runner: &CommandRunner,
  config: &BuildConfig,
  settings: &Settings,
  definition: &str,
  source_dir: &Path,
  host: HostFlags,
) -> Result<(), BuildError> {
  let mut config = config.clone();
  apply_host_flags(&mut config, definition, host);

  let configure = source_dir.join("configure");
  if !configure.is_file() {
    info!(source = %source_dir.display(), "no configure script, running buildconf");
    runner
      .run(
        &Cmd::new(source_dir.join("buildconf").display().to_string())
          .arg("--force")
          .cwd(source_dir),
      )
      .await
      .map_err(BuildError::Configure)?;
  }

  let args = config.configure_args(&settings.configure_opts);
  debug!(?args, "configure arguments");
  runner
    .run(&Cmd::new(configure.display().to_string()).args(args).cwd(source_dir))
    .await
    .map_err(BuildError::Configure)?;

  if config.apxs2().is_some() {
    redirect_apxs_install(source_dir, config.prefix())?;
  }

  let fix = Cmd::tool(&settings.tools.patch)
    .args(["-p0", "--forward", "--silent", "--batch"])
    .cwd(source_dir)
    .stdin(INSTALL_PATH_FIX);
  if let Err(e) = runner.run(&fix).await {
    debug!(error = %e, "install path fix not applied");
  }

  Ok(())
}

/// Point the Makefile's Apache module install at `<prefix>/libexec`
/// instead of the system Apache module directory.
pub fn redirect_apxs_install(source_dir: &Path, prefix: &Path) -> std::io::Result<bool> {
  let makefile = source_dir.join("Makefile");
  if !makefile.is_file() {
    return Ok(false);
  }

  let libexec = prefix.join("libexec");
  let install_it = format!(
    "INSTALL_IT = $(mkinstalldirs) '{dir}' && $(INSTALL) -m 0755 libs/libphp*.so '{dir}/'",
    dir = libexec.display()
  );

  let content = fs::read_to_string(&makefile)?;
  let mut changed = false;
  let mut updated: Vec<String> = Vec::new();
  for line in content.lines() {
    if line.starts_with("INSTALL_IT =") || line.starts_with("INSTALL_IT=") {
      updated.push(install_it.clone());
      changed = true;
    } else {
      updated.push(line.to_string());
    }
  }

  if changed {
    info!(libexec = %libexec.display(), "installing Apache module into prefix");
    fs::write(&makefile, updated.join("\n") + "\n")?;
  }
  Ok(changed)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::Flag;
  use tempfile::TempDir;

  fn config_with(flags: &[&str]) -> BuildConfig {
    let mut config = BuildConfig::new("/opt/php", "/share/patches");
    for flag in flags {
      let flag = Flag::parse(flag);
      config.add_flag(flag.name, flag.value);
    }
    config
  }

  fn rendered(config: &BuildConfig) -> Vec<String> {
    config.flags().iter().map(ToString::to_string).collect()
  }

  #[test]
  fn darwin_replaces_library_dirs_and_drops_mysql_sock() {
    let mut config = config_with(&["--with-png-dir=/usr", "--with-mysql-sock=/tmp/x", "--with-zlib"]);
    apply_host_flags(
      &mut config,
      "5.6.40",
      HostFlags {
        os: Some(Os::MacOs),
        lib64: false,
      },
    );
    assert_eq!(rendered(&config), vec!["--with-zlib", "--with-png-dir=/usr/X11"]);
  }

  #[test]
  fn linux_leaves_darwin_flags_alone() {
    let mut config = config_with(&["--with-png-dir=/usr", "--with-mysql-sock=/tmp/x"]);
    apply_host_flags(
      &mut config,
      "5.6.40",
      HostFlags {
        os: Some(Os::Linux),
        lib64: false,
      },
    );
    assert_eq!(rendered(&config), vec!["--with-png-dir=/usr", "--with-mysql-sock=/tmp/x"]);
  }

  #[test]
  fn lib64_added_unless_explicit() {
    let host = HostFlags {
      os: Some(Os::Linux),
      lib64: true,
    };

    let mut config = config_with(&["--with-zlib"]);
    apply_host_flags(&mut config, "8.3.2", host);
    assert_eq!(rendered(&config), vec!["--with-zlib", "--with-libdir=lib64"]);

    let mut config = config_with(&["--with-libdir=lib"]);
    apply_host_flags(&mut config, "8.3.2", host);
    assert_eq!(rendered(&config), vec!["--with-libdir=lib"]);
  }

  #[test]
  fn zts_flag_depends_on_major_version() {
    assert_eq!(zts_flag("7.4.33"), "--enable-maintainer-zts");
    assert_eq!(zts_flag("5.3.29"), "--enable-maintainer-zts");
    assert_eq!(zts_flag("8.3.2"), "--enable-zts");
    assert_eq!(zts_flag("master"), "--enable-zts");
  }

  #[test]
  fn apxs_install_is_redirected() {
    let temp = TempDir::new().unwrap();
    std::fs::write(
      temp.path().join("Makefile"),
      "CC = cc\nINSTALL_IT = $(mkinstalldirs) '$(INSTALL_ROOT)/usr/lib/apache2/modules'\nall: php\n",
    )
    .unwrap();

    assert!(redirect_apxs_install(temp.path(), Path::new("/opt/php")).unwrap());
    let makefile = std::fs::read_to_string(temp.path().join("Makefile")).unwrap();
    assert!(makefile.contains("INSTALL_IT = $(mkinstalldirs) '/opt/php/libexec'"));
    assert!(!makefile.contains("/usr/lib/apache2/modules"));
    assert!(makefile.starts_with("CC = cc\n"));
  }

  #[test]
  fn install_path_fix_targets_makefile_global() {
    assert!(INSTALL_PATH_FIX.starts_with("--- Makefile.global\n+++ Makefile.global\n"));
  }
}
