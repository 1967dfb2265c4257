//! Post-install fixups: binary names, php.ini, `extension_dir`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::consts::DEFAULT_INI_ENV;

const DSYM_SUFFIX: &str = ".dSYM";
const EXTENSION_DIR_LINE: &str = "extension_dir = \"./\"";

/// Rename `bin/*.dSYM` to the plain binary name. macOS only.
pub fn fixup_binaries(bin_dir: &Path, darwin: bool) -> io::Result<Vec<PathBuf>> {
  if !darwin || !bin_dir.is_dir() {
    return Ok(Vec::new());
  }

  let mut renamed = Vec::new();
  for entry in fs::read_dir(bin_dir)? {
    let path = entry?.path();
    let name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    if let Some(stripped) = name.strip_suffix(DSYM_SUFFIX) {
      let target = bin_dir.join(stripped);
      info!(from = %path.display(), to = %target.display(), "renaming binary");
      fs::rename(&path, &target)?;
      renamed.push(target);
    }
  }
  Ok(renamed)
}

/// Find the php.ini template for `variant` in the source tree.
///
/// `variant` is a path to an existing file or an environment name looked up
/// as `php.ini-<env>`. Older releases ship `php.ini-dist` and
/// `php.ini-recommended` instead of `-development` and `-production`.
pub fn resolve_ini(source_dir: &Path, variant: Option<&str>) -> Option<PathBuf> {
  if let Some(path) = variant.map(Path::new).filter(|p| p.is_file()) {
    return Some(path.to_path_buf());
  }

  let env = variant.unwrap_or(DEFAULT_INI_ENV);
  let mut candidates = vec![source_dir.join(format!("php.ini-{}", env))];
  match env {
    "development" => candidates.push(source_dir.join("php.ini-dist")),
    "production" => candidates.push(source_dir.join("php.ini-recommended")),
    _ => {}
  }
  candidates.into_iter().find(|c| c.is_file())
}

/// Install php.ini into `<prefix>/etc` and make sure `etc/conf.d` exists.
///
/// An existing `etc/php.ini` is left alone. Returns the installed path, or
/// `None` when no template was found.
pub fn write_ini(source_dir: &Path, prefix: &Path, variant: Option<&str>) -> io::Result<Option<PathBuf>> {
  let etc = prefix.join("etc");
  fs::create_dir_all(etc.join("conf.d"))?;

  let dest = etc.join("php.ini");
  if dest.is_file() {
    info!(ini = %dest.display(), "keeping existing php.ini");
    return Ok(Some(dest));
  }

  match resolve_ini(source_dir, variant) {
    Some(template) => {
      info!(template = %template.display(), ini = %dest.display(), "installing php.ini");
      fs::copy(&template, &dest)?;
      Ok(Some(dest))
    }
    None => {
      warn!(variant = variant.unwrap_or(DEFAULT_INI_ENV), "no php.ini template found");
      Ok(None)
    }
  }
}

/// Comment out `extension_dir = "./"`, which breaks extension loading in
/// older releases. Returns whether the file changed.
pub fn comment_extension_dir(ini: &Path) -> io::Result<bool> {
  let content = fs::read_to_string(ini)?;
  if !content.lines().any(|l| l.trim() == EXTENSION_DIR_LINE) {
    return Ok(false);
  }

  let mut updated: String = content
    .lines()
    .map(|line| {
      if line.trim() == EXTENSION_DIR_LINE {
        format!("; {}", line.trim())
      } else {
        line.to_string()
      }
    })
    .collect::<Vec<_>>()
    .join("\n");
  if content.ends_with('\n') {
    updated.push('\n');
  }

  fs::write(ini, updated)?;
  Ok(true)
}
