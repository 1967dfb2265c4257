//! Host platform detection.
//!
//! The pipeline only cares about the host for a handful of fixups: flag
//! replacements and debug-bundle renames on macOS, and the 64-bit library
//! directory probe on Linux distributions that use `lib64`.

pub mod arch;
pub mod os;

use std::path::Path;

use arch::Arch;
use os::Os;

/// The host's architecture and OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Platform {
  pub arch: Arch,
  pub os: Os,
}

impl Platform {
  /// Detect the current platform at runtime
  ///
  /// Returns `None` if the OS or architecture is not supported
  pub fn current() -> Option<Self> {
    Some(Self {
      arch: Arch::current()?,
      os: Os::current()?,
    })
  }
}

/// Whether the host keeps 64-bit libraries in `/usr/lib64`.
pub fn has_lib64() -> bool {
  Path::new("/usr/lib64").is_dir()
}
