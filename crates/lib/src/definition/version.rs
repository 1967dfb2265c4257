//! Version-aware ordering of definition names.
//!
//! Definition names are PHP versions (`5.3.29`, `8.4.0RC1`, `7.4snapshot`).
//! Each dot-separated piece is split into its leading number and any letter
//! suffix, so `5.10.0` sorts after `5.9.0` and `8.4.0` before `8.4.0RC1`.

use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Part {
  Num(u64),
  Text(String),
}

/// Sort key for a definition name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct VersionKey(Vec<Part>);

impl VersionKey {
  pub fn new(name: &str) -> Self {
    let mut parts = Vec::new();
    for piece in name.split('.') {
      let digits = piece.len() - piece.trim_start_matches(|c: char| c.is_ascii_digit()).len();
      let (number, suffix) = piece.split_at(digits);

      match number.parse::<u64>() {
        Ok(n) => {
          parts.push(Part::Num(n));
          if !suffix.is_empty() {
            parts.push(Part::Text(suffix.to_string()));
          }
        }
        Err(_) if !piece.is_empty() => parts.push(Part::Text(piece.to_string())),
        Err(_) => {}
      }
    }
    Self(parts)
  }
}

/// Compare two definition names by version.
pub fn compare(a: &str, b: &str) -> Ordering {
  VersionKey::new(a).cmp(&VersionKey::new(b)).then_with(|| a.cmp(b))
}

/// Sort definition names in place by version.
pub fn sort(names: &mut [String]) {
  names.sort_by(|a, b| compare(a, b));
}
