//! HTTP transport over whichever download tool the host provides.
//!
//! php-build never speaks HTTP itself. It drives `curl` or `wget`, picked by
//! what is on `PATH` when the run starts, behind the [`Transport`] trait so
//! the download logic can be exercised against an in-memory fake.
//!
//! `head` only exists to sniff a `Content-Disposition` filename; when the
//! probe fails or carries no filename, the URL's last path segment is used.

mod curl;
mod wget;

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Output;

use thiserror::Error;
use tracing::debug;

pub use curl::Curl;
pub use wget::Wget;

/// Response headers, keyed by lowercase header name.
pub type Headers = BTreeMap<String, String>;

/// Errors that can occur while talking to a remote server.
#[derive(Debug, Error)]
pub enum TransportError {
  /// Neither curl nor wget could be found.
  #[error("no download tool available: install curl or wget")]
  NoBackend,

  /// The backend exited with a non-zero status. `stderr` holds whatever
  /// the tool printed about it.
  #[error("{backend} failed for {url} with exit code {code:?}: {stderr}")]
  Failed {
    backend: &'static str,
    url: String,
    code: Option<i32>,
    stderr: String,
  },

  /// I/O error while spawning the backend.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

impl TransportError {
  fn from_output(backend: &'static str, url: &str, output: &Output) -> Self {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    Self::Failed {
      backend,
      url: url.to_string(),
      code: output.status.code(),
      stderr: if stderr.is_empty() { "no output".to_string() } else { stderr },
    }
  }
}

/// A way to issue HEAD and GET requests.
#[allow(async_fn_in_trait)]
pub trait Transport {
  /// Short backend name for logging.
  fn name(&self) -> &'static str;

  /// Fetch the response headers for `url`.
  async fn head(&self, url: &str) -> Result<Headers, TransportError>;

  /// Download `url` into `dest`, overwriting it.
  async fn get(&self, url: &str, dest: &Path) -> Result<(), TransportError>;
}

/// The download tool picked for this run.
#[derive(Debug, Clone)]
pub enum HttpBackend {
  Curl(Curl),
  Wget(Wget),
  /// No tool was found; every request fails with [`TransportError::NoBackend`].
  Unavailable,
}

impl HttpBackend {
  /// Pick curl if it is on `PATH`, then wget.
  pub fn detect() -> Self {
    if let Ok(path) = which::which("curl") {
      debug!(path = %path.display(), "using curl for downloads");
      return Self::Curl(Curl::new(path));
    }
    if let Ok(path) = which::which("wget") {
      debug!(path = %path.display(), "using wget for downloads");
      return Self::Wget(Wget::new(path));
    }
    Self::Unavailable
  }
}

impl Transport for HttpBackend {
  fn name(&self) -> &'static str {
    match self {
      Self::Curl(curl) => curl.name(),
      Self::Wget(wget) => wget.name(),
      Self::Unavailable => "none",
    }
  }

  async fn head(&self, url: &str) -> Result<Headers, TransportError> {
    match self {
      Self::Curl(curl) => curl.head(url).await,
      Self::Wget(wget) => wget.head(url).await,
      Self::Unavailable => Err(TransportError::NoBackend),
    }
  }

  async fn get(&self, url: &str, dest: &Path) -> Result<(), TransportError> {
    match self {
      Self::Curl(curl) => curl.get(url, dest).await,
      Self::Wget(wget) => wget.get(url, dest).await,
      Self::Unavailable => Err(TransportError::NoBackend),
    }
  }
}

/// Work out the filename a download should be cached under.
///
/// Prefers the server's `Content-Disposition` filename and falls back to the
/// URL when the probe fails or names nothing.
pub async fn remote_filename<T: Transport>(transport: &T, url: &str) -> String {
  match transport.head(url).await {
    Ok(headers) => {
      if let Some(name) = headers
        .get("content-disposition")
        .and_then(|value| content_disposition_filename(value))
      {
        debug!(url, filename = %name, "using Content-Disposition filename");
        return name;
      }
    }
    Err(e) => debug!(url, error = %e, "HEAD probe failed, using URL filename"),
  }
  url_to_filename(url)
}

/// Parse raw header lines as printed by curl/wget.
///
/// Status lines are skipped. When redirects produce several header blocks,
/// later values win so the final response is what remains.
pub fn parse_headers(text: &str) -> Headers {
  let mut headers = Headers::new();
  for line in text.lines() {
    let line = line.trim();
    if line.is_empty() || line.starts_with("HTTP/") {
      continue;
    }
    if let Some((name, value)) = line.split_once(':') {
      headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
    }
  }
  headers
}

/// Extract the filename from a `Content-Disposition` value.
///
/// Handles `filename="x"`, bare `filename=x` and the RFC 5987
/// `filename*=UTF-8''x` form. Directory parts are dropped.
pub fn content_disposition_filename(value: &str) -> Option<String> {
  let mut plain = None;
  let mut extended = None;

  for param in value.split(';').map(str::trim) {
    let Some((key, raw)) = param.split_once('=') else {
      continue;
    };
    let raw = raw.trim().trim_matches('"');
    match key.trim().to_ascii_lowercase().as_str() {
      "filename*" => extended = raw.rsplit("''").next().map(str::to_string),
      "filename" => plain = Some(raw.to_string()),
      _ => {}
    }
  }

  extended
    .or(plain)
    .and_then(|name| name.rsplit(['/', '\\']).next().map(str::to_string))
    .filter(|name| !name.is_empty() && name != "." && name != "..")
}

/// Convert a URL to a safe filename.
///
/// Takes the last path component, drops any query string and replaces
/// anything outside `[A-Za-z0-9._-]`.
pub fn url_to_filename(url: &str) -> String {
  let path = url.split(['?', '#']).next().unwrap_or(url);
  let last = path.trim_end_matches('/').rsplit('/').next().unwrap_or(path);

  let sanitized: String = last
    .chars()
    .map(|c| {
      if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
        c
      } else {
        '_'
      }
    })
    .collect();

  if sanitized.is_empty() || sanitized == "." || sanitized == ".." {
    "download".to_string()
  } else {
    sanitized
  }
}
