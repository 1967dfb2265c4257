//! phpbuild-lib: core types and logic for php-build
//!
//! This crate provides everything needed to build a PHP release into an
//! isolated prefix:
//! - `definition`: locating and listing build definitions
//! - `config`: the mutable `BuildConfig` that definitions and plugins edit
//! - `lua`: the scripting runtime definitions and plugins run in
//! - `plugin`: the typed plugin registry and loader
//! - `transport` / `archive` / `download`: fetching and unpacking sources
//! - `pipeline`: the fail-fast build pipeline with cleanup on failure
//! - `extension`: installing PECL-style extensions into a built prefix

pub mod archive;
pub mod config;
pub mod consts;
pub mod definition;
pub mod download;
pub mod execute;
pub mod extension;
pub mod lua;
pub mod pipeline;
pub mod platform;
pub mod plugin;
pub mod settings;
pub mod transport;

#[cfg(test)]
pub(crate) mod util;
