//! Common utilities shared by the adapter components

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

pub use error::{Error, Result};

/// Strip the mapped-resource marker the engine puts in front of script sources
///
/// `@scripts/player.lua` and `scripts/player.lua` name the same resource.
pub fn strip_resource_marker(source: &str) -> &str {
    source.strip_prefix('@').unwrap_or(source)
}
