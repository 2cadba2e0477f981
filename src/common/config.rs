//! Configuration file handling

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::paths::config_path;
use super::Result;

/// Main configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Engine endpoint settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Breakpoint placement settings
    #[serde(default)]
    pub breakpoints: BreakpointConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Engine endpoint settings
#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    /// Address used when an attach request carries no `ip`
    #[serde(default = "default_ip")]
    pub ip: String,

    /// Console port used when an attach request carries no `port`
    #[serde(default = "default_port")]
    pub port: u16,

    /// Delay between launching the engine and connecting to it
    #[serde(default = "default_launch_connect_delay")]
    pub launch_connect_delay_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ip: default_ip(),
            port: default_port(),
            launch_connect_delay_ms: default_launch_connect_delay(),
        }
    }
}

fn default_ip() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    14000
}
fn default_launch_connect_delay() -> u64 {
    1000
}

/// Timeout settings in milliseconds
#[derive(Debug, Deserialize, Clone)]
pub struct Timeouts {
    /// Bound on a remote snippet evaluation
    #[serde(default = "default_snippet_evaluation")]
    pub snippet_evaluation_ms: u64,

    /// Bound on other correlated engine requests; unbounded when absent
    #[serde(default)]
    pub request_ms: Option<u64>,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            snippet_evaluation_ms: default_snippet_evaluation(),
            request_ms: None,
        }
    }
}

fn default_snippet_evaluation() -> u64 {
    3000
}

impl Timeouts {
    pub fn snippet_evaluation(&self) -> Duration {
        Duration::from_millis(self.snippet_evaluation_ms)
    }

    pub fn request(&self) -> Option<Duration> {
        self.request_ms.map(Duration::from_millis)
    }
}

/// What to do when the engine halts somewhere no breakpoint is tracked
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum UnknownHaltPolicy {
    /// Leave the engine alone and report the stop as usual
    #[default]
    Ignore,
    /// Clear every engine breakpoint and resume execution
    ResetAndContinue,
}

/// Breakpoint placement settings
#[derive(Debug, Deserialize, Clone)]
pub struct BreakpointConfig {
    /// File name suffix identifying a project root directory
    #[serde(default = "default_project_marker")]
    pub project_marker_suffix: String,

    /// File name marking a mapped asset root directory
    #[serde(default = "default_asset_root_marker")]
    pub asset_root_marker: String,

    #[serde(default)]
    pub unknown_halt_policy: UnknownHaltPolicy,
}

impl Default for BreakpointConfig {
    fn default() -> Self {
        Self {
            project_marker_suffix: default_project_marker(),
            asset_root_marker: default_asset_root_marker(),
            unknown_halt_policy: UnknownHaltPolicy::default(),
        }
    }
}

fn default_project_marker() -> String {
    ".stingray_project".to_string()
}
fn default_asset_root_marker() -> String {
    ".stingray-asset-server-directory".to_string()
}

/// Logging settings
#[derive(Debug, Deserialize, Default, Clone)]
pub struct LoggingConfig {
    /// Also write logs to this file
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        match config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| super::Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| super::Error::ConfigParse(e.to_string()))
    }
}
