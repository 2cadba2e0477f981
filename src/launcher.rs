//! Engine process launching
//!
//! A launch request starts the engine from a toolchain in
//! `--wait-for-debugger` mode; the session then attaches to its console
//! port like it would for an attach request.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::Deserialize;
use tokio::process::{Child, Command};

use crate::common::{Error, Result};
use crate::engine::Endpoint;

/// Console port the engine listens on unless told otherwise
pub const DEFAULT_ENGINE_PORT: u16 = 14000;

/// Engine executable, relative to the toolchain directory
const ENGINE_EXECUTABLE: [&str; 4] = ["engine", "win64", "dev", "stingray_win64_dev.exe"];

/// Platform the project data is compiled for
const DATA_PLATFORM: &str = "win32";

/// What to launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub toolchain: PathBuf,
    pub project_file: PathBuf,
    pub command_line_args: Vec<String>,
}

/// A started engine
#[derive(Debug)]
pub struct EngineProcess {
    pub endpoint: Endpoint,
    pub command_line: String,
    child: Option<Child>,
}

impl EngineProcess {
    pub fn new(endpoint: Endpoint, command_line: String, child: Option<Child>) -> Self {
        Self {
            endpoint,
            command_line,
            child,
        }
    }

    /// Stop the engine if it is still running
    pub async fn kill(&mut self) {
        if let Some(child) = self.child.as_mut() {
            if let Err(e) = child.kill().await {
                tracing::warn!(error = %e, "Failed to kill engine process");
            }
        }
        self.child = None;
    }
}

/// Starts engine processes for launch requests
pub trait Launcher: Send + Sync {
    fn launch(&self, request: &LaunchRequest) -> Result<EngineProcess>;
}

/// Launches the engine executable shipped with a toolchain
#[derive(Debug, Clone)]
pub struct ToolchainLauncher {
    ip: String,
    port: u16,
}

impl Default for ToolchainLauncher {
    fn default() -> Self {
        Self {
            ip: "127.0.0.1".to_string(),
            port: DEFAULT_ENGINE_PORT,
        }
    }
}

impl ToolchainLauncher {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
        }
    }

    /// Full engine argument list for a request
    pub fn arguments(&self, request: &LaunchRequest) -> Result<Vec<String>> {
        let data_dir = data_directory(&request.project_file)?;
        let mut args = vec![
            "--data-dir".to_string(),
            data_dir.display().to_string(),
            "--wait-for-debugger".to_string(),
            "--port".to_string(),
            self.port.to_string(),
        ];
        args.extend(request.command_line_args.iter().cloned());
        Ok(args)
    }
}

impl Launcher for ToolchainLauncher {
    fn launch(&self, request: &LaunchRequest) -> Result<EngineProcess> {
        if !request.toolchain.is_dir() {
            return Err(Error::LaunchFailed(format!(
                "Invalid {} toolchain folder path",
                request.toolchain.display()
            )));
        }

        let executable = ENGINE_EXECUTABLE
            .iter()
            .fold(request.toolchain.clone(), |path, part| path.join(part));
        if !executable.is_file() {
            return Err(Error::LaunchFailed(format!(
                "Invalid engine executable path {}",
                executable.display()
            )));
        }

        let args = self.arguments(request)?;
        let command_line = format!("\"{}\" {}", executable.display(), args.join(" "));
        tracing::info!(%command_line, "Launching engine");

        let child = Command::new(&executable)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(false)
            .spawn()
            .map_err(|e| {
                Error::LaunchFailed(format!("Failed to start {}: {}", executable.display(), e))
            })?;

        Ok(EngineProcess::new(
            Endpoint::new(self.ip.clone(), self.port),
            command_line,
            Some(child),
        ))
    }
}

/// Settings read from a project file
///
/// Project files are simplified JSON; every other setting is ignored.
#[derive(Debug, Default, Deserialize)]
struct ProjectSettings {
    #[serde(default)]
    data_directory: Option<String>,
}

impl ProjectSettings {
    fn parse(content: &str) -> Result<Self> {
        serde_sjson::from_str(content)
            .map_err(|e| Error::LaunchFailed(format!("Invalid project settings: {}", e)))
    }
}

/// Compiled data directory of a project
///
/// Uses the project's `data_directory` setting when present, otherwise the
/// `<project>_data` sibling of the project folder, with the platform appended.
pub fn data_directory(project_file: &Path) -> Result<PathBuf> {
    let content = std::fs::read_to_string(project_file).map_err(|e| {
        Error::LaunchFailed(format!("Invalid {} project path: {}", project_file.display(), e))
    })?;
    let settings = ProjectSettings::parse(&content)?;

    let project_dir = project_file.parent().unwrap_or_else(|| Path::new("."));
    let base = match settings.data_directory.filter(|dir| !dir.is_empty()) {
        Some(dir) if Path::new(&dir).is_absolute() && Path::new(&dir).exists() => PathBuf::from(dir),
        Some(dir) => project_dir.join(dir),
        None => {
            let name = project_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            project_dir.join("..").join(format!("{}_data", name))
        }
    };

    Ok(base.join(DATA_PLATFORM))
}
