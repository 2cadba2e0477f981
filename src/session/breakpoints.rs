//! Breakpoint bookkeeping and source mapping
//!
//! The engine addresses scripts by resource path, relative to the project
//! root (`scripts/player.lua`) or prefixed with a mapped asset directory
//! (`core/boot.lua`). Editors send absolute file paths, so every
//! setBreakpoints call first resolves the file by walking up to a marker.

use std::collections::{BTreeMap, HashMap};
use std::path::{Component, Path, PathBuf};

use serde_json::{json, Map, Value};
use walkdir::WalkDir;

use crate::common::config::BreakpointConfig;
use crate::common::strip_resource_marker;

/// Root name under which the project directory is recorded
pub const PROJECT_ROOT: &str = "<project>";

/// First breakpoint id handed out in a session
const FIRST_BREAKPOINT_ID: i64 = 1000;

/// List files below `root` whose name contains `filter`
///
/// Without `recursive` only the direct children of `root` are checked.
/// Unreadable entries are skipped.
pub fn find_files(root: &Path, filter: &str, recursive: bool) -> Vec<PathBuf> {
    let mut walker = WalkDir::new(root).min_depth(1).sort_by_file_name();
    if !recursive {
        walker = walker.max_depth(1);
    }

    walker
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| !entry.file_type().is_dir())
        .filter(|entry| entry.file_name().to_string_lossy().contains(filter))
        .map(walkdir::DirEntry::into_path)
        .collect()
}

/// Forward-slash rendering of a relative path
fn to_resource(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// A file mapped into the engine's resource namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    pub resource_path: String,
    /// Root name, [`PROJECT_ROOT`] or a map name
    pub root_name: String,
    /// Directory the resource path is relative to
    pub root: PathBuf,
}

/// Resolves editor files to engine resource paths
#[derive(Debug, Clone)]
pub struct SourceResolver {
    project_marker_suffix: String,
    asset_root_marker: String,
}

impl SourceResolver {
    pub fn new(config: &BreakpointConfig) -> Self {
        Self {
            project_marker_suffix: config.project_marker_suffix.clone(),
            asset_root_marker: config.asset_root_marker.clone(),
        }
    }

    /// Walk parent directories of `file` until a project or asset-root marker
    pub fn resolve(&self, file: &Path) -> Option<ResolvedSource> {
        for dir in file.ancestors().skip(1) {
            if dir.as_os_str().is_empty() {
                break;
            }

            if !find_files(dir, &self.project_marker_suffix, false).is_empty() {
                let relative = file.strip_prefix(dir).ok()?;
                return Some(ResolvedSource {
                    resource_path: to_resource(relative),
                    root_name: PROJECT_ROOT.to_string(),
                    root: dir.to_path_buf(),
                });
            }

            if dir.join(&self.asset_root_marker).is_file() {
                let map_name = dir.file_name()?.to_string_lossy().into_owned();
                let relative = file.strip_prefix(dir).ok()?;
                return Some(ResolvedSource {
                    resource_path: format!("{}/{}", map_name, to_resource(relative)),
                    root_name: map_name,
                    root: dir.parent()?.to_path_buf(),
                });
            }
        }
        None
    }
}

/// Directories resource paths were resolved against
#[derive(Debug, Clone, Default)]
pub struct SourceRoots {
    roots: HashMap<String, PathBuf>,
}

impl SourceRoots {
    pub fn record(&mut self, name: impl Into<String>, root: PathBuf) {
        self.roots.insert(name.into(), root);
    }

    pub fn get(&self, name: &str) -> Option<&Path> {
        self.roots.get(name).map(PathBuf::as_path)
    }

    /// Local file for an engine source
    ///
    /// Mapped sources (`@map/file.lua`) that do not exist under the project
    /// root are looked up under the root recorded for their map.
    pub fn file_for(&self, source: &str) -> PathBuf {
        let mapped = source.starts_with('@');
        let resource = strip_resource_marker(source);

        let file = match self.get(PROJECT_ROOT) {
            Some(project) => project.join(resource),
            None => PathBuf::from(resource),
        };
        if !mapped || file.exists() {
            return file;
        }

        resource
            .split('/')
            .next()
            .and_then(|map| self.get(map))
            .map(|root| root.join(resource))
            .unwrap_or(file)
    }
}

/// A breakpoint as reported to the editor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    pub id: i64,
    pub line: i64,
    pub verified: bool,
    pub source_path: PathBuf,
    pub resource_path: String,
    pub message: Option<String>,
}

/// Outcome of matching an engine halt against known breakpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HaltMatch {
    /// A breakpoint at that exact line; now verified
    Verified(Breakpoint),
    /// Known source, no breakpoint on that line
    UnknownLine,
    /// No breakpoints tracked for that source
    UnknownSource,
}

/// Per-source breakpoint sets for the whole session
#[derive(Debug)]
pub struct BreakpointStore {
    resolver: SourceResolver,
    roots: SourceRoots,
    next_id: i64,
    /// Keyed by resource path; unresolvable sources keep an empty set
    sources: BTreeMap<String, Vec<Breakpoint>>,
}

impl BreakpointStore {
    pub fn new(config: &BreakpointConfig) -> Self {
        Self {
            resolver: SourceResolver::new(config),
            roots: SourceRoots::default(),
            next_id: FIRST_BREAKPOINT_ID,
            sources: BTreeMap::new(),
        }
    }

    pub fn roots(&self) -> &SourceRoots {
        &self.roots
    }

    /// Replace the breakpoints of one file
    ///
    /// Every returned breakpoint starts unverified. Files outside any
    /// project are accepted, but nothing is forwarded to the engine for them.
    pub fn set_breakpoints(&mut self, file: &Path, lines: &[i64]) -> Vec<Breakpoint> {
        let resolved = self.resolver.resolve(file);

        let (resource_path, message) = match &resolved {
            Some(source) => {
                self.roots.record(source.root_name.clone(), source.root.clone());
                (source.resource_path.clone(), None)
            }
            None => {
                tracing::debug!(file = %file.display(), "Breakpoint source outside any project");
                (
                    file.to_string_lossy().replace('\\', "/"),
                    Some("Script is not part of a project".to_string()),
                )
            }
        };

        let breakpoints: Vec<Breakpoint> = lines
            .iter()
            .map(|&line| {
                let id = self.next_id;
                self.next_id += 1;
                Breakpoint {
                    id,
                    line,
                    verified: false,
                    source_path: file.to_path_buf(),
                    resource_path: resource_path.clone(),
                    message: message.clone(),
                }
            })
            .collect();

        let stored = if resolved.is_some() {
            breakpoints.clone()
        } else {
            Vec::new()
        };
        self.sources.insert(resource_path, stored);
        breakpoints
    }

    /// Line sets of every source with breakpoints, as the engine expects them
    pub fn engine_snapshot(&self) -> Value {
        let breakpoints: Map<String, Value> = self
            .sources
            .iter()
            .filter(|(_, set)| !set.is_empty())
            .map(|(path, set)| {
                let lines: Vec<i64> = set.iter().map(|bp| bp.line).collect();
                (path.clone(), json!(lines))
            })
            .collect();
        json!({ "breakpoints": breakpoints })
    }

    /// Match an engine halt, verifying the breakpoint it hit
    pub fn verify_halt(&mut self, source: &str, line: i64) -> HaltMatch {
        let resource = strip_resource_marker(source);
        let Some(set) = self.sources.get_mut(resource) else {
            return HaltMatch::UnknownSource;
        };

        match set.iter_mut().find(|bp| bp.line == line) {
            Some(bp) => {
                bp.verified = true;
                HaltMatch::Verified(bp.clone())
            }
            None => HaltMatch::UnknownLine,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sources.values().all(Vec::is_empty)
    }
}
