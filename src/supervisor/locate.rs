//! Backend location resolution across development and packaged layouts.

use crate::supervisor::config;

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Directory that must exist under a candidate base for it to be selected.
pub const BACKEND_DIR: &str = "backend";
/// Subdirectory holding the self-contained backend build.
const DIST_DIR: &str = "dist";
/// Artifact name of the self-contained backend executable.
const EXECUTABLE_STEM: &str = "coach-backend";
/// Interpreter-run bootstrap that installs the backend's runtime
/// dependencies before invoking its entry point.
const LAUNCHER_SCRIPT: &str = "launcher.py";

/// Resolved filesystem paths to try when starting the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendLocation {
    pub backend_dir: PathBuf,
    /// Native executable candidates, most preferred first
    pub executable_candidates: Vec<PathBuf>,
    /// Launcher script one directory above the executable, for the
    /// interpreter fallback
    pub launcher_script: PathBuf,
}

/// Resolves where the backend lives on disk.
///
/// A pure function of filesystem state at call time; nothing is cached,
/// so repeated calls re-probe the candidate directories.
pub struct LocationResolver {
    dev_mode: bool,
    candidates: Vec<PathBuf>,
}

impl LocationResolver {
    /// Create a resolver with the standard candidate base directories.
    ///
    /// Search order in packaged mode:
    /// 1. Packaged-resource directory (from the environment, if set)
    /// 2. Directory containing the running executable
    /// 3. Parent of that directory
    /// 4. Current working directory
    pub fn new(dev_mode: bool) -> Self {
        Self {
            dev_mode,
            candidates: Self::default_candidates(),
        }
    }

    /// Create a resolver probing an explicit base-directory list.
    pub fn with_candidates(dev_mode: bool, candidates: Vec<PathBuf>) -> Self {
        Self {
            dev_mode,
            candidates,
        }
    }

    fn default_candidates() -> Vec<PathBuf> {
        let mut dirs = Vec::new();

        if let Ok(resource_dir) = std::env::var(config::ENV_RESOURCE_DIR) {
            dirs.push(PathBuf::from(resource_dir));
        }

        if let Some(exe_dir) = current_exe_dir() {
            if let Some(parent) = exe_dir.parent() {
                dirs.push(exe_dir.clone());
                dirs.push(parent.to_path_buf());
            } else {
                dirs.push(exe_dir);
            }
        }

        if let Ok(cwd) = std::env::current_dir() {
            dirs.push(cwd);
        }

        dirs
    }

    /// Resolve the backend's location.
    ///
    /// Development mode uses the project's own layout under the current
    /// directory; packaged mode scans the candidate list and falls back
    /// to the executable's directory when nothing matches.
    pub fn resolve(&self) -> BackendLocation {
        let base = if self.dev_mode {
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        } else {
            self.select_base()
        };

        let backend_dir = base.join(BACKEND_DIR);
        let dist_dir = backend_dir.join(DIST_DIR);

        BackendLocation {
            executable_candidates: executable_candidates(&dist_dir, cfg!(windows)),
            launcher_script: backend_dir.join(LAUNCHER_SCRIPT),
            backend_dir,
        }
    }

    /// First candidate containing a `backend/` subdirectory wins.
    fn select_base(&self) -> PathBuf {
        for dir in &self.candidates {
            if dir.join(BACKEND_DIR).is_dir() {
                debug!("backend base directory: {}", dir.display());
                return dir.clone();
            }
        }

        let fallback = current_exe_dir().unwrap_or_else(|| PathBuf::from("."));
        warn!(
            "no candidate directory contains a {BACKEND_DIR}/ subdirectory, \
             falling back to {}",
            fallback.display()
        );
        fallback
    }
}

/// Native executable candidates for the given dist directory.
///
/// Windows prefers the `.exe`-suffixed artifact but also lists the
/// extension-less one (produced when the backend was bundled on another
/// OS); other platforms only ever have the extension-less artifact.
pub fn executable_candidates(dist_dir: &Path, windows: bool) -> Vec<PathBuf> {
    if windows {
        vec![
            dist_dir.join(format!("{EXECUTABLE_STEM}.exe")),
            dist_dir.join(EXECUTABLE_STEM),
        ]
    } else {
        vec![dist_dir.join(EXECUTABLE_STEM)]
    }
}

fn current_exe_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}
