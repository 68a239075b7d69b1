//! Spawn planning and the injectable process-spawning seam.

use crate::supervisor::BackendLocation;

use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::{Child, Command};
use tracing::{debug, info};

/// Interpreter binary names tried against the launcher script, in order.
/// The well-known absolute path comes first so a system install wins over
/// whatever shadows the bare name on PATH.
const INTERPRETERS_UNIX: &[&str] = &["/usr/bin/python3", "python3", "python"];
const INTERPRETERS_WINDOWS: &[&str] = &["python", "python3", "py"];

/// One (program, arguments, working directory) tuple tried when starting
/// the backend. Attempts are tried in a fixed fallback order and never
/// persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnAttempt {
    pub program: PathBuf,
    pub args: Vec<PathBuf>,
    pub cwd: Option<PathBuf>,
    pub kind: AttemptKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptKind {
    /// Self-contained backend executable, run directly with no arguments
    NativeExecutable,
    /// Interpreter running the launcher script
    Interpreter,
}

impl SpawnAttempt {
    pub fn describe(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().map(|a| a.display().to_string()));
        parts.join(" ")
    }
}

/// Seam for creating the backend process, so tests can substitute fakes.
pub trait ProcessSpawner: Send + Sync {
    fn spawn(&self, attempt: &SpawnAttempt) -> std::io::Result<Child>;
}

/// Default spawner backed by `tokio::process`.
///
/// Stdio is piped, not inherited, so the supervisor can watch the
/// backend's output for readiness markers.
pub struct TokioSpawner;

impl ProcessSpawner for TokioSpawner {
    fn spawn(&self, attempt: &SpawnAttempt) -> std::io::Result<Child> {
        let mut cmd = Command::new(&attempt.program);
        cmd.args(&attempt.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(cwd) = &attempt.cwd {
            cmd.current_dir(cwd);
        }

        cmd.spawn()
    }
}

pub(crate) fn interpreter_names(windows: bool) -> &'static [&'static str] {
    if windows {
        INTERPRETERS_WINDOWS
    } else {
        INTERPRETERS_UNIX
    }
}

/// Build the ordered fallback plan for one start attempt: the native
/// executable first (when present and runnable on this platform), then
/// each interpreter name against the launcher script.
pub(crate) fn build_attempts(location: &BackendLocation, windows: bool) -> Vec<SpawnAttempt> {
    let mut attempts = Vec::new();

    if let Some(exe) = location
        .executable_candidates
        .iter()
        .find(|path| path.is_file())
    {
        // A cross-compiled extension-less artifact cannot run on Windows.
        if windows && exe.extension().is_none() {
            info!(
                "skipping native backend {} (cross-compiled artifact)",
                exe.display()
            );
        } else {
            attempts.push(SpawnAttempt {
                program: exe.clone(),
                args: Vec::new(),
                cwd: None,
                kind: AttemptKind::NativeExecutable,
            });
        }
    } else {
        debug!(
            "no native backend executable under {}",
            location.backend_dir.display()
        );
    }

    let script_dir = location.launcher_script.parent().map(PathBuf::from);
    for name in interpreter_names(windows) {
        attempts.push(SpawnAttempt {
            program: PathBuf::from(name),
            args: vec![location.launcher_script.clone()],
            cwd: script_dir.clone(),
            kind: AttemptKind::Interpreter,
        });
    }

    attempts
}

/// Make sure the native executable carries the execute bit before spawning.
///
/// Packaged application images are often mounted read-only; that exact
/// failure is silently skipped, anything else is logged and the spawn is
/// still attempted.
#[cfg(unix)]
pub(crate) fn ensure_executable(path: &std::path::Path) {
    use std::os::unix::fs::PermissionsExt;
    use tracing::warn;

    let Ok(metadata) = std::fs::metadata(path) else {
        return;
    };

    let mut permissions = metadata.permissions();
    if permissions.mode() & 0o111 != 0 {
        return;
    }

    permissions.set_mode(permissions.mode() | 0o755);
    if let Err(e) = std::fs::set_permissions(path, permissions) {
        if e.kind() == std::io::ErrorKind::ReadOnlyFilesystem {
            debug!("read-only filesystem, skipping chmod of {}", path.display());
        } else {
            warn!("could not chmod {}: {e}", path.display());
        }
    }
}
