//! Shared fakes and fixtures for supervisor tests.

use crate::supervisor::{
    HealthProbe, LocationResolver, ProcessSpawner, ShellConfig, SpawnAttempt, Supervisor,
};

#[cfg(unix)]
use crate::supervisor::AttemptKind;

use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

/// Config with timings tightened so tests finish quickly.
pub fn fast_config(port: u16) -> ShellConfig {
    let mut config = ShellConfig::default();
    config.backend.port = port;
    config.startup.startup_timeout_ms = 5_000;
    config.startup.poll_initial_delay_ms = 10;
    config.startup.poll_interval_ms = 25;
    config.startup.max_poll_attempts = 40;
    config.startup.health_timeout_ms = 500;
    config.startup.logout_timeout_ms = 500;
    config
}

/// Supervisor whose resolver probes only the given base directory.
pub fn supervisor_over(
    base: &Path,
    config: ShellConfig,
    spawner: Arc<dyn ProcessSpawner>,
    probe: Arc<dyn HealthProbe>,
) -> Supervisor {
    let resolver = LocationResolver::with_candidates(false, vec![base.to_path_buf()]);
    Supervisor::with_parts(config, resolver, spawner, probe)
}

/// Packaged-style layout: `<base>/backend/dist/`, optionally holding a
/// fake native executable.
pub fn packaged_layout(native_exe: bool) -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    let dist = dir.path().join("backend").join("dist");
    std::fs::create_dir_all(&dist).expect("create dist dir");
    if native_exe {
        std::fs::write(dist.join("coach-backend"), b"#!/bin/sh\n").expect("write exe");
    }
    dir
}

/// Probe answering a scripted response sequence; the last entry repeats.
pub struct ScriptedProbe {
    responses: Vec<bool>,
    calls: AtomicUsize,
}

impl ScriptedProbe {
    pub fn new(responses: Vec<bool>) -> Self {
        assert!(!responses.is_empty());
        Self {
            responses,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always(value: bool) -> Self {
        Self::new(vec![value])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HealthProbe for ScriptedProbe {
    async fn check(&self) -> bool {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        *self
            .responses
            .get(n)
            .unwrap_or_else(|| self.responses.last().unwrap())
    }
}

/// Spawner that refuses every attempt, recording what it was asked for.
pub struct FailingSpawner {
    pub attempts: Mutex<Vec<SpawnAttempt>>,
}

impl FailingSpawner {
    pub fn new() -> Self {
        Self {
            attempts: Mutex::new(Vec::new()),
        }
    }

    pub fn recorded(&self) -> Vec<SpawnAttempt> {
        self.attempts.lock().unwrap().clone()
    }
}

impl ProcessSpawner for FailingSpawner {
    fn spawn(&self, attempt: &SpawnAttempt) -> std::io::Result<tokio::process::Child> {
        self.attempts.lock().unwrap().push(attempt.clone());
        Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "spawn refused by test",
        ))
    }
}

/// Spawner backing each attempt kind with a shell one-liner, so tests can
/// stand in real processes with scripted stdout and exit codes.
#[cfg(unix)]
pub struct ShellSpawner {
    native_script: Option<&'static str>,
    interpreter_script: Option<&'static str>,
    pub attempts: Mutex<Vec<SpawnAttempt>>,
}

#[cfg(unix)]
impl ShellSpawner {
    pub fn new(
        native_script: Option<&'static str>,
        interpreter_script: Option<&'static str>,
    ) -> Self {
        Self {
            native_script,
            interpreter_script,
            attempts: Mutex::new(Vec::new()),
        }
    }

    pub fn recorded(&self) -> Vec<SpawnAttempt> {
        self.attempts.lock().unwrap().clone()
    }
}

#[cfg(unix)]
impl ProcessSpawner for ShellSpawner {
    fn spawn(&self, attempt: &SpawnAttempt) -> std::io::Result<tokio::process::Child> {
        self.attempts.lock().unwrap().push(attempt.clone());

        let script = match attempt.kind {
            AttemptKind::NativeExecutable => self.native_script,
            AttemptKind::Interpreter => self.interpreter_script,
        };
        let Some(script) = script else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "spawn refused by test",
            ));
        };

        tokio::process::Command::new("sh")
            .arg("-c")
            .arg(script)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
    }
}
