//! Backend process lifecycle: layered spawn fallbacks, the readiness
//! race, and best-effort teardown.

use crate::supervisor::{
    BackendStatus, HealthChecker, HealthProbe, LocationResolver, ProcessSpawner, Readiness,
    ReadySignal, ShellConfig, SupervisorError, SupervisorResult, TokioSpawner, spawn,
};

use std::collections::VecDeque;
use std::panic::Location;
use std::sync::Arc;
use std::time::Duration;

use error_location::ErrorLocation;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::{Mutex, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Stdout lines that count as an immediate readiness signal.
const READY_MARKERS: &[&str] = &["Uvicorn running", "Server running on"];

/// How many recent backend output lines to retain for diagnostics.
const DIAGNOSTIC_BUFFER_LINES: usize = 256;

/// The live process reference the supervisor owns.
struct BackendHandle {
    child: Child,
    pid: Option<u32>,
}

/// How one spawn attempt concluded.
enum AttemptOutcome {
    Ready { handle: BackendHandle, via: ReadySignal },
    Exited { code: Option<i32> },
}

/// Owns the backend process for the lifetime of the shell.
///
/// Responsibilities:
/// - Resolve the backend's on-disk location
/// - Start it through the layered fallback chain
/// - Judge readiness (stdout marker, health poll, or timeout)
/// - Answer status queries from the UI layer
/// - Tear it down on shutdown, including the courtesy logout call
///
/// At most one process handle is owned at a time; `start` while a handle
/// exists is a no-op.
pub struct Supervisor {
    config: ShellConfig,
    resolver: LocationResolver,
    spawner: Arc<dyn ProcessSpawner>,
    probe: Arc<dyn HealthProbe>,
    logout_client: reqwest::Client,
    handle: Arc<Mutex<Option<BackendHandle>>>,
    readiness_tx: watch::Sender<Readiness>,
    readiness_rx: watch::Receiver<Readiness>,
    diagnostics: Arc<Mutex<VecDeque<String>>>,
}

impl Supervisor {
    /// Create a supervisor with the default spawn and health primitives.
    pub fn new(config: ShellConfig) -> Self {
        let resolver = LocationResolver::new(config.backend.dev_mode);
        let probe = Arc::new(HealthChecker::new(
            &config.backend.host,
            config.backend.port,
            Duration::from_millis(config.startup.health_timeout_ms),
        ));

        Self::with_parts(config, resolver, Arc::new(TokioSpawner), probe)
    }

    /// Create a supervisor with injected primitives (used by tests).
    pub fn with_parts(
        config: ShellConfig,
        resolver: LocationResolver,
        spawner: Arc<dyn ProcessSpawner>,
        probe: Arc<dyn HealthProbe>,
    ) -> Self {
        let (readiness_tx, readiness_rx) = watch::channel(Readiness::NotStarted);

        let logout_client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.startup.logout_timeout_ms))
            .pool_max_idle_per_host(1)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            config,
            resolver,
            spawner,
            probe,
            logout_client,
            handle: Arc::new(Mutex::new(None)),
            readiness_tx,
            readiness_rx,
            diagnostics: Arc::new(Mutex::new(VecDeque::with_capacity(
                DIAGNOSTIC_BUFFER_LINES,
            ))),
        }
    }

    /// Start the backend and wait until it is judged ready.
    ///
    /// Resolves once any readiness signal fires, the startup timeout
    /// included. Rejects only when every fallback attempt failed to
    /// produce a process that stayed alive until a signal.
    pub async fn start(&self) -> SupervisorResult<()> {
        if self.handle.lock().await.is_some() {
            info!("backend already running, start is a no-op");
            return Ok(());
        }

        self.set_readiness(Readiness::Starting);

        let location = self.resolver.resolve();
        let attempts = spawn::build_attempts(&location, cfg!(windows));
        let timeout = Duration::from_millis(self.config.startup.startup_timeout_ms);
        let deadline = Instant::now() + timeout;

        let mut last_error = String::from("no spawn attempt succeeded");

        for attempt in &attempts {
            #[cfg(unix)]
            if attempt.kind == spawn::AttemptKind::NativeExecutable {
                spawn::ensure_executable(&attempt.program);
            }

            info!("spawning backend: {}", attempt.describe());
            let child = match self.spawner.spawn(attempt) {
                Ok(child) => child,
                Err(e) => {
                    warn!("failed to spawn {}: {e}", attempt.describe());
                    last_error = format!("{}: {e}", attempt.describe());
                    continue;
                }
            };

            match self.wait_for_ready(child, deadline).await {
                AttemptOutcome::Ready { handle, via } => {
                    let pid = handle.pid;
                    *self.handle.lock().await = Some(handle);
                    self.set_readiness(Readiness::Ready { via });

                    match via {
                        ReadySignal::LogLine => {
                            info!("backend ready (stdout marker), pid {pid:?}");
                        }
                        ReadySignal::HealthPoll => {
                            info!("backend ready (health endpoint answered), pid {pid:?}");
                        }
                        ReadySignal::TimeoutAssumed => {
                            warn!(
                                "no readiness signal within {}ms, assuming backend \
                                 ready, pid {pid:?}",
                                self.config.startup.startup_timeout_ms
                            );
                        }
                    }

                    return Ok(());
                }
                AttemptOutcome::Exited { code } => {
                    warn!(
                        "backend exited with code {code:?} before signaling ready, \
                         advancing to next fallback"
                    );
                    last_error = format!("{} exited with code {code:?}", attempt.describe());
                }
            }
        }

        self.set_readiness(Readiness::NotStarted);
        Err(SupervisorError::SpawnExhausted {
            attempts: attempts.len(),
            last_error,
            location: ErrorLocation::from(Location::caller()),
        })
    }

    /// Wait for one spawned process to become ready, exit, or time out.
    ///
    /// The stdout watcher and the health poller race through a watch
    /// channel that records only the first signal; whatever fires later
    /// is ignored.
    async fn wait_for_ready(&self, mut child: Child, deadline: Instant) -> AttemptOutcome {
        let pid = child.id();
        let (ready_tx, mut ready_rx) = watch::channel(None::<ReadySignal>);

        if let Some(stdout) = child.stdout.take() {
            self.watch_output(stdout, "stdout", Some(ready_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            self.watch_output(stderr, "stderr", None);
        }
        self.poll_health(ready_tx);

        let first_signal = async {
            match ready_rx.wait_for(|signal| signal.is_some()).await {
                Ok(signal) => *signal,
                // Watcher tasks gone without a signal; the exit and
                // timeout branches below still settle the attempt.
                Err(_) => std::future::pending().await,
            }
        };

        // Biased so a marker printed right before the process dies is
        // still counted as readiness, not as an exit.
        tokio::select! {
            biased;

            Some(via) = first_signal => {
                AttemptOutcome::Ready { handle: BackendHandle { child, pid }, via }
            }
            status = child.wait() => {
                let code = status.ok().and_then(|s| s.code());
                AttemptOutcome::Exited { code }
            }
            _ = tokio::time::sleep_until(deadline) => {
                AttemptOutcome::Ready {
                    handle: BackendHandle { child, pid },
                    via: ReadySignal::TimeoutAssumed,
                }
            }
        }
    }

    /// Mirror one of the backend's output streams into the log and the
    /// diagnostic buffer, watching stdout for readiness markers.
    fn watch_output(
        &self,
        stream: impl AsyncRead + Unpin + Send + 'static,
        label: &'static str,
        ready_tx: Option<watch::Sender<Option<ReadySignal>>>,
    ) {
        let diagnostics = self.diagnostics.clone();

        tokio::spawn(async move {
            let mut lines = BufReader::new(stream).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("backend {label}: {line}");

                {
                    let mut buffer = diagnostics.lock().await;
                    if buffer.len() == DIAGNOSTIC_BUFFER_LINES {
                        buffer.pop_front();
                    }
                    buffer.push_back(line.clone());
                }

                if let Some(tx) = &ready_tx
                    && READY_MARKERS.iter().any(|marker| line.contains(marker))
                {
                    record_ready(tx, ReadySignal::LogLine);
                }
            }
        });
    }

    /// Poll the health endpoint until it answers, the attempt budget is
    /// spent, or readiness was already recorded elsewhere.
    fn poll_health(&self, ready_tx: watch::Sender<Option<ReadySignal>>) {
        let probe = self.probe.clone();
        let initial_delay = Duration::from_millis(self.config.startup.poll_initial_delay_ms);
        let interval = Duration::from_millis(self.config.startup.poll_interval_ms);
        let max_attempts = self.config.startup.max_poll_attempts;

        tokio::spawn(async move {
            tokio::time::sleep(initial_delay).await;

            for _ in 0..max_attempts {
                if ready_tx.borrow().is_some() || ready_tx.is_closed() {
                    return;
                }
                if probe.check().await {
                    record_ready(&ready_tx, ReadySignal::HealthPoll);
                    return;
                }
                tokio::time::sleep(interval).await;
            }
        });
    }

    /// Signal termination to the backend and clear the handle.
    ///
    /// Fire-and-forget: exit confirmation is not awaited. Idempotent
    /// no-op when no handle is owned.
    pub async fn stop(&self) {
        let mut guard = self.handle.lock().await;
        let Some(mut handle) = guard.take() else {
            debug!("stop called with no backend handle");
            return;
        };
        drop(guard);

        info!("stopping backend, pid {:?}", handle.pid);

        #[cfg(unix)]
        {
            use nix::sys::signal::{Signal, kill};
            use nix::unistd::Pid;

            match handle.pid {
                Some(pid) => {
                    if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                        debug!("SIGTERM delivery failed: {e}");
                    }
                }
                None => {
                    if let Err(e) = handle.child.start_kill() {
                        debug!("kill failed: {e}");
                    }
                }
            }
        }

        #[cfg(not(unix))]
        if let Err(e) = handle.child.start_kill() {
            debug!("kill failed: {e}");
        }

        self.set_readiness(Readiness::NotStarted);
    }

    /// Best-effort POST to the backend's logout endpoint before exit.
    ///
    /// Runs during application shutdown where blocking or crashing is
    /// worse than skipping the courtesy notification, so failures are
    /// logged and swallowed.
    pub async fn notify_logout(&self) {
        let url = format!(
            "http://{}:{}/logout",
            self.config.backend.host, self.config.backend.port
        );

        match self.logout_client.post(&url).send().await {
            Ok(resp) if resp.status().is_success() => {
                info!("logout notification acknowledged");
            }
            Ok(resp) => warn!("logout notification returned HTTP {}", resp.status()),
            Err(e) => warn!("logout notification failed: {e}"),
        }
    }

    /// Status for the UI layer. `running` re-probes the health endpoint
    /// on every call rather than trusting a cached value.
    pub async fn status(&self) -> BackendStatus {
        let readiness = *self.readiness_rx.borrow();
        let pid = self.handle.lock().await.as_ref().and_then(|h| h.pid);
        let running = readiness.is_ready() && self.probe.check().await;

        BackendStatus {
            running,
            port: self.config.backend.port,
            pid,
            ready_signal: readiness.signal(),
        }
    }

    /// Current readiness state.
    pub fn readiness(&self) -> Readiness {
        *self.readiness_rx.borrow()
    }

    /// Subscribe to readiness changes.
    pub fn subscribe(&self) -> watch::Receiver<Readiness> {
        self.readiness_rx.clone()
    }

    /// Backend process PID (if a handle is owned).
    pub async fn pid(&self) -> Option<u32> {
        self.handle.lock().await.as_ref().and_then(|h| h.pid)
    }

    /// Recent backend output lines, newest last.
    pub async fn recent_output(&self) -> Vec<String> {
        self.diagnostics.lock().await.iter().cloned().collect()
    }

    fn set_readiness(&self, state: Readiness) {
        let _ = self.readiness_tx.send(state);
    }
}

/// Record the first readiness signal; later callers lose the race and
/// their signal is dropped.
fn record_ready(tx: &watch::Sender<Option<ReadySignal>>, via: ReadySignal) {
    tx.send_if_modified(|current| {
        if current.is_none() {
            *current = Some(via);
            true
        } else {
            false
        }
    });
}
