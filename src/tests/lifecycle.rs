use crate::shutdown;
use crate::supervisor::{Readiness, ReadySignal, SupervisorError};
use crate::tests::support::{FailingSpawner, ScriptedProbe, fast_config, supervisor_over};

use std::sync::Arc;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[cfg(unix)]
use crate::supervisor::AttemptKind;
#[cfg(unix)]
use crate::tests::support::{ShellSpawner, packaged_layout};

#[cfg(unix)]
const MARKER_SCRIPT: &str =
    "echo 'INFO: Uvicorn running on http://127.0.0.1:8000'; sleep 30";
#[cfg(unix)]
const SILENT_SCRIPT: &str = "sleep 30";

#[cfg(unix)]
#[tokio::test]
async fn stdout_marker_resolves_start_without_waiting_for_polls() {
    let layout = packaged_layout(true);
    let spawner = Arc::new(ShellSpawner::new(Some(MARKER_SCRIPT), None));
    let probe = Arc::new(ScriptedProbe::always(false));

    // Push the first health poll far out so only the log line can win.
    let mut config = fast_config(8000);
    config.startup.poll_initial_delay_ms = 10_000;

    let supervisor = supervisor_over(layout.path(), config, spawner.clone(), probe);

    let begun = std::time::Instant::now();
    supervisor.start().await.unwrap();

    assert!(begun.elapsed() < std::time::Duration::from_secs(2));
    assert_eq!(
        supervisor.readiness(),
        Readiness::Ready {
            via: ReadySignal::LogLine
        }
    );
    assert!(
        supervisor
            .recent_output()
            .await
            .iter()
            .any(|line| line.contains("Uvicorn running"))
    );

    supervisor.stop().await;
}

#[cfg(unix)]
#[tokio::test]
async fn log_line_signal_is_not_overwritten_by_a_later_poll_success() {
    let layout = packaged_layout(true);
    let spawner = Arc::new(ShellSpawner::new(Some(MARKER_SCRIPT), None));
    // The poll would also succeed, just later than the stdout marker.
    let probe = Arc::new(ScriptedProbe::always(true));

    let mut config = fast_config(8000);
    config.startup.poll_initial_delay_ms = 50;
    config.startup.poll_interval_ms = 25;

    let supervisor = supervisor_over(layout.path(), config, spawner, probe);

    supervisor.start().await.unwrap();
    assert_eq!(
        supervisor.readiness(),
        Readiness::Ready {
            via: ReadySignal::LogLine
        }
    );

    // Give the poller several intervals' worth of chances to fire; the
    // recorded signal must not change.
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    assert_eq!(
        supervisor.readiness(),
        Readiness::Ready {
            via: ReadySignal::LogLine
        }
    );

    let status = supervisor.status().await;
    assert!(status.running);
    assert_eq!(status.ready_signal, Some(ReadySignal::LogLine));

    supervisor.stop().await;
}

#[cfg(unix)]
#[tokio::test]
async fn start_with_live_handle_is_a_no_op() {
    let layout = packaged_layout(true);
    let spawner = Arc::new(ShellSpawner::new(Some(MARKER_SCRIPT), None));
    let probe = Arc::new(ScriptedProbe::always(false));
    let supervisor = supervisor_over(layout.path(), fast_config(8000), spawner.clone(), probe);

    supervisor.start().await.unwrap();
    assert_eq!(spawner.recorded().len(), 1);

    supervisor.start().await.unwrap();
    assert_eq!(spawner.recorded().len(), 1, "second start must not spawn");

    supervisor.stop().await;
}

#[cfg(unix)]
#[tokio::test]
async fn exit_before_ready_advances_to_interpreter_fallback() {
    let layout = packaged_layout(true);
    let spawner = Arc::new(ShellSpawner::new(Some("exit 1"), Some(MARKER_SCRIPT)));
    let probe = Arc::new(ScriptedProbe::always(false));
    let supervisor = supervisor_over(layout.path(), fast_config(8000), spawner.clone(), probe);

    supervisor.start().await.unwrap();

    let attempts = spawner.recorded();
    assert_eq!(attempts[0].kind, AttemptKind::NativeExecutable);
    assert_eq!(attempts[1].kind, AttemptKind::Interpreter);
    assert_eq!(attempts[1].program.to_str(), Some("/usr/bin/python3"));

    // Launcher sits one directory above the native executable.
    let launcher = layout.path().join("backend").join("launcher.py");
    assert_eq!(attempts[1].args, vec![launcher]);

    supervisor.stop().await;
}

#[cfg(unix)]
#[tokio::test]
async fn spawn_exhaustion_tries_every_interpreter_before_rejecting() {
    let layout = packaged_layout(true);
    let spawner = Arc::new(FailingSpawner::new());
    let probe = Arc::new(ScriptedProbe::always(false));
    let supervisor = supervisor_over(layout.path(), fast_config(8000), spawner.clone(), probe);

    let err = supervisor.start().await.unwrap_err();
    assert!(matches!(err, SupervisorError::SpawnExhausted { .. }));

    let programs: Vec<_> = spawner
        .recorded()
        .iter()
        .map(|a| a.program.display().to_string())
        .collect();
    assert_eq!(
        programs[1..],
        ["/usr/bin/python3", "python3", "python"],
        "interpreters must be tried in their fixed order"
    );

    assert_eq!(supervisor.readiness(), Readiness::NotStarted);
}

#[cfg(unix)]
#[tokio::test]
async fn silent_backend_is_assumed_ready_at_the_startup_timeout() {
    let layout = packaged_layout(true);
    let spawner = Arc::new(ShellSpawner::new(Some(SILENT_SCRIPT), None));
    let probe = Arc::new(ScriptedProbe::always(false));

    let mut config = fast_config(8000);
    config.startup.startup_timeout_ms = 300;

    let supervisor = supervisor_over(layout.path(), config, spawner, probe);

    supervisor.start().await.unwrap();
    assert_eq!(
        supervisor.readiness(),
        Readiness::Ready {
            via: ReadySignal::TimeoutAssumed
        }
    );

    // Assumed-ready is not the same as healthy: the status query still
    // reports offline because the fresh probe fails.
    let status = supervisor.status().await;
    assert!(!status.running);
    assert_eq!(status.ready_signal, Some(ReadySignal::TimeoutAssumed));

    supervisor.stop().await;
}

#[cfg(unix)]
#[tokio::test]
async fn health_poll_success_marks_ready_when_logs_stay_silent() {
    let layout = packaged_layout(true);
    let spawner = Arc::new(ShellSpawner::new(Some(SILENT_SCRIPT), None));
    let probe = Arc::new(ScriptedProbe::new(vec![false, false, true]));
    let supervisor = supervisor_over(layout.path(), fast_config(8000), spawner, probe.clone());

    supervisor.start().await.unwrap();

    assert_eq!(
        supervisor.readiness(),
        Readiness::Ready {
            via: ReadySignal::HealthPoll
        }
    );
    assert_eq!(probe.calls(), 3, "start must resolve on the 3rd poll");

    supervisor.stop().await;
}

#[cfg(unix)]
#[tokio::test]
async fn status_reports_running_only_while_ready_and_healthy() {
    let layout = packaged_layout(true);
    let spawner = Arc::new(ShellSpawner::new(Some(MARKER_SCRIPT), None));
    let probe = Arc::new(ScriptedProbe::always(true));
    let supervisor = supervisor_over(layout.path(), fast_config(8000), spawner, probe);

    supervisor.start().await.unwrap();
    let status = supervisor.status().await;
    assert!(status.running);
    assert!(status.pid.is_some());
    assert_eq!(status.port, 8000);

    supervisor.stop().await;
    let status = supervisor.status().await;
    assert!(!status.running);
    assert!(status.pid.is_none());
    assert_eq!(status.ready_signal, None);
}

#[tokio::test]
async fn stop_without_a_handle_is_an_idempotent_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let spawner = Arc::new(FailingSpawner::new());
    let probe = Arc::new(ScriptedProbe::always(false));
    let supervisor = supervisor_over(dir.path(), fast_config(8000), spawner, probe);

    supervisor.stop().await;
    supervisor.stop().await;
    assert_eq!(supervisor.readiness(), Readiness::NotStarted);
}

#[tokio::test]
async fn logout_notification_posts_to_the_logout_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/logout"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let spawner = Arc::new(FailingSpawner::new());
    let probe = Arc::new(ScriptedProbe::always(false));
    let supervisor = supervisor_over(
        dir.path(),
        fast_config(server.address().port()),
        spawner,
        probe,
    );

    supervisor.notify_logout().await;
    server.verify().await;
}

#[tokio::test]
async fn logout_failures_are_swallowed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/logout"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let spawner = Arc::new(FailingSpawner::new());
    let probe = Arc::new(ScriptedProbe::always(false));
    let supervisor = supervisor_over(
        dir.path(),
        fast_config(server.address().port()),
        spawner,
        probe,
    );

    // Must not panic or propagate; the same holds with no server at all.
    supervisor.notify_logout().await;
    shutdown::run_shutdown(&supervisor).await;
}
