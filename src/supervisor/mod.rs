mod config;
mod error;
mod health;
mod lifecycle;
mod locate;
mod spawn;
mod state;
mod status;

pub use config::{
    BackendSettings, CONFIG_VERSION, ENV_DEV_MODE, ENV_LOG_LEVEL, ENV_RESOURCE_DIR,
    ENV_STARTUP_TIMEOUT_MS, LoggingSettings, ShellConfig, StartupSettings,
};
pub use error::{Result as SupervisorResult, SupervisorError};
pub use health::{HealthChecker, HealthProbe};
pub use lifecycle::Supervisor;
pub use locate::{BackendLocation, LocationResolver};
pub use spawn::{AttemptKind, ProcessSpawner, SpawnAttempt, TokioSpawner};
pub use state::{Readiness, ReadySignal};
pub use status::BackendStatus;

pub(crate) use locate::executable_candidates;
pub(crate) use spawn::{build_attempts, interpreter_names};
