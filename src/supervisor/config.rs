//! Shell configuration with validation, versioning and environment overrides.

use crate::supervisor::{SupervisorError, SupervisorResult};

use std::panic::Location;
use std::path::Path;

use error_location::ErrorLocation;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Configuration version for migration support.
/// Increment when adding new fields or changing structure.
pub const CONFIG_VERSION: u32 = 1;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_STARTUP_TIMEOUT_MS: u64 = 20_000;
const DEFAULT_POLL_INITIAL_DELAY_MS: u64 = 500;
const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 40;
const DEFAULT_HEALTH_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_LOGOUT_TIMEOUT_MS: u64 = 2_000;

const MIN_PORT: u16 = 1024;

/// Override for the startup timeout, in milliseconds.
pub const ENV_STARTUP_TIMEOUT_MS: &str = "COACH_STARTUP_TIMEOUT_MS";
/// Override for the active log verbosity level.
pub const ENV_LOG_LEVEL: &str = "COACH_LOG_LEVEL";
/// Treat the environment as a development checkout instead of a
/// packaged distribution.
pub const ENV_DEV_MODE: &str = "COACH_DEV_MODE";
/// Packaged-resource directory searched first when locating the backend.
pub const ENV_RESOURCE_DIR: &str = "COACH_RESOURCE_DIR";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellConfig {
    /// Config file format version
    #[serde(default = "default_version")]
    pub version: u32,

    /// Backend process settings
    #[serde(default)]
    pub backend: BackendSettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Startup and teardown timing settings
    #[serde(default)]
    pub startup: StartupSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSettings {
    /// Host the backend binds to (always 127.0.0.1 for security)
    #[serde(default = "default_host")]
    pub host: String,

    /// Port the backend listens on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Development checkout vs packaged distribution; changes how the
    /// backend's on-disk location is resolved
    #[serde(default)]
    pub dev_mode: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log directory (relative to data directory)
    #[serde(default = "default_log_dir")]
    pub directory: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartupSettings {
    /// Hard cap on how long a start attempt may wait for a readiness
    /// signal before readiness is assumed (milliseconds)
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout_ms: u64,

    /// Delay before the first health poll (milliseconds)
    #[serde(default = "default_poll_initial_delay")]
    pub poll_initial_delay_ms: u64,

    /// Interval between health polls (milliseconds)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Maximum number of startup health polls
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,

    /// Per-request timeout for health checks (milliseconds)
    #[serde(default = "default_health_timeout")]
    pub health_timeout_ms: u64,

    /// Timeout for the best-effort logout call during shutdown (milliseconds)
    #[serde(default = "default_logout_timeout")]
    pub logout_timeout_ms: u64,
}

// === Default Value Functions ===

fn default_version() -> u32 {
    CONFIG_VERSION
}
fn default_host() -> String {
    DEFAULT_HOST.into()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.into()
}
fn default_log_dir() -> String {
    DEFAULT_LOG_DIR.into()
}
fn default_startup_timeout() -> u64 {
    DEFAULT_STARTUP_TIMEOUT_MS
}
fn default_poll_initial_delay() -> u64 {
    DEFAULT_POLL_INITIAL_DELAY_MS
}
fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}
fn default_max_poll_attempts() -> u32 {
    DEFAULT_MAX_POLL_ATTEMPTS
}
fn default_health_timeout() -> u64 {
    DEFAULT_HEALTH_TIMEOUT_MS
}
fn default_logout_timeout() -> u64 {
    DEFAULT_LOGOUT_TIMEOUT_MS
}

// === Default Implementations ===

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            backend: BackendSettings::default(),
            logging: LoggingSettings::default(),
            startup: StartupSettings::default(),
        }
    }
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            dev_mode: false,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: default_log_dir(),
        }
    }
}

impl Default for StartupSettings {
    fn default() -> Self {
        Self {
            startup_timeout_ms: default_startup_timeout(),
            poll_initial_delay_ms: default_poll_initial_delay(),
            poll_interval_ms: default_poll_interval(),
            max_poll_attempts: default_max_poll_attempts(),
            health_timeout_ms: default_health_timeout(),
            logout_timeout_ms: default_logout_timeout(),
        }
    }
}

// === Configuration Operations ===

impl ShellConfig {
    /// Load config from file, creating default if not exists.
    ///
    /// Environment overrides are applied after loading and are never
    /// written back to disk.
    pub fn load_or_create(data_dir: &Path) -> SupervisorResult<Self> {
        let config_path = data_dir.join("config.toml");

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let mut config: Self =
                toml::from_str(&content).map_err(|e| SupervisorError::ConfigInvalid {
                    message: e.to_string(),
                    location: ErrorLocation::from(Location::caller()),
                })?;

            // Migrate if needed
            if config.version < CONFIG_VERSION {
                config = Self::migrate(config)?;
                config.save(data_dir)?;
            }

            config
        } else {
            let config = Self::default();
            config.save(data_dir)?;
            config
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Save config to file atomically.
    ///
    /// Uses write-to-temp-then-rename pattern to prevent
    /// partial writes if the process is interrupted.
    pub fn save(&self, data_dir: &Path) -> SupervisorResult<()> {
        let config_path = data_dir.join("config.toml");
        let content =
            toml::to_string_pretty(self).map_err(|e| SupervisorError::ConfigInvalid {
                message: e.to_string(),
                location: ErrorLocation::from(Location::caller()),
            })?;

        // Write atomically via temp file
        let temp_path = config_path.with_extension("toml.tmp");
        std::fs::write(&temp_path, &content)?;
        std::fs::rename(&temp_path, &config_path)?;

        Ok(())
    }

    /// Migrate config from older version.
    fn migrate(mut config: Self) -> SupervisorResult<Self> {
        // Version 0 -> 1: Add startup timing settings
        if config.version == 0 {
            config.startup = StartupSettings::default();
            config.version = 1;
        }

        Ok(config)
    }

    /// Apply process-environment overrides on top of the persisted values.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(raw) = std::env::var(ENV_STARTUP_TIMEOUT_MS) {
            match raw.parse::<u64>() {
                Ok(ms) => self.startup.startup_timeout_ms = ms,
                Err(_) => warn!("{ENV_STARTUP_TIMEOUT_MS}={raw} is not a number, ignoring"),
            }
        }

        if let Ok(level) = std::env::var(ENV_LOG_LEVEL) {
            self.logging.level = level;
        }

        if let Ok(raw) = std::env::var(ENV_DEV_MODE) {
            self.backend.dev_mode = matches!(raw.as_str(), "1" | "true" | "yes");
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> SupervisorResult<()> {
        // Port must be unprivileged
        if self.backend.port < MIN_PORT {
            return Err(SupervisorError::ConfigInvalid {
                message: format!("Port must be >= {} (unprivileged)", MIN_PORT),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        // Host must be localhost for security
        if self.backend.host != DEFAULT_HOST && self.backend.host != "localhost" {
            return Err(SupervisorError::ConfigInvalid {
                message: format!("Host must be {DEFAULT_HOST} or localhost for security"),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        // Startup timeout must be positive
        if self.startup.startup_timeout_ms == 0 {
            return Err(SupervisorError::ConfigInvalid {
                message: "Startup timeout must be > 0".into(),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        if self.startup.poll_interval_ms == 0 {
            return Err(SupervisorError::ConfigInvalid {
                message: "Health poll interval must be > 0".into(),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        Ok(())
    }
}
