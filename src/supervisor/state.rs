use serde::Serialize;

/// Readiness of the supervised backend process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// No backend process has been started
    NotStarted,
    /// A start attempt is in flight
    Starting,
    /// The backend is presumed able to serve requests
    Ready { via: ReadySignal },
}

/// Which signal first marked the backend ready.
///
/// Recorded at most once per start; later signals are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadySignal {
    /// A recognized marker line appeared on the backend's stdout
    LogLine,
    /// The health endpoint answered during startup polling
    HealthPoll,
    /// Neither signal arrived before the startup timeout; readiness
    /// is assumed so the shell never blocks indefinitely
    TimeoutAssumed,
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready { .. })
    }

    pub fn signal(&self) -> Option<ReadySignal> {
        match self {
            Readiness::Ready { via } => Some(*via),
            _ => None,
        }
    }
}
