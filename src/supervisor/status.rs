use crate::supervisor::ReadySignal;

use serde::Serialize;

/// Backend status reported to the UI layer.
///
/// `running` is the only field the status indicator acts on; the rest is
/// surfaced for the debug panel.
#[derive(Debug, Clone, Serialize)]
pub struct BackendStatus {
    /// Readiness recorded and a fresh health check passed
    pub running: bool,
    pub port: u16,
    pub pid: Option<u32>,
    /// How readiness was reached, so assumed-ready startups can be audited
    pub ready_signal: Option<ReadySignal>,
}
