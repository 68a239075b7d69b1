#![allow(dead_code)]

//! Process-management layer for the coaching assistant desktop shell.
//!
//! The shell UI is an opaque consumer of this crate: it calls
//! [`Supervisor::start`] during application startup, reads
//! [`Supervisor::status`] for its online/offline indicator, and runs the
//! [`shutdown`] sequence before the host process exits. The backend itself is
//! an external process exposing `/status` and `/logout` on a fixed local port.

pub mod logging;
pub mod shutdown;
pub mod supervisor;

pub use supervisor::{
    BackendLocation, BackendStatus, HealthChecker, HealthProbe, LocationResolver, ProcessSpawner,
    Readiness, ReadySignal, ShellConfig, SpawnAttempt, Supervisor, SupervisorError,
    SupervisorResult, TokioSpawner,
};

#[cfg(test)]
mod tests;
