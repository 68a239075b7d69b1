//! Health probing against the backend's local HTTP status endpoint.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

const STATUS_ENDPOINT: &str = "status";

/// Seam for the readiness/health probe, so tests can substitute fakes.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Single bounded probe. `true` only on a success-class HTTP
    /// response; any network error or non-2xx status is `false`.
    /// Never errors.
    async fn check(&self) -> bool;
}

/// Default probe issuing a bounded GET against `/status`.
pub struct HealthChecker {
    client: reqwest::Client,
    url: String,
}

impl HealthChecker {
    pub fn new(host: &str, port: u16, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(1)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            url: format!("http://{host}:{port}/{STATUS_ENDPOINT}"),
        }
    }
}

#[async_trait]
impl HealthProbe for HealthChecker {
    async fn check(&self) -> bool {
        match self.client.get(&self.url).send().await {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                debug!("health check returned HTTP {}", resp.status());
                false
            }
            Err(e) => {
                debug!("health check failed: {e}");
                false
            }
        }
    }
}
