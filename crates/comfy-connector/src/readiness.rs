//! Functional readiness check
//!
//! A service that answers `GET /` may still be loading models. The probe
//! therefore runs a small reference job end to end and only reports ready once
//! that job produces at least one image.

use crate::client::JobClient;
use crate::config::ConnectorConfig;
use crate::error::ConnectorError;
use crate::events::EventStream;
use crate::transport::Transport;
use comfy_graph::JobGraph;
use std::time::Duration;
use tracing::{info, warn};

/// Readiness probe built around a reference job graph
#[derive(Debug, Clone)]
pub struct ReadinessProbe {
    reference: JobGraph,
    attempts: u32,
    delay: Duration,
}

impl ReadinessProbe {
    /// Create a probe with an explicit retry policy
    #[must_use]
    pub fn new(reference: JobGraph, attempts: u32, delay: Duration) -> Self {
        Self {
            reference,
            attempts,
            delay,
        }
    }

    /// Create a probe using the configured retry policy
    #[must_use]
    pub fn from_config(reference: JobGraph, config: &ConnectorConfig) -> Self {
        Self::new(reference, config.readiness_attempts, config.readiness_delay)
    }

    /// Graph submitted on each check
    #[inline]
    #[must_use]
    pub fn reference(&self) -> &JobGraph {
        &self.reference
    }

    /// Checks performed by [`wait_until_ready`](Self::wait_until_ready)
    #[inline]
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether the service can run jobs right now
    ///
    /// Never fails: every problem is logged and reported as not ready. Nothing
    /// is submitted unless the service first answers its reachability check.
    pub async fn is_ready<T, E>(&self, client: &mut JobClient<T, E>) -> bool
    where
        T: Transport,
        E: EventStream,
    {
        match client.transport().check_alive().await {
            Ok(true) => {}
            Ok(false) => {
                warn!("service answered the reachability check with a non-200 status");
                return false;
            }
            Err(e) => {
                warn!(error = %e, "service is not reachable");
                return false;
            }
        }

        match client.generate_images(&self.reference).await {
            Ok(images) if !images.is_empty() => true,
            Ok(_) => {
                warn!("reference job produced no images");
                false
            }
            Err(e) => {
                warn!(error = %e, "reference job failed");
                false
            }
        }
    }

    /// Poll [`is_ready`](Self::is_ready) until it succeeds or attempts run out
    pub async fn wait_until_ready<T, E>(
        &self,
        client: &mut JobClient<T, E>,
    ) -> Result<(), ConnectorError>
    where
        T: Transport,
        E: EventStream,
    {
        for attempt in 1..=self.attempts {
            if self.is_ready(client).await {
                info!(attempt, "service is ready");
                return Ok(());
            }
            info!(attempt, max = self.attempts, "service not ready yet");
            if attempt < self.attempts {
                tokio::time::sleep(self.delay).await;
            }
        }

        Err(ConnectorError::Unreachable {
            address: "execution service".into(),
            reason: format!("not ready after {} attempts", self.attempts),
        })
    }
}
