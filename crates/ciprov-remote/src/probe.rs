//! Connectivity probe.

use std::sync::Arc;
use tracing::{info, warn};

use crate::api;
use crate::transport::{READ_TIMEOUT, Request, Transport};

/// Why the orchestrator could not be reached or refused our credentials.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeFailure {
    #[error("Failed to connect (HTTP {0})")]
    Status(u16),

    #[error("Connection error: {0}")]
    Transport(String),
}

/// Verifies reachability and authentication with one read-only call.
pub struct Prober {
    transport: Arc<dyn Transport>,
}

impl Prober {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Succeeds only on an exact `200` from the status endpoint.
    pub async fn probe(&self) -> Result<(), ProbeFailure> {
        match self
            .transport
            .send(Request::get(api::STATUS, READ_TIMEOUT))
            .await
        {
            Ok(response) if response.is_ok() => {
                info!("Connectivity probe succeeded");
                Ok(())
            }
            Ok(response) => {
                warn!(status = response.status, "Connectivity probe rejected");
                Err(ProbeFailure::Status(response.status))
            }
            Err(e) => {
                warn!(error = %e, "Connectivity probe failed");
                Err(ProbeFailure::Transport(e.to_string()))
            }
        }
    }
}
