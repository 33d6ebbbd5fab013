//! CLI command implementations.

pub mod apply;
pub mod plugins;
pub mod setup;
pub mod token;

use anyhow::{Context, Result};
use ciprov_config::OrchestratorConfig;
use ciprov_core::{DesiredState, ReconciliationReport, RemoteEndpoint, Secret};
use ciprov_reconciler::{ReconcileSettings, Reconciler};
use ciprov_remote::HttpTransport;
use clap::Args;
use std::sync::Arc;
use tracing::debug;

pub use setup::SetupArgs;

pub const DEFAULT_URL: &str = "http://localhost:8080";

/// How to reach and authenticate against the orchestrator.
#[derive(Args, Clone, Debug)]
pub struct ConnectionArgs {
    /// Orchestrator URL [default: http://localhost:8080]
    #[arg(long, env = "CIPROV_URL")]
    pub url: Option<String>,

    /// Orchestrator username (prompted for if omitted)
    #[arg(long, env = "CIPROV_USERNAME")]
    pub username: Option<String>,

    /// Orchestrator API token (prompted for if omitted)
    #[arg(long, env = "CIPROV_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
}

impl ConnectionArgs {
    /// Flags and environment win over the desired-state file, which wins over defaults.
    pub fn resolve(&self, file: Option<&OrchestratorConfig>) -> Result<RemoteEndpoint> {
        let url = self
            .url
            .clone()
            .or_else(|| file.map(|f| f.url.clone()))
            .unwrap_or_else(|| DEFAULT_URL.to_string());

        let username = match self
            .username
            .clone()
            .or_else(|| file.and_then(|f| f.username.clone()))
        {
            Some(username) => username,
            None => prompt_text("Jenkins username:")?,
        };

        let token = match &self.token {
            Some(token) => Secret::new(token.clone()),
            None => prompt_secret("Jenkins API token:")?,
        };

        RemoteEndpoint::basic(&url, username, token)
            .with_context(|| format!("Invalid orchestrator URL: {}", url))
    }
}

pub fn prompt_text(message: &str) -> Result<String> {
    let value = inquire::Text::new(message)
        .prompt()
        .context("Failed to read input")?;
    Ok(value.trim().to_string())
}

/// Prompt without echoing the input.
pub fn prompt_secret(message: &str) -> Result<Secret> {
    let value = inquire::Password::new(message)
        .without_confirmation()
        .prompt()
        .context("Failed to read secret")?;
    Ok(Secret::new(value))
}

/// Reconcile `desired`, printing a line per resource as it completes.
pub async fn reconcile(
    endpoint: RemoteEndpoint,
    desired: DesiredState,
    settings: ReconcileSettings,
) -> Result<ReconciliationReport> {
    debug!(
        url = %endpoint.base_url(),
        resources = desired.resources().len(),
        "Starting reconciliation"
    );
    let transport = HttpTransport::new(endpoint).context("Failed to build HTTP client")?;
    let reconciler = Reconciler::new(Arc::new(transport), settings);

    let (mut rx, handle) = reconciler.execute(desired);
    while let Some(event) = rx.recv().await {
        crate::output::print_event(&event);
    }

    let report = handle.await.context("Reconciliation task failed")?;
    crate::output::print_summary(&report);
    Ok(report)
}
