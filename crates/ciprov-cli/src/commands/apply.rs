//! Desired-state file commands.

use anyhow::{Context, Result};
use ciprov_config::{DesiredStateFile, load_desired_state};
use ciprov_reconciler::{DEFAULT_PLUGIN_DELAY, ReconcileSettings};

use super::ConnectionArgs;
use crate::output;

pub async fn run(connection: &ConnectionArgs, path: &str) -> Result<bool> {
    let file = load_desired_state(path)
        .with_context(|| format!("Failed to load desired state from {}", path))?;

    let endpoint = connection.resolve(file.orchestrator.as_ref())?;

    output::print_header(
        "Jenkins Reconciliation",
        &[("Jenkins URL", endpoint.base_url()), ("Desired state", path)],
    );

    if file.desired.is_empty() {
        output::print_warn("Nothing declared; there is nothing to reconcile");
        return Ok(true);
    }

    let settings = ReconcileSettings {
        plugin_delay: file.settings.plugin_delay.unwrap_or(DEFAULT_PLUGIN_DELAY),
        unknown: file.settings.unknown,
    };

    let report = super::reconcile(endpoint, file.desired, settings).await?;
    Ok(report.success())
}

/// Parse `path` and print what it declares. Never contacts the orchestrator.
pub fn validate(path: &str) -> bool {
    match load_desired_state(path) {
        Ok(file) => {
            output::print_success(&format!("{} is valid", path));
            print_summary(&file);
            true
        }
        Err(e) => {
            output::print_error(&format!("{} is invalid: {}", path, e));
            false
        }
    }
}

fn print_summary(file: &DesiredStateFile) {
    if let Some(orchestrator) = &file.orchestrator {
        println!("  Orchestrator: {}", orchestrator.url);
    }
    println!("  Plugins: {}", file.desired.plugins.len());
    if let Some(credential) = &file.desired.credential {
        println!("  Credential: {}", credential.id);
    }
    if let Some(job) = &file.desired.job {
        println!("  Job: {} ({})", job.name, job.repository_url);
    }
}
