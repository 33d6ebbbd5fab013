//! Plugin installation command.

use anyhow::Result;
use ciprov_core::{DesiredState, Plugin};
use ciprov_reconciler::ReconcileSettings;
use std::time::Duration;

use super::ConnectionArgs;
use crate::output;

/// Plugins a pipeline-from-SCM setup needs.
pub const DEFAULT_PLUGINS: &[&str] = &[
    "workflow-aggregator",
    "git",
    "credentials-binding",
    "ws-cleanup",
];

pub async fn run(connection: &ConnectionArgs, plugins: Vec<String>, delay_ms: u64) -> Result<bool> {
    let endpoint = connection.resolve(None)?;

    let names = if plugins.is_empty() {
        DEFAULT_PLUGINS.iter().map(|p| p.to_string()).collect()
    } else {
        plugins
    };

    output::print_header(
        "Jenkins Plugin Installer",
        &[("Jenkins URL", endpoint.base_url())],
    );

    let desired = DesiredState {
        plugins: names.into_iter().map(Plugin::new).collect(),
        ..Default::default()
    };
    let settings = ReconcileSettings {
        plugin_delay: Duration::from_millis(delay_ms),
        ..Default::default()
    };

    let report = super::reconcile(endpoint, desired, settings).await?;
    if report.aborted.is_some() {
        return Ok(false);
    }

    if report.success() {
        output::print_list(
            "Next steps:",
            &[
                "Go to Jenkins → Manage Jenkins → Manage Plugins".to_string(),
                "Check if plugins are installed (may take a few minutes)".to_string(),
                "If prompted, restart Jenkins".to_string(),
                "After restart, plugins will be available".to_string(),
            ],
        );
    } else {
        println!();
        println!("You may need to install them manually via the Jenkins web UI");
    }

    Ok(report.success())
}
