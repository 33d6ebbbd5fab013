//! Read-only existence checks.

use ciprov_core::{ExistenceState, Resource};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::api;
use crate::transport::{READ_TIMEOUT, Request, Transport};

/// The installed-plugin listing, fetched once and consulted for every plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginListing {
    Known(HashSet<String>),
    /// The listing could not be read; every plugin is `Unknown`.
    Unavailable(String),
}

impl PluginListing {
    pub fn state_of(&self, name: &str) -> ExistenceState {
        match self {
            PluginListing::Known(installed) if installed.contains(name) => ExistenceState::Present,
            PluginListing::Known(_) => ExistenceState::Absent,
            PluginListing::Unavailable(reason) => ExistenceState::Unknown(reason.clone()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PluginListing::Known(installed) => installed.len(),
            PluginListing::Unavailable(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Deserialize)]
struct PluginManagerResponse {
    #[serde(default)]
    plugins: Vec<PluginInfo>,
}

#[derive(Debug, Deserialize)]
struct PluginInfo {
    #[serde(rename = "shortName")]
    short_name: String,
}

/// Classifies remote resources as present, absent or unknown.
pub struct ExistenceChecker {
    transport: Arc<dyn Transport>,
}

impl ExistenceChecker {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Check any resource. Plugins fetch the full listing; prefer [`Self::plugin_listing`]
    /// when checking several.
    pub async fn exists(&self, resource: &Resource) -> ExistenceState {
        match resource {
            Resource::Plugin(plugin) => self.plugin_listing().await.state_of(&plugin.name),
            Resource::Credential(credential) => self.credential(&credential.id).await,
            Resource::Job(job) => self.job(&job.name).await,
        }
    }

    pub async fn plugin_listing(&self) -> PluginListing {
        let response = match self
            .transport
            .send(Request::get(api::PLUGIN_LIST, READ_TIMEOUT))
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Could not read plugin listing");
                return PluginListing::Unavailable(e.to_string());
            }
        };

        if !response.is_ok() {
            warn!(status = response.status, "Plugin listing returned unexpected status");
            return PluginListing::Unavailable(format!("HTTP {}", response.status));
        }

        match serde_json::from_str::<PluginManagerResponse>(&response.body) {
            Ok(parsed) => {
                let installed: HashSet<String> =
                    parsed.plugins.into_iter().map(|p| p.short_name).collect();
                debug!(count = installed.len(), "Read plugin listing");
                PluginListing::Known(installed)
            }
            Err(e) => {
                warn!(error = %e, "Plugin listing is not valid JSON");
                PluginListing::Unavailable(format!("invalid plugin listing: {}", e))
            }
        }
    }

    pub async fn credential(&self, id: &str) -> ExistenceState {
        self.detail(&api::credential(id)).await
    }

    pub async fn job(&self, name: &str) -> ExistenceState {
        self.detail(&api::job(name)).await
    }

    /// 200 means present, 404 absent; anything else is ambiguous.
    async fn detail(&self, path: &str) -> ExistenceState {
        match self.transport.send(Request::get(path, READ_TIMEOUT)).await {
            Ok(response) if response.is_ok() => ExistenceState::Present,
            Ok(response) if response.status == 404 => ExistenceState::Absent,
            Ok(response) => {
                warn!(path, status = response.status, "Ambiguous existence check");
                ExistenceState::Unknown(format!("HTTP {}", response.status))
            }
            Err(e) => {
                warn!(path, error = %e, "Existence check failed");
                ExistenceState::Unknown(e.to_string())
            }
        }
    }
}
