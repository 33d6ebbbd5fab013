//! Orchestrator and identity-provider API paths.

/// Liveness and authentication probe.
pub const STATUS: &str = "/api/json";
/// Installed plugins, one level deep so each entry carries its `shortName`.
pub const PLUGIN_LIST: &str = "/pluginManager/api/json?depth=1";
pub const PLUGIN_INSTALL: &str = "/pluginManager/installNecessaryPlugins";
pub const CREDENTIAL_CREATE: &str = "/credentials/store/system/domain/_/createCredentials";
/// Identity of the bearer-token owner.
pub const IDENTITY: &str = "/api/2.0/preview/scim/v2/Me";

pub fn credential(id: &str) -> String {
    format!(
        "/credentials/store/system/domain/_/credential/{}/api/json",
        urlencoding::encode(id)
    )
}

pub fn job(name: &str) -> String {
    format!("/job/{}/api/json", urlencoding::encode(name))
}

pub fn create_item(name: &str) -> String {
    format!("/createItem?name={}", urlencoding::encode(name))
}
