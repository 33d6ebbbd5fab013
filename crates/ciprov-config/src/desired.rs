//! Desired-state file parsing.

use crate::{ConfigError, ConfigResult};
use ciprov_core::{
    ChoiceParameter, Credential, DesiredState, Job, Plugin, Secret, UnknownPolicies,
    UnknownPolicy,
};
use kdl::{KdlDocument, KdlNode};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Where to reconcile. Credentials for the orchestrator never live in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub url: String,
    pub username: Option<String>,
}

/// Overrides for reconciliation behaviour; `None` keeps the built-in default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsConfig {
    pub plugin_delay: Option<Duration>,
    pub unknown: UnknownPolicies,
}

/// A parsed `ciprov.kdl`.
#[derive(Debug, Clone, Default)]
pub struct DesiredStateFile {
    pub orchestrator: Option<OrchestratorConfig>,
    pub settings: SettingsConfig,
    pub desired: DesiredState,
}

/// Read and parse a desired-state file, resolving secrets from the process environment.
pub fn load_desired_state(path: impl AsRef<Path>) -> ConfigResult<DesiredStateFile> {
    let content = std::fs::read_to_string(path)?;
    parse_desired_state(&content)
}

/// Parse desired state from KDL text, resolving secrets from the process environment.
pub fn parse_desired_state(kdl: &str) -> ConfigResult<DesiredStateFile> {
    parse_desired_state_with(kdl, |name| std::env::var(name).ok())
}

/// Parse desired state from KDL text, resolving `secret-env` through `env`.
pub fn parse_desired_state_with<F>(kdl: &str, env: F) -> ConfigResult<DesiredStateFile>
where
    F: Fn(&str) -> Option<String>,
{
    let doc: KdlDocument = kdl.parse()?;

    let mut file = DesiredStateFile::default();
    let mut seen_plugins = HashSet::new();

    for node in doc.nodes() {
        match node.name().value() {
            "orchestrator" => {
                if file.orchestrator.is_some() {
                    return Err(ConfigError::Duplicate("orchestrator".to_string()));
                }
                file.orchestrator = Some(parse_orchestrator(node)?);
            }
            "settings" => {
                file.settings = parse_settings(node)?;
            }
            "plugin" => {
                let names = get_all_string_args(node);
                if names.is_empty() {
                    return Err(ConfigError::MissingField("plugin name".to_string()));
                }
                for name in names {
                    if !seen_plugins.insert(name.clone()) {
                        return Err(ConfigError::Duplicate(format!("plugin '{}'", name)));
                    }
                    file.desired.plugins.push(Plugin::new(name));
                }
            }
            "credential" => {
                if file.desired.credential.is_some() {
                    return Err(ConfigError::Duplicate("credential".to_string()));
                }
                file.desired.credential = Some(parse_credential(node, &env)?);
            }
            "job" => {
                if file.desired.job.is_some() {
                    return Err(ConfigError::Duplicate("job".to_string()));
                }
                file.desired.job = Some(parse_job(node)?);
            }
            _ => {} // Ignore unknown nodes
        }
    }

    Ok(file)
}

fn parse_orchestrator(node: &KdlNode) -> ConfigResult<OrchestratorConfig> {
    let url = get_first_string_arg(node)
        .ok_or_else(|| ConfigError::MissingField("orchestrator URL".to_string()))?;

    Ok(OrchestratorConfig {
        url,
        username: get_string_prop(node, "username"),
    })
}

fn parse_settings(node: &KdlNode) -> ConfigResult<SettingsConfig> {
    let plugin_delay = match node.get("plugin-delay-ms") {
        Some(value) => {
            let ms = value
                .as_integer()
                .filter(|ms| *ms >= 0)
                .and_then(|ms| u64::try_from(ms).ok())
                .ok_or_else(|| ConfigError::InvalidValue {
                    field: "plugin-delay-ms".to_string(),
                    message: "expected a non-negative integer".to_string(),
                })?;
            Some(Duration::from_millis(ms))
        }
        None => None,
    };

    let mut unknown = UnknownPolicies::default();
    if let Some(children) = node.children() {
        for child in children.nodes() {
            if child.name().value() == "unknown" {
                if let Some(policy) = get_policy_prop(child, "plugin")? {
                    unknown.plugin = policy;
                }
                if let Some(policy) = get_policy_prop(child, "credential")? {
                    unknown.credential = policy;
                }
                if let Some(policy) = get_policy_prop(child, "job")? {
                    unknown.job = policy;
                }
            }
        }
    }

    Ok(SettingsConfig {
        plugin_delay,
        unknown,
    })
}

fn parse_credential<F>(node: &KdlNode, env: &F) -> ConfigResult<Credential>
where
    F: Fn(&str) -> Option<String>,
{
    let id = get_first_string_arg(node)
        .ok_or_else(|| ConfigError::MissingField("credential id".to_string()))?;

    let secret = match (get_string_prop(node, "secret-env"), get_string_prop(node, "secret")) {
        (Some(var), _) => env(&var).ok_or(ConfigError::MissingEnv(var))?,
        (None, Some(literal)) => literal,
        (None, None) => {
            return Err(ConfigError::MissingField(format!(
                "secret or secret-env for credential '{}'",
                id
            )));
        }
    };

    if secret.is_empty() {
        return Err(ConfigError::InvalidValue {
            field: format!("secret for credential '{}'", id),
            message: "must not be empty".to_string(),
        });
    }

    Ok(Credential {
        id,
        secret: Secret::new(secret),
        description: get_string_prop(node, "description").unwrap_or_default(),
    })
}

fn parse_job(node: &KdlNode) -> ConfigResult<Job> {
    let name = get_first_string_arg(node)
        .ok_or_else(|| ConfigError::MissingField("job name".to_string()))?;

    let mut repository = get_string_prop(node, "repository");
    let mut branch = None;
    let mut script_path = None;
    let mut parameter = None;

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "repository" => {
                    repository = get_first_string_arg(child);
                }
                "branch" => {
                    branch = get_first_string_arg(child);
                }
                "script-path" | "script_path" => {
                    script_path = get_first_string_arg(child);
                }
                "parameter" => {
                    if parameter.is_some() {
                        return Err(ConfigError::Duplicate(format!(
                            "parameter for job '{}'",
                            name
                        )));
                    }
                    parameter = Some(parse_parameter(child, &name)?);
                }
                _ => {}
            }
        }
    }

    let repository = repository.ok_or_else(|| {
        ConfigError::MissingField(format!("repository for job '{}'", name))
    })?;

    let mut job = Job::new(name, repository);
    if let Some(branch) = branch {
        job.branch = branch;
    }
    if let Some(script_path) = script_path {
        job.script_path = script_path;
    }
    job.parameter = parameter;
    Ok(job)
}

fn parse_parameter(node: &KdlNode, job: &str) -> ConfigResult<ChoiceParameter> {
    let name = get_first_string_arg(node)
        .ok_or_else(|| ConfigError::MissingField(format!("parameter name for job '{}'", job)))?;

    let choices = get_string_list_prop(node, "choices");
    if choices.is_empty() {
        return Err(ConfigError::InvalidValue {
            field: format!("parameter '{}'", name),
            message: "at least one choice is required".to_string(),
        });
    }

    Ok(ChoiceParameter {
        name,
        description: get_string_prop(node, "description").unwrap_or_default(),
        choices,
    })
}

// Helper functions for extracting values from KDL nodes

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_all_string_args(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}

fn get_string_prop(node: &KdlNode, name: &str) -> Option<String> {
    node.get(name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

fn get_policy_prop(node: &KdlNode, name: &str) -> ConfigResult<Option<UnknownPolicy>> {
    match get_string_prop(node, name) {
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|message| ConfigError::InvalidValue {
                field: format!("unknown {}", name),
                message,
            }),
        None => Ok(None),
    }
}

fn get_string_list_prop(node: &KdlNode, name: &str) -> Vec<String> {
    let mut result = Vec::new();

    // Repeated properties: choices="dev" choices="prod"
    for entry in node.entries() {
        if let Some(entry_name) = entry.name() {
            if entry_name.value() == name {
                if let Some(s) = entry.value().as_string() {
                    result.push(s.to_string());
                }
            }
        }
    }

    if !result.is_empty() {
        return result;
    }

    // Block syntax: { choices "dev" "prod" }
    if let Some(children) = node.children() {
        for child in children.nodes() {
            if child.name().value() == name {
                return get_all_string_args(child);
            }
        }
    }

    Vec::new()
}
