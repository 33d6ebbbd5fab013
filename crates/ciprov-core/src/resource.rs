//! Desired-resource model.

use derive_more::Display;

use crate::Secret;

/// The kinds of remote resource ciprov knows how to reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ResourceKind {
    #[display("plugin")]
    Plugin,
    #[display("credential")]
    Credential,
    #[display("job")]
    Job,
}

/// Identity of a resource: its kind plus the name/id used for lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display)]
#[display("{kind} '{name}'")]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub name: String,
}

impl ResourceRef {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

/// An orchestrator plugin, always installed at its latest version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plugin {
    pub name: String,
}

impl Plugin {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A secret-text credential stored in the orchestrator's global credential domain.
#[derive(Debug, Clone)]
pub struct Credential {
    /// Stable identifier used for both lookup and creation.
    pub id: String,
    pub secret: Secret,
    pub description: String,
}

/// A single choice build parameter (e.g. `TARGET` with `dev`/`prod`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceParameter {
    pub name: String,
    pub description: String,
    /// Ordered; the first entry is the default selection.
    pub choices: Vec<String>,
}

/// A pipeline job whose definition is read from a file in a Git repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Job name, also used as the remote path segment.
    pub name: String,
    pub repository_url: String,
    /// Branch specifier (e.g. `*/main`).
    pub branch: String,
    /// Path of the pipeline descriptor within the repository.
    pub script_path: String,
    pub parameter: Option<ChoiceParameter>,
}

impl Job {
    pub const DEFAULT_BRANCH: &'static str = "*/main";
    pub const DEFAULT_SCRIPT_PATH: &'static str = "Jenkinsfile";

    /// A job with the default branch spec and script path.
    pub fn new(name: impl Into<String>, repository_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            repository_url: repository_url.into(),
            branch: Self::DEFAULT_BRANCH.to_string(),
            script_path: Self::DEFAULT_SCRIPT_PATH.to_string(),
            parameter: None,
        }
    }
}

/// One desired resource.
#[derive(Debug, Clone)]
pub enum Resource {
    Plugin(Plugin),
    Credential(Credential),
    Job(Job),
}

impl Resource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::Plugin(_) => ResourceKind::Plugin,
            Resource::Credential(_) => ResourceKind::Credential,
            Resource::Job(_) => ResourceKind::Job,
        }
    }

    pub fn identity(&self) -> ResourceRef {
        let name = match self {
            Resource::Plugin(p) => p.name.clone(),
            Resource::Credential(c) => c.id.clone(),
            Resource::Job(j) => j.name.clone(),
        };
        ResourceRef::new(self.kind(), name)
    }
}

/// The full desired state for one reconciliation run.
///
/// Plugins are processed in the given order; the credential and job are optional so that
/// callers can skip either step.
#[derive(Debug, Clone, Default)]
pub struct DesiredState {
    pub plugins: Vec<Plugin>,
    pub credential: Option<Credential>,
    pub job: Option<Job>,
}

impl DesiredState {
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty() && self.credential.is_none() && self.job.is_none()
    }

    /// Resources in reconciliation order: plugins, then credential, then job.
    pub fn resources(&self) -> Vec<Resource> {
        let mut resources: Vec<Resource> =
            self.plugins.iter().cloned().map(Resource::Plugin).collect();
        if let Some(credential) = &self.credential {
            resources.push(Resource::Credential(credential.clone()));
        }
        if let Some(job) = &self.job {
            resources.push(Resource::Job(job.clone()));
        }
        resources
    }
}

/// Result of a read-only existence check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExistenceState {
    Present,
    Absent,
    /// The read was ambiguous (transport error, unexpected status, undecodable body).
    Unknown(String),
}

impl ExistenceState {
    pub fn is_present(&self) -> bool {
        matches!(self, ExistenceState::Present)
    }
}

/// What to do when existence cannot be determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownPolicy {
    /// Treat the resource as absent and issue the create call.
    #[default]
    AttemptCreate,
    /// Record a failure for the resource without mutating anything.
    Fail,
}

impl std::str::FromStr for UnknownPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "attempt-create" | "attempt_create" => Ok(UnknownPolicy::AttemptCreate),
            "fail" => Ok(UnknownPolicy::Fail),
            other => Err(format!("unknown policy '{}'", other)),
        }
    }
}

/// [`UnknownPolicy`] per resource kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnknownPolicies {
    pub plugin: UnknownPolicy,
    pub credential: UnknownPolicy,
    pub job: UnknownPolicy,
}

impl UnknownPolicies {
    pub fn for_kind(&self, kind: ResourceKind) -> UnknownPolicy {
        match kind {
            ResourceKind::Plugin => self.plugin,
            ResourceKind::Credential => self.credential,
            ResourceKind::Job => self.job,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_order() {
        let state = DesiredState {
            plugins: vec![Plugin::new("git"), Plugin::new("ws-cleanup")],
            credential: Some(Credential {
                id: "databricks-pat".to_string(),
                secret: Secret::new("x"),
                description: String::new(),
            }),
            job: Some(Job::new("etl", "https://example.com/repo.git")),
        };

        let identities: Vec<String> = state
            .resources()
            .iter()
            .map(|r| r.identity().to_string())
            .collect();
        assert_eq!(
            identities,
            vec![
                "plugin 'git'",
                "plugin 'ws-cleanup'",
                "credential 'databricks-pat'",
                "job 'etl'"
            ]
        );
    }

    #[test]
    fn test_job_defaults() {
        let job = Job::new("etl", "https://example.com/repo.git");
        assert_eq!(job.branch, "*/main");
        assert_eq!(job.script_path, "Jenkinsfile");
        assert!(job.parameter.is_none());
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!(
            "attempt-create".parse::<UnknownPolicy>(),
            Ok(UnknownPolicy::AttemptCreate)
        );
        assert_eq!("fail".parse::<UnknownPolicy>(), Ok(UnknownPolicy::Fail));
        assert!("retry".parse::<UnknownPolicy>().is_err());
    }
}
