//! Mutating calls: install plugins, create credentials and jobs.

use ciprov_core::{
    Credential, ExistenceState, Job, Plugin, Resource, ResourceOutcome, excerpt, payload,
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::api;
use crate::existence::ExistenceChecker;
use crate::transport::{Request, Response, Transport, WRITE_TIMEOUT};

/// Body excerpt length for credential failures.
const CREDENTIAL_EXCERPT: usize = 200;
/// Job failures often come back as large HTML pages; keep a little more context.
const JOB_EXCERPT: usize = 500;

/// Issues the create call for a resource and classifies the outcome.
///
/// Nothing here retries; a `Failed` outcome is returned to the caller, who moves on to the
/// next resource.
pub struct Installer {
    transport: Arc<dyn Transport>,
    checker: ExistenceChecker,
}

impl Installer {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            checker: ExistenceChecker::new(transport.clone()),
            transport,
        }
    }

    pub async fn create(&self, resource: &Resource) -> ResourceOutcome {
        match resource {
            Resource::Plugin(plugin) => self.install_plugin(plugin).await,
            Resource::Credential(credential) => self.create_credential(credential).await,
            Resource::Job(job) => self.create_job(job).await,
        }
    }

    /// `Created` means the install request was accepted; installation itself is
    /// asynchronous on the server. The plugin manager answers with a redirect to the
    /// update center, which is followed to its final status.
    pub async fn install_plugin(&self, plugin: &Plugin) -> ResourceOutcome {
        let body = match payload::plugin_install(plugin) {
            Ok(body) => body,
            Err(e) => return ResourceOutcome::failed(e.to_string()),
        };

        let request =
            Request::post_xml(api::PLUGIN_INSTALL, body, WRITE_TIMEOUT).following_redirects();
        match self.send(request).await {
            Ok(response) if response.is_success() => {
                info!(plugin = %plugin.name, "Plugin installation initiated");
                ResourceOutcome::Created
            }
            Ok(response) => {
                warn!(plugin = %plugin.name, status = response.status, "Plugin install rejected");
                ResourceOutcome::failed(format!("HTTP {}", response.status))
            }
            Err(reason) => ResourceOutcome::failed(reason),
        }
    }

    /// A `400` from the credential store means either a malformed payload or a duplicate
    /// id, so it is disambiguated with a fresh existence check.
    pub async fn create_credential(&self, credential: &Credential) -> ResourceOutcome {
        let body = match payload::credential_descriptor(credential) {
            Ok(body) => body,
            Err(e) => return ResourceOutcome::failed(e.to_string()),
        };

        let request = Request::post_xml(api::CREDENTIAL_CREATE, body, WRITE_TIMEOUT);
        let response = match self.send(request).await {
            Ok(response) => response,
            Err(reason) => return ResourceOutcome::failed(reason),
        };

        if response.is_success() || response.is_redirect() {
            info!(credential = %credential.id, status = response.status, "Credential created");
            return ResourceOutcome::Created;
        }

        if response.status == 400 {
            warn!(credential = %credential.id, "Credential create returned 400, re-checking existence");
            if self.checker.credential(&credential.id).await == ExistenceState::Present {
                info!(credential = %credential.id, "Credential already exists");
                return ResourceOutcome::AlreadyPresent;
            }
        }

        warn!(credential = %credential.id, status = response.status, "Credential create failed");
        ResourceOutcome::failed(failure_reason(&response, CREDENTIAL_EXCERPT))
    }

    pub async fn create_job(&self, job: &Job) -> ResourceOutcome {
        let body = match payload::job_descriptor(job) {
            Ok(body) => body,
            Err(e) => return ResourceOutcome::failed(e.to_string()),
        };

        let request = Request::post_xml(api::create_item(&job.name), body, WRITE_TIMEOUT);
        match self.send(request).await {
            Ok(response) if response.is_success() || response.is_redirect() => {
                info!(job = %job.name, status = response.status, "Pipeline job created");
                ResourceOutcome::Created
            }
            Ok(response) => {
                warn!(job = %job.name, status = response.status, "Job creation failed");
                ResourceOutcome::failed(failure_reason(&response, JOB_EXCERPT))
            }
            Err(reason) => ResourceOutcome::failed(reason),
        }
    }

    async fn send(&self, request: Request) -> Result<Response, String> {
        let path = request.path.clone();
        self.transport.send(request).await.map_err(|e| {
            warn!(%path, error = %e, "Create call did not complete");
            e.to_string()
        })
    }
}

fn failure_reason(response: &Response, max_chars: usize) -> String {
    let body = excerpt(&response.body, max_chars);
    if body.is_empty() {
        format!("HTTP {}", response.status)
    } else {
        format!("HTTP {}: {}", response.status, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::HttpTransport;
    use ciprov_core::{ChoiceParameter, RemoteEndpoint, Secret};
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn installer_for(server: &MockServer) -> Installer {
        let endpoint = RemoteEndpoint::basic(&server.uri(), "admin", Secret::new("t")).unwrap();
        Installer::new(Arc::new(HttpTransport::new(endpoint).unwrap()))
    }

    fn credential() -> Credential {
        Credential {
            id: "databricks-pat".to_string(),
            secret: Secret::new("dapi123"),
            description: "Databricks PAT".to_string(),
        }
    }

    const CREDENTIAL_DETAIL: &str =
        "/credentials/store/system/domain/_/credential/databricks-pat/api/json";

    #[tokio::test]
    async fn test_plugin_install_accepted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/pluginManager/installNecessaryPlugins"))
            .and(body_string_contains(r#"plugin="ws-cleanup@latest""#))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = installer_for(&server)
            .install_plugin(&Plugin::new("ws-cleanup"))
            .await;
        assert_eq!(outcome, ResourceOutcome::Created);
    }

    #[tokio::test]
    async fn test_plugin_install_follows_redirect_to_update_center() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/pluginManager/installNecessaryPlugins"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("Location", "/pluginManager/updates/"),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/pluginManager/updates/"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = installer_for(&server)
            .install_plugin(&Plugin::new("ws-cleanup"))
            .await;
        assert_eq!(outcome, ResourceOutcome::Created);
    }

    #[tokio::test]
    async fn test_plugin_install_redirect_to_error_page_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/oops"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/oops"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let outcome = installer_for(&server)
            .install_plugin(&Plugin::new("git"))
            .await;
        assert_eq!(outcome, ResourceOutcome::failed("HTTP 500"));
    }

    #[tokio::test]
    async fn test_credential_created_on_redirect() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/credentials/store/system/domain/_/createCredentials"))
            .and(body_string_contains("<id>databricks-pat</id>"))
            .respond_with(ResponseTemplate::new(302))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = installer_for(&server).create_credential(&credential()).await;
        assert_eq!(outcome, ResourceOutcome::Created);
    }

    #[tokio::test]
    async fn test_job_redirect_is_not_followed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/createItem"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/job/etl/"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let job = Job::new("etl", "https://github.com/org/repo.git");
        let outcome = installer_for(&server).create_job(&job).await;
        assert_eq!(outcome, ResourceOutcome::Created);
    }

    #[tokio::test]
    async fn test_credential_400_with_existing_id_is_already_present() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/credentials/store/system/domain/_/createCredentials"))
            .respond_with(ResponseTemplate::new(400).set_body_string("duplicate"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(CREDENTIAL_DETAIL))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = installer_for(&server).create_credential(&credential()).await;
        assert_eq!(outcome, ResourceOutcome::AlreadyPresent);
    }

    #[tokio::test]
    async fn test_credential_400_without_existing_id_fails_with_excerpt() {
        let server = MockServer::start().await;
        let long_body = "x".repeat(1000);
        Mock::given(method("POST"))
            .and(path("/credentials/store/system/domain/_/createCredentials"))
            .respond_with(ResponseTemplate::new(400).set_body_string(long_body))
            .mount(&server)
            .await;

        let outcome = installer_for(&server).create_credential(&credential()).await;
        match outcome {
            ResourceOutcome::Failed { reason } => {
                assert!(reason.starts_with("HTTP 400: "));
                assert!(reason.ends_with("..."));
                assert!(reason.len() < 220);
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_credential_server_error_does_not_recheck() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let outcome = installer_for(&server).create_credential(&credential()).await;
        assert_eq!(outcome, ResourceOutcome::failed("HTTP 500"));
    }

    #[tokio::test]
    async fn test_job_created() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/createItem"))
            .and(query_param("name", "etl"))
            .and(body_string_contains("<string>prod</string>"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mut job = Job::new("etl", "https://github.com/org/repo.git");
        job.parameter = Some(ChoiceParameter {
            name: "TARGET".to_string(),
            description: String::new(),
            choices: vec!["dev".to_string(), "prod".to_string()],
        });

        let outcome = installer_for(&server).create_job(&job).await;
        assert_eq!(outcome, ResourceOutcome::Created);
    }

    #[tokio::test]
    async fn test_job_failure_carries_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/createItem"))
            .respond_with(ResponseTemplate::new(400).set_body_string("A job already exists"))
            .mount(&server)
            .await;

        let job = Job::new("etl", "https://github.com/org/repo.git");
        let outcome = installer_for(&server).create(&Resource::Job(job)).await;
        assert_eq!(
            outcome,
            ResourceOutcome::failed("HTTP 400: A job already exists")
        );
    }

    #[tokio::test]
    async fn test_invalid_payload_fails_without_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let outcome = installer_for(&server)
            .install_plugin(&Plugin::new("two words"))
            .await;
        assert!(outcome.is_failure());
    }
}
