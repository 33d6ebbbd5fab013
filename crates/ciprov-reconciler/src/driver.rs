//! Reconciliation driver - converges the orchestrator on a desired state, one resource at a
//! time.

use ciprov_core::{
    DesiredState, ExistenceState, ReconciliationReport, ReportEntry, Resource, ResourceKind,
    ResourceOutcome, ResourceRef, UnknownPolicies, UnknownPolicy,
};
use ciprov_remote::{ExistenceChecker, Installer, PluginListing, ProbeFailure, Prober, Transport};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Pause after each accepted plugin install; the plugin manager misbehaves when installs are
/// triggered back to back.
pub const DEFAULT_PLUGIN_DELAY: Duration = Duration::from_secs(2);

const JOB_EXISTS_NOTE: &str = "update it manually or delete it first";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileSettings {
    pub plugin_delay: Duration,
    pub unknown: UnknownPolicies,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            plugin_delay: DEFAULT_PLUGIN_DELAY,
            unknown: UnknownPolicies::default(),
        }
    }
}

/// Progress emitted while reconciling.
#[derive(Debug, Clone)]
pub enum ReconcileEvent {
    Probing,
    Connected,
    ConnectionFailed { failure: ProbeFailure },
    PluginListing { installed: Option<usize> },
    ResourceStarted { resource: ResourceRef },
    ResourceCompleted { entry: ReportEntry },
    Completed { success: bool },
}

/// Drives one reconciliation run against a single orchestrator.
#[derive(Clone)]
pub struct Reconciler {
    transport: Arc<dyn Transport>,
    settings: ReconcileSettings,
}

impl Reconciler {
    pub fn new(transport: Arc<dyn Transport>, settings: ReconcileSettings) -> Self {
        Self {
            transport,
            settings,
        }
    }

    /// Reconcile in a background task, returning a channel of progress events and a handle
    /// to the final report.
    pub fn execute(
        &self,
        desired: DesiredState,
    ) -> (
        mpsc::Receiver<ReconcileEvent>,
        tokio::task::JoinHandle<ReconciliationReport>,
    ) {
        let (tx, rx) = mpsc::channel(100);
        let reconciler = self.clone();

        let handle = tokio::spawn(async move { reconciler.reconcile(&desired, &tx).await });

        (rx, handle)
    }

    /// Reconcile without progress events.
    pub async fn run(&self, desired: &DesiredState) -> ReconciliationReport {
        let (tx, _) = mpsc::channel(1);
        self.reconcile(desired, &tx).await
    }

    /// Probe, then plugins in order, then the credential, then the job. A plugin named more
    /// than once is reconciled once, at its first position.
    ///
    /// Strictly sequential: each check-then-create pair, including the plugin delay,
    /// finishes before the next resource is looked at.
    pub async fn reconcile(
        &self,
        desired: &DesiredState,
        tx: &mpsc::Sender<ReconcileEvent>,
    ) -> ReconciliationReport {
        let prober = Prober::new(self.transport.clone());
        let checker = ExistenceChecker::new(self.transport.clone());
        let installer = Installer::new(self.transport.clone());

        let _ = tx.send(ReconcileEvent::Probing).await;
        if let Err(failure) = prober.probe().await {
            error!(error = %failure, "Aborting: orchestrator is not reachable");
            let report = ReconciliationReport::aborted(failure.to_string());
            let _ = tx.send(ReconcileEvent::ConnectionFailed { failure }).await;
            let _ = tx.send(ReconcileEvent::Completed { success: false }).await;
            return report;
        }
        let _ = tx.send(ReconcileEvent::Connected).await;

        let mut report = ReconciliationReport::default();

        if !desired.plugins.is_empty() {
            let listing = checker.plugin_listing().await;
            let installed = match &listing {
                PluginListing::Known(plugins) => Some(plugins.len()),
                PluginListing::Unavailable(_) => None,
            };
            let _ = tx.send(ReconcileEvent::PluginListing { installed }).await;

            let mut seen = HashSet::new();
            for plugin in &desired.plugins {
                if !seen.insert(plugin.name.as_str()) {
                    debug!(plugin = %plugin.name, "Skipping repeated plugin");
                    continue;
                }
                let state = listing.state_of(&plugin.name);
                let resource = Resource::Plugin(plugin.clone());
                let entry = self.reconcile_one(&resource, state, &installer, tx).await;
                let created = entry.outcome == ResourceOutcome::Created;
                report.push(entry);

                if created && !self.settings.plugin_delay.is_zero() {
                    tokio::time::sleep(self.settings.plugin_delay).await;
                }
            }
        }

        if let Some(credential) = &desired.credential {
            let state = checker.credential(&credential.id).await;
            let resource = Resource::Credential(credential.clone());
            report.push(self.reconcile_one(&resource, state, &installer, tx).await);
        }

        if let Some(job) = &desired.job {
            let state = checker.job(&job.name).await;
            let resource = Resource::Job(job.clone());
            report.push(self.reconcile_one(&resource, state, &installer, tx).await);
        }

        let success = report.success();
        info!(
            success,
            resources = report.entries.len(),
            failed = report.failures().count(),
            "Reconciliation finished"
        );
        let _ = tx.send(ReconcileEvent::Completed { success }).await;

        report
    }

    async fn reconcile_one(
        &self,
        resource: &Resource,
        state: ExistenceState,
        installer: &Installer,
        tx: &mpsc::Sender<ReconcileEvent>,
    ) -> ReportEntry {
        let identity = resource.identity();
        let _ = tx
            .send(ReconcileEvent::ResourceStarted {
                resource: identity.clone(),
            })
            .await;

        let mut note = None;
        let outcome = match state {
            ExistenceState::Present => {
                if resource.kind() == ResourceKind::Job {
                    // Re-creating over an existing job is refused or clobbers its config.
                    note = Some(JOB_EXISTS_NOTE.to_string());
                }
                ResourceOutcome::AlreadyPresent
            }
            ExistenceState::Absent => installer.create(resource).await,
            ExistenceState::Unknown(reason) => {
                match self.settings.unknown.for_kind(resource.kind()) {
                    UnknownPolicy::AttemptCreate => {
                        warn!(resource = %identity, %reason, "Existence unknown, attempting create");
                        installer.create(resource).await
                    }
                    UnknownPolicy::Fail => {
                        warn!(resource = %identity, %reason, "Existence unknown, not creating");
                        ResourceOutcome::failed(format!(
                            "could not determine whether it exists: {}",
                            reason
                        ))
                    }
                }
            }
        };

        match &outcome {
            ResourceOutcome::Failed { reason } => {
                error!(resource = %identity, %reason, "Resource failed")
            }
            other => info!(resource = %identity, outcome = ?other, "Resource reconciled"),
        }

        let entry = ReportEntry {
            resource: identity,
            outcome,
            note,
        };
        let _ = tx
            .send(ReconcileEvent::ResourceCompleted {
                entry: entry.clone(),
            })
            .await;
        entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ciprov_core::{ChoiceParameter, Credential, Job, Plugin, Secret};
    use ciprov_remote::{Method, Request, Response, TransportError};
    use std::sync::Mutex;

    /// In-memory orchestrator answering the endpoints the driver uses.
    #[derive(Default)]
    struct FakeOrchestrator {
        state: Mutex<FakeState>,
    }

    #[derive(Default)]
    struct FakeState {
        unreachable: bool,
        probe_status: Option<u16>,
        listing_status: Option<u16>,
        plugins: HashSet<String>,
        rejected_plugins: HashSet<String>,
        credentials: HashSet<String>,
        /// Credential detail reads answer 404 this many times regardless of state.
        hidden_credential_reads: usize,
        jobs: HashSet<String>,
        calls: Vec<(Method, String)>,
    }

    impl FakeOrchestrator {
        fn with(configure: impl FnOnce(&mut FakeState)) -> Arc<Self> {
            let fake = Self::default();
            configure(&mut fake.state.lock().unwrap());
            Arc::new(fake)
        }

        fn calls(&self) -> Vec<(Method, String)> {
            self.state.lock().unwrap().calls.clone()
        }

        fn posts(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter(|(m, _)| *m == Method::Post)
                .map(|(_, p)| p)
                .collect()
        }
    }

    fn between<'a>(text: &'a str, start: &str, end: &str) -> &'a str {
        let from = text.find(start).map(|i| i + start.len()).unwrap_or(0);
        let to = text[from..].find(end).map(|i| from + i).unwrap_or(text.len());
        &text[from..to]
    }

    #[async_trait::async_trait]
    impl Transport for FakeOrchestrator {
        async fn send(&self, request: Request) -> Result<Response, TransportError> {
            let mut state = self.state.lock().unwrap();
            state.calls.push((request.method, request.path.clone()));
            if state.unreachable {
                return Err(TransportError::Connect("connection refused".to_string()));
            }

            let body = request.body.unwrap_or_default();
            let path = request.path.as_str();
            let response = match (request.method, path) {
                (Method::Get, "/api/json") => Response::new(state.probe_status.unwrap_or(200), "{}"),
                (Method::Get, "/pluginManager/api/json?depth=1") => {
                    match state.listing_status {
                        Some(status) => Response::new(status, ""),
                        None => {
                            let plugins: Vec<String> = state
                                .plugins
                                .iter()
                                .map(|p| format!(r#"{{"shortName":"{}"}}"#, p))
                                .collect();
                            Response::new(200, format!(r#"{{"plugins":[{}]}}"#, plugins.join(",")))
                        }
                    }
                }
                (Method::Post, "/pluginManager/installNecessaryPlugins") => {
                    let name = between(&body, "plugin=\"", "@latest").to_string();
                    if state.rejected_plugins.contains(&name) {
                        Response::new(500, "install failed")
                    } else {
                        state.plugins.insert(name);
                        Response::new(200, "")
                    }
                }
                (Method::Post, "/credentials/store/system/domain/_/createCredentials") => {
                    let id = between(&body, "<id>", "</id>").to_string();
                    if state.credentials.insert(id) {
                        Response::new(302, "")
                    } else {
                        Response::new(400, "duplicate id")
                    }
                }
                (Method::Get, p) if p.starts_with("/credentials/") => {
                    let id = between(p, "/credential/", "/api/json").to_string();
                    if state.hidden_credential_reads > 0 {
                        state.hidden_credential_reads -= 1;
                        Response::new(404, "")
                    } else if state.credentials.contains(&id) {
                        Response::new(200, "{}")
                    } else {
                        Response::new(404, "")
                    }
                }
                (Method::Get, p) if p.starts_with("/job/") => {
                    let name = between(p, "/job/", "/api/json").to_string();
                    let status = if state.jobs.contains(&name) { 200 } else { 404 };
                    Response::new(status, "")
                }
                (Method::Post, p) if p.starts_with("/createItem?name=") => {
                    let name = p.trim_start_matches("/createItem?name=").to_string();
                    if state.jobs.insert(name) {
                        Response::new(200, "")
                    } else {
                        Response::new(400, "A job already exists with the name")
                    }
                }
                _ => Response::new(404, "not found"),
            };
            Ok(response)
        }
    }

    fn settings() -> ReconcileSettings {
        ReconcileSettings {
            plugin_delay: Duration::ZERO,
            unknown: UnknownPolicies::default(),
        }
    }

    fn reconciler(fake: &Arc<FakeOrchestrator>, settings: ReconcileSettings) -> Reconciler {
        Reconciler::new(fake.clone(), settings)
    }

    fn plugins(names: &[&str]) -> Vec<Plugin> {
        names.iter().map(|n| Plugin::new(*n)).collect()
    }

    fn full_state() -> DesiredState {
        let mut job = Job::new("databricks-elt-pipeline", "https://github.com/org/repo.git");
        job.parameter = Some(ChoiceParameter {
            name: "TARGET".to_string(),
            description: "Databricks bundle target environment".to_string(),
            choices: vec!["dev".to_string(), "prod".to_string()],
        });
        DesiredState {
            plugins: plugins(&["workflow-aggregator", "git", "credentials-binding", "ws-cleanup"]),
            credential: Some(Credential {
                id: "databricks-pat".to_string(),
                secret: Secret::new("dapi123"),
                description: "Databricks PAT for bundle operations".to_string(),
            }),
            job: Some(job),
        }
    }

    fn plugin_ref(name: &str) -> ResourceRef {
        ResourceRef::new(ResourceKind::Plugin, name)
    }

    #[tokio::test]
    async fn test_installs_only_missing_plugins() {
        let fake = FakeOrchestrator::with(|s| {
            s.plugins.insert("git".to_string());
        });
        let desired = DesiredState {
            plugins: plugins(&["git", "ws-cleanup"]),
            ..Default::default()
        };

        let report = reconciler(&fake, settings()).run(&desired).await;

        assert!(report.success());
        assert_eq!(
            report.outcome_of(&plugin_ref("git")),
            Some(&ResourceOutcome::AlreadyPresent)
        );
        assert_eq!(
            report.outcome_of(&plugin_ref("ws-cleanup")),
            Some(&ResourceOutcome::Created)
        );
        assert_eq!(fake.posts(), vec!["/pluginManager/installNecessaryPlugins"]);
    }

    #[tokio::test]
    async fn test_repeated_plugin_is_installed_once() {
        let fake = FakeOrchestrator::with(|_| {});
        let desired = DesiredState {
            plugins: plugins(&["git", "ws-cleanup", "git"]),
            ..Default::default()
        };

        let report = reconciler(&fake, settings()).run(&desired).await;

        assert!(report.success());
        let names: Vec<&str> = report
            .entries
            .iter()
            .map(|e| e.resource.name.as_str())
            .collect();
        assert_eq!(names, vec!["git", "ws-cleanup"]);
        assert_eq!(fake.posts().len(), 2);
    }

    #[tokio::test]
    async fn test_same_plugin_twice_posts_once() {
        let fake = FakeOrchestrator::with(|_| {});
        let desired = DesiredState {
            plugins: plugins(&["git", "git"]),
            ..Default::default()
        };

        let report = reconciler(&fake, settings()).run(&desired).await;

        assert_eq!(report.entries.len(), 1);
        assert_eq!(fake.posts().len(), 1);
    }

    #[tokio::test]
    async fn test_second_run_is_all_already_present() {
        let fake = FakeOrchestrator::with(|_| {});
        let desired = full_state();
        let reconciler = reconciler(&fake, settings());

        let first = reconciler.run(&desired).await;
        assert!(first.success());
        assert!(
            first
                .entries
                .iter()
                .all(|e| e.outcome == ResourceOutcome::Created)
        );

        let posts_after_first = fake.posts().len();
        let second = reconciler.run(&desired).await;
        assert!(second.success());
        assert_eq!(second.entries.len(), 6);
        assert!(
            second
                .entries
                .iter()
                .all(|e| e.outcome == ResourceOutcome::AlreadyPresent)
        );
        assert_eq!(fake.posts().len(), posts_after_first);
    }

    #[tokio::test]
    async fn test_probe_rejection_touches_nothing() {
        let fake = FakeOrchestrator::with(|s| s.probe_status = Some(401));

        let report = reconciler(&fake, settings()).run(&full_state()).await;

        assert!(!report.success());
        assert!(report.entries.is_empty());
        assert_eq!(report.aborted.as_deref(), Some("Failed to connect (HTTP 401)"));
        assert_eq!(fake.calls(), vec![(Method::Get, "/api/json".to_string())]);
    }

    #[tokio::test]
    async fn test_unreachable_orchestrator_aborts() {
        let fake = FakeOrchestrator::with(|s| s.unreachable = true);

        let report = reconciler(&fake, settings()).run(&full_state()).await;

        assert!(!report.success());
        assert!(report.entries.is_empty());
        assert!(report.aborted.unwrap().starts_with("Connection error"));
        assert_eq!(fake.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_created_credential_then_exists() {
        let fake = FakeOrchestrator::with(|_| {});
        let desired = DesiredState {
            credential: full_state().credential,
            ..Default::default()
        };

        let report = reconciler(&fake, settings()).run(&desired).await;
        assert!(report.success());

        let checker = ExistenceChecker::new(fake.clone());
        assert_eq!(
            checker.credential("databricks-pat").await,
            ExistenceState::Present
        );
    }

    #[tokio::test]
    async fn test_credential_conflict_resolves_to_already_present() {
        // The first read misses a credential that does exist; the create then answers 400
        // and the re-check finds it.
        let fake = FakeOrchestrator::with(|s| {
            s.credentials.insert("databricks-pat".to_string());
            s.hidden_credential_reads = 1;
        });
        let desired = DesiredState {
            credential: full_state().credential,
            ..Default::default()
        };

        let report = reconciler(&fake, settings()).run(&desired).await;

        assert!(report.success());
        assert_eq!(report.entries[0].outcome, ResourceOutcome::AlreadyPresent);
        assert_eq!(
            fake.posts(),
            vec!["/credentials/store/system/domain/_/createCredentials"]
        );
    }

    #[tokio::test]
    async fn test_existing_job_is_never_created() {
        let fake = FakeOrchestrator::with(|s| {
            s.jobs.insert("databricks-elt-pipeline".to_string());
        });
        let desired = DesiredState {
            job: full_state().job,
            ..Default::default()
        };

        let report = reconciler(&fake, settings()).run(&desired).await;

        assert!(report.success());
        let entry = &report.entries[0];
        assert_eq!(entry.outcome, ResourceOutcome::AlreadyPresent);
        assert_eq!(entry.note.as_deref(), Some(JOB_EXISTS_NOTE));
        assert!(fake.posts().is_empty());
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_remaining_resources() {
        let fake = FakeOrchestrator::with(|s| {
            s.rejected_plugins.insert("git".to_string());
        });

        let report = reconciler(&fake, settings()).run(&full_state()).await;

        assert!(!report.success());
        let failed: Vec<String> = report.failures().map(|e| e.resource.name.clone()).collect();
        assert_eq!(failed, vec!["git"]);
        assert_eq!(report.entries.len(), 6);
        assert_eq!(
            report.outcome_of(&ResourceRef::new(ResourceKind::Job, "databricks-elt-pipeline")),
            Some(&ResourceOutcome::Created)
        );
    }

    #[tokio::test]
    async fn test_unknown_listing_attempts_install_by_default() {
        let fake = FakeOrchestrator::with(|s| {
            s.listing_status = Some(500);
            s.plugins.insert("git".to_string());
        });
        let desired = DesiredState {
            plugins: plugins(&["git"]),
            ..Default::default()
        };

        let report = reconciler(&fake, settings()).run(&desired).await;

        assert!(report.success());
        assert_eq!(report.entries[0].outcome, ResourceOutcome::Created);
    }

    #[tokio::test]
    async fn test_unknown_listing_with_fail_policy_does_not_mutate() {
        let fake = FakeOrchestrator::with(|s| s.listing_status = Some(500));
        let desired = DesiredState {
            plugins: plugins(&["git"]),
            ..Default::default()
        };
        let mut settings = settings();
        settings.unknown.plugin = UnknownPolicy::Fail;

        let report = reconciler(&fake, settings).run(&desired).await;

        assert!(!report.success());
        assert!(report.entries[0].outcome.is_failure());
        assert!(fake.posts().is_empty());
    }

    #[tokio::test]
    async fn test_skipped_steps_make_no_calls() {
        let fake = FakeOrchestrator::with(|_| {});

        let report = reconciler(&fake, settings())
            .run(&DesiredState::default())
            .await;

        assert!(report.success());
        assert!(report.entries.is_empty());
        assert_eq!(fake.calls(), vec![(Method::Get, "/api/json".to_string())]);
    }

    #[tokio::test]
    async fn test_execute_streams_one_completion_per_resource() {
        let fake = FakeOrchestrator::with(|_| {});
        let (mut rx, handle) = reconciler(&fake, settings()).execute(full_state());

        let mut started = Vec::new();
        let mut completed = Vec::new();
        let mut last = None;
        while let Some(event) = rx.recv().await {
            match &event {
                ReconcileEvent::ResourceStarted { resource } => started.push(resource.to_string()),
                ReconcileEvent::ResourceCompleted { entry } => {
                    // Every resource is announced before it completes.
                    assert_eq!(started.last(), Some(&entry.resource.to_string()));
                    completed.push(entry.resource.to_string());
                }
                _ => {}
            }
            last = Some(event);
        }

        let report = handle.await.unwrap();
        assert!(report.success());
        assert_eq!(started, completed);
        assert_eq!(completed.len(), 6);
        assert_eq!(completed[5], "job 'databricks-elt-pipeline'");
        assert!(matches!(last, Some(ReconcileEvent::Completed { success: true })));
    }

    #[tokio::test]
    async fn test_delay_follows_each_created_plugin() {
        let fake = FakeOrchestrator::with(|_| {});
        let desired = DesiredState {
            plugins: plugins(&["git", "ws-cleanup"]),
            ..Default::default()
        };
        let mut settings = settings();
        settings.plugin_delay = Duration::from_millis(40);

        let started = std::time::Instant::now();
        let report = reconciler(&fake, settings).run(&desired).await;

        assert!(report.success());
        assert!(started.elapsed() >= Duration::from_millis(80));
    }

    #[tokio::test]
    async fn test_no_delay_for_present_or_failed_plugins() {
        let fake = FakeOrchestrator::with(|s| {
            s.plugins.insert("git".to_string());
            s.rejected_plugins.insert("broken".to_string());
        });
        let desired = DesiredState {
            plugins: plugins(&["git", "broken"]),
            ..Default::default()
        };
        let mut settings = settings();
        settings.plugin_delay = Duration::from_secs(30);

        let report = tokio::time::timeout(
            Duration::from_secs(5),
            reconciler(&fake, settings).run(&desired),
        )
        .await
        .expect("no delay expected");

        assert_eq!(report.entries.len(), 2);
        assert!(!report.success());
    }
}
