//! Run controller - deploys each environment's configs in dependency order.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use monaco_config::{Config, ErrorPolicy, RunSettings};
use monaco_core::client::ClientSet;
use monaco_core::error::MissingReason;
use monaco_core::{Cancellation, Coordinate, DeployError, DeployWarning, EntityMap};
use monaco_deployer::{DeploymentEngine, RetryPolicy};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{error, info, warn};

use crate::graph::DependencyGraph;

/// State of a config during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigState {
    Pending,
    Deployed,
    Skipped,
    Failed,
}

impl ConfigState {
    /// Whether dependents may use this config's properties.
    pub fn is_success(&self) -> bool {
        matches!(self, ConfigState::Deployed)
    }
}

/// Result of deploying one environment.
#[derive(Debug)]
pub struct RunResult {
    pub environment: String,
    pub entities: EntityMap,
    /// Errors in the order they occurred.
    pub errors: Vec<DeployError>,
    pub warnings: Vec<DeployWarning>,
    pub states: BTreeMap<Coordinate, ConfigState>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunResult {
    fn new(environment: &str) -> Self {
        let now = Utc::now();
        Self {
            environment: environment.to_string(),
            entities: EntityMap::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            states: BTreeMap::new(),
            started_at: now,
            finished_at: now,
        }
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn state(&self, coordinate: &Coordinate) -> Option<ConfigState> {
        self.states.get(coordinate).copied()
    }

    fn fail(&mut self, coordinate: &Coordinate, err: DeployError) {
        self.states.insert(coordinate.clone(), ConfigState::Failed);
        self.errors.push(err);
    }

    /// The first reference of `config` whose target failed or was skipped.
    fn blocked_by(&self, config: &Config) -> Option<DeployError> {
        config
            .external_references()
            .into_iter()
            .find_map(|(parameter, reference)| {
                let reason = match self.states.get(&reference.coordinate)? {
                    ConfigState::Failed => MissingReason::TargetFailed,
                    ConfigState::Skipped => MissingReason::TargetSkipped,
                    ConfigState::Pending | ConfigState::Deployed => return None,
                };
                Some(DeployError::MissingReference {
                    coordinate: config.coordinate.clone(),
                    parameter: parameter.to_string(),
                    target: reference.coordinate,
                    property: reference.property,
                    reason,
                })
            })
    }

    /// Record a cancellation error for every config that has not run yet.
    fn cancel_remaining(&mut self, remaining: &[&Config]) {
        for config in remaining {
            if self.state(&config.coordinate) == Some(ConfigState::Pending) {
                self.fail(
                    &config.coordinate,
                    DeployError::Cancelled {
                        coordinate: config.coordinate.clone(),
                    },
                );
            }
        }
    }

    fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        info!(
            environment = %self.environment,
            deployed = self.entities.len(),
            errors = self.errors.len(),
            warnings = self.warnings.len(),
            "Environment finished"
        );
        self
    }
}

/// Orchestrates deployments of one or more environments.
pub struct RunController {
    settings: RunSettings,
    retry: RetryPolicy,
    cancel: Cancellation,
}

impl RunController {
    pub fn new(settings: RunSettings) -> Self {
        Self {
            retry: RetryPolicy::new(settings.retry),
            settings,
            cancel: Cancellation::new(),
        }
    }

    /// Replace the retry rules derived from the settings.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Use an externally controlled cancellation signal.
    pub fn with_cancellation(mut self, cancel: Cancellation) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> &Cancellation {
        &self.cancel
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Deploy every environment found in `configs`.
    ///
    /// Environments without an entry in `clients` get an empty client set, so
    /// each of their configs fails validation.
    pub async fn deploy_all(
        &self,
        configs: &[Config],
        clients: &BTreeMap<String, ClientSet>,
    ) -> Vec<RunResult> {
        let mut by_environment: BTreeMap<&str, Vec<&Config>> = BTreeMap::new();
        for config in configs {
            by_environment
                .entry(config.environment.as_str())
                .or_default()
                .push(config);
        }

        let runs = by_environment.into_iter().map(|(environment, configs)| {
            let clients = clients.get(environment).cloned().unwrap_or_default();
            async move {
                self.deploy_environment(environment, clients, configs)
                    .await
            }
        });

        if self.settings.parallel_environments {
            join_all(runs).await
        } else {
            let mut results = Vec::new();
            for run in runs {
                results.push(run.await);
            }
            results
        }
    }

    /// Deploy one environment's configs.
    pub async fn deploy_environment<'a>(
        &self,
        environment: &str,
        clients: ClientSet,
        configs: impl IntoIterator<Item = &'a Config>,
    ) -> RunResult {
        let mut run = RunResult::new(environment);
        let stop_on_error = self.settings.error_policy == ErrorPolicy::StopOnError;

        let graph = match DependencyGraph::build(environment, configs) {
            Ok(graph) => graph,
            Err(e) => {
                error!(environment, error = %e, "Failed to build dependency graph");
                run.errors.push(e);
                return run.finish();
            }
        };
        info!(environment, configs = graph.len(), "Deploying environment");

        for config in graph.configs() {
            run.states
                .insert(config.coordinate.clone(), ConfigState::Pending);
        }

        let schedule = graph.schedule();
        for err in schedule.errors {
            error!(environment, error = %err, "Configs cannot be scheduled");
            if let DeployError::CyclicDependency { cycle, blocked, .. } = &err {
                for coordinate in cycle.iter().chain(blocked) {
                    run.states.insert(coordinate.clone(), ConfigState::Failed);
                }
            }
            run.errors.push(err);
        }
        for err in missing_references(&graph) {
            error!(environment, error = %err, "Reference cannot be satisfied");
            if let Some(coordinate) = err.coordinate() {
                run.states.insert(coordinate.clone(), ConfigState::Failed);
            }
            run.errors.push(err);
        }
        if stop_on_error && !run.errors.is_empty() {
            return run.finish();
        }

        let engine = DeploymentEngine::new(
            clients,
            self.settings.env.clone(),
            self.retry.clone(),
            self.cancel.clone(),
        );

        for (position, config) in schedule.order.iter().enumerate() {
            let coordinate = &config.coordinate;
            if run.state(coordinate) != Some(ConfigState::Pending) {
                continue;
            }

            if self.cancel.is_cancelled() {
                warn!(environment, "Run cancelled, abandoning remaining configs");
                run.cancel_remaining(&schedule.order[position..]);
                break;
            }

            if !config.skip {
                if let Some(err) = run.blocked_by(config) {
                    warn!(config = %coordinate, error = %err, "Not deploying config");
                    run.fail(coordinate, err);
                    if stop_on_error {
                        break;
                    }
                    continue;
                }
            }

            match engine.deploy(config, &run.entities).await {
                Ok(deployment) => {
                    let state = if deployment.entity.skip {
                        ConfigState::Skipped
                    } else {
                        ConfigState::Deployed
                    };
                    run.warnings.extend(deployment.warnings);
                    match run.entities.insert(deployment.entity) {
                        Ok(()) => {
                            run.states.insert(coordinate.clone(), state);
                        }
                        Err(e) => run.fail(coordinate, e),
                    }
                }
                Err(e) if e.is_cancelled() => {
                    warn!(config = %coordinate, "Run cancelled, abandoning remaining configs");
                    run.cancel_remaining(&schedule.order[position..]);
                    break;
                }
                Err(e) => {
                    error!(config = %coordinate, error = %e, "Failed to deploy config");
                    run.fail(coordinate, e);
                    if stop_on_error {
                        break;
                    }
                }
            }
        }

        run.finish()
    }
}

/// References of non-skipped configs to coordinates outside the environment.
fn missing_references(graph: &DependencyGraph<'_>) -> Vec<DeployError> {
    let mut errors = Vec::new();
    for config in graph.configs().filter(|c| !c.skip) {
        let missing = config
            .external_references()
            .into_iter()
            .find(|(_, reference)| !graph.contains(&reference.coordinate));
        if let Some((parameter, reference)) = missing {
            errors.push(DeployError::MissingReference {
                coordinate: config.coordinate.clone(),
                parameter: parameter.to_string(),
                target: reference.coordinate,
                property: reference.property,
                reason: MissingReason::NotInDeploymentSet,
            });
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use monaco_config::{CompoundReference, ConfigType, Parameter, RetrySettings, Template};
    use monaco_core::Value;
    use monaco_core::client::{
        ApiResponse, BucketClient, ClassicApi, ClassicConfigClient, ClientError, ClientResult,
        RemoteEntity,
    };
    use monaco_deployer::DryRunClient;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn coord(id: &str) -> Coordinate {
        Coordinate::new("project", "alerting-profile", id)
    }

    fn make_config(id: &str, params: Vec<(&str, Parameter)>) -> Config {
        Config {
            coordinate: coord(id),
            template: Template::inline(id, r#"{"name": "{{ .name }}"}"#),
            config_type: ConfigType::ClassicApi {
                api: ClassicApi::unique("alerting-profile"),
            },
            parameters: params
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            skip: false,
            environment: "dev".to_string(),
            group: "default".to_string(),
            origin_object_id: None,
        }
    }

    fn named(id: &str) -> Config {
        make_config(id, vec![("name", Parameter::value(id.to_uppercase()))])
    }

    fn referencing(id: &str, target: &str) -> Config {
        make_config(
            id,
            vec![
                ("name", Parameter::value(id.to_uppercase())),
                ("ref", Parameter::reference(coord(target), "name")),
            ],
        )
    }

    fn dashboard(id: &str, name: &str) -> Config {
        let mut config = make_config(id, vec![("name", Parameter::value(name))]);
        config.config_type = ConfigType::ClassicApi {
            api: ClassicApi::non_unique("dashboard"),
        };
        config
    }

    fn settings() -> RunSettings {
        RunSettings::default().with_retry(RetrySettings::default().without_waits())
    }

    #[tokio::test]
    async fn test_reference_resolves_to_deployed_name() {
        let client = DryRunClient::new();
        let controller = RunController::new(settings());
        let configs = vec![referencing("b", "a"), named("a")];

        let result = controller
            .deploy_environment("dev", client.client_set(), &configs)
            .await;

        assert!(result.is_success(), "{:?}", result.errors);
        assert_eq!(result.entities.get(&coord("a")).unwrap().entity_name, "A");
        assert_eq!(
            result.entities.get(&coord("b")).unwrap().properties["ref"],
            Value::from("A")
        );
        assert_eq!(client.write_count().await, 2);
    }

    #[tokio::test]
    async fn test_cycle_makes_no_calls() {
        let client = DryRunClient::new();
        let controller = RunController::new(settings().continue_on_error());
        let configs = vec![referencing("a", "b"), referencing("b", "a")];

        let result = controller
            .deploy_environment("dev", client.client_set(), &configs)
            .await;

        assert_eq!(result.errors.len(), 1);
        match &result.errors[0] {
            DeployError::CyclicDependency { cycle, .. } => {
                assert_eq!(cycle, &[coord("a"), coord("b")]);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(client.calls().await.is_empty());
        assert!(result.entities.is_empty());
    }

    #[tokio::test]
    async fn test_continue_on_error_deploys_unrelated_configs() {
        let client = DryRunClient::new();
        let controller = RunController::new(settings().continue_on_error());
        let configs = vec![make_config("x", vec![]), named("y")];

        let result = controller
            .deploy_environment("dev", client.client_set(), &configs)
            .await;

        assert_eq!(result.errors.len(), 1);
        assert!(matches!(
            &result.errors[0],
            DeployError::Validation { coordinate, .. } if *coordinate == coord("x")
        ));
        assert!(result.entities.get(&coord("y")).unwrap().id().is_some());
        assert_eq!(result.state(&coord("x")), Some(ConfigState::Failed));
    }

    #[tokio::test]
    async fn test_stop_on_error_abandons_the_rest() {
        let client = DryRunClient::new();
        let controller = RunController::new(settings());
        let configs = vec![make_config("x", vec![]), named("y")];

        let result = controller
            .deploy_environment("dev", client.client_set(), &configs)
            .await;

        assert_eq!(result.errors.len(), 1);
        assert!(result.entities.is_empty());
        assert_eq!(result.state(&coord("y")), Some(ConfigState::Pending));
        assert!(client.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_skipped_target_fails_dependent() {
        let client = DryRunClient::new();
        let controller = RunController::new(settings().continue_on_error());
        let mut target = named("a");
        target.skip = true;
        let configs = vec![target, referencing("b", "a")];

        let result = controller
            .deploy_environment("dev", client.client_set(), &configs)
            .await;

        assert_eq!(result.errors.len(), 1);
        assert!(matches!(
            &result.errors[0],
            DeployError::MissingReference {
                reason: MissingReason::TargetSkipped,
                ..
            }
        ));
        assert!(result.entities.get(&coord("a")).unwrap().skip);
        assert_eq!(result.state(&coord("a")), Some(ConfigState::Skipped));
        assert!(client.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_failure_propagates_along_chain() {
        let client = DryRunClient::new();
        let controller = RunController::new(settings().continue_on_error());
        let configs = vec![
            make_config(
                "a",
                vec![("other", Parameter::value("no name"))],
            ),
            referencing("b", "a"),
            referencing("c", "b"),
            named("d"),
        ];

        let result = controller
            .deploy_environment("dev", client.client_set(), &configs)
            .await;

        assert_eq!(result.errors.len(), 3);
        assert!(matches!(result.errors[0], DeployError::Validation { .. }));
        for (err, id) in result.errors[1..].iter().zip(["b", "c"]) {
            match err {
                DeployError::MissingReference {
                    coordinate, reason, ..
                } => {
                    assert_eq!(coordinate, &coord(id));
                    assert_eq!(reason, &MissingReason::TargetFailed);
                }
                other => panic!("unexpected error {other:?}"),
            }
        }
        assert_eq!(client.write_count().await, 1);
        assert!(result.entities.contains(&coord("d")));
    }

    #[tokio::test]
    async fn test_reference_outside_environment_is_rejected_up_front() {
        let client = DryRunClient::new();
        let controller = RunController::new(settings());
        let configs = vec![named("a"), referencing("b", "elsewhere")];

        let result = controller
            .deploy_environment("dev", client.client_set(), &configs)
            .await;

        assert_eq!(result.errors.len(), 1);
        assert!(matches!(
            &result.errors[0],
            DeployError::MissingReference {
                reason: MissingReason::NotInDeploymentSet,
                ..
            }
        ));
        assert!(client.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_run_abandons_everything() {
        let client = DryRunClient::new();
        let cancel = Cancellation::new();
        cancel.cancel();
        let controller = RunController::new(settings().continue_on_error()).with_cancellation(cancel);
        let configs = vec![named("a"), named("b")];

        let result = controller
            .deploy_environment("dev", client.client_set(), &configs)
            .await;

        assert_eq!(result.errors.len(), 2);
        assert!(result.errors.iter().all(DeployError::is_cancelled));
        assert!(client.calls().await.is_empty());
    }

    /// Bucket client failing with "not found yet" for the first calls of each bucket.
    struct SlowBuckets {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl BucketClient for SlowBuckets {
        async fn upsert(&self, bucket_name: &str, _payload: &str) -> ClientResult<RemoteEntity> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(ClientError::Api(ApiResponse::new(
                    404,
                    "Management-Zone not found",
                )));
            }
            Ok(RemoteEntity::new(bucket_name, bucket_name))
        }
    }

    fn bucket(id: &str) -> Config {
        Config {
            template: Template::inline(id, "{}"),
            config_type: ConfigType::Bucket,
            ..make_config(id, vec![])
        }
    }

    #[tokio::test]
    async fn test_transient_error_then_success_reports_nothing() {
        let buckets = Arc::new(SlowBuckets {
            failures: 5,
            calls: AtomicU32::new(0),
        });
        let clients = ClientSet {
            bucket: Some(buckets.clone()),
            ..ClientSet::default()
        };
        let controller = RunController::new(settings());

        let result = controller
            .deploy_environment("dev", clients, &[bucket("logs")])
            .await;

        assert!(result.is_success());
        assert_eq!(buckets.calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail_only_that_config() {
        let buckets = Arc::new(SlowBuckets {
            failures: u32::MAX,
            calls: AtomicU32::new(0),
        });
        let client = DryRunClient::new();
        let clients = ClientSet {
            bucket: Some(buckets.clone()),
            ..client.client_set()
        };
        let controller = RunController::new(settings().continue_on_error());
        let configs = vec![bucket("logs"), named("other")];

        let result = controller
            .deploy_environment("dev", clients, &configs)
            .await;

        assert_eq!(result.errors.len(), 1);
        assert!(matches!(
            &result.errors[0],
            DeployError::PermanentApi { attempts: 31, .. }
        ));
        assert!(result.entities.contains(&coord("other")));
    }

    #[tokio::test]
    async fn test_environments_are_independent() {
        let dev = DryRunClient::new();
        let mut prod_config = named("a");
        prod_config.environment = "prod".to_string();
        let mut staging_config = named("a");
        staging_config.environment = "staging".to_string();
        let configs = vec![named("a"), prod_config, staging_config];

        let mut clients = BTreeMap::new();
        clients.insert("dev".to_string(), dev.client_set());
        clients.insert("prod".to_string(), DryRunClient::new().client_set());

        for parallel in [true, false] {
            let controller =
                RunController::new(settings().continue_on_error().with_parallel_environments(parallel));
            let results = controller.deploy_all(&configs, &clients).await;

            let environments: Vec<_> = results.iter().map(|r| r.environment.as_str()).collect();
            assert_eq!(environments, ["dev", "prod", "staging"]);
            assert!(results[0].is_success());
            assert!(results[1].is_success());
            assert!(matches!(
                results[2].errors[0],
                DeployError::Validation { .. }
            ));
        }
    }

    #[tokio::test]
    async fn test_same_named_dashboards_stay_separate() {
        let client = DryRunClient::new();
        let controller = RunController::new(settings());
        let configs = vec![dashboard("x", "Overview"), dashboard("y", "Overview")];

        let result = controller
            .deploy_environment("dev", client.client_set(), &configs)
            .await;

        assert!(result.is_success(), "{:?}", result.errors);
        assert!(result.warnings.is_empty());
        let x = result.entities.get(&coord("x")).unwrap().id();
        let y = result.entities.get(&coord("y")).unwrap().id();
        assert_ne!(x, y);

        let remote = client.list(&ClassicApi::non_unique("dashboard")).await.unwrap();
        assert_eq!(remote.len(), 2);
    }

    #[tokio::test]
    async fn test_compound_joins_ids_of_two_configs() {
        let client = DryRunClient::new();
        let controller = RunController::new(settings());
        let joined = make_config(
            "c",
            vec![(
                "name",
                Parameter::Compound {
                    format: "{{ .first }}+{{ .second }}".to_string(),
                    references: vec![
                        CompoundReference::new("first", coord("a"), "id"),
                        CompoundReference::new("second", coord("b"), "id"),
                    ],
                },
            )],
        );
        let configs = vec![joined, named("a"), named("b")];

        let result = controller
            .deploy_environment("dev", client.client_set(), &configs)
            .await;

        assert!(result.is_success(), "{:?}", result.errors);
        let a = result.entities.get(&coord("a")).unwrap().id().unwrap();
        let b = result.entities.get(&coord("b")).unwrap().id().unwrap();
        assert_ne!(a, b);
        assert_eq!(
            result.entities.get(&coord("c")).unwrap().entity_name,
            format!("{a}+{b}")
        );
    }
}
