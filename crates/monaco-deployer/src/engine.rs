//! Per-config deployment state machine.

use monaco_config::template;
use monaco_config::{Config, ConfigType, EnvironmentLookup, resolve_parameters};
use monaco_core::client::{ClientSet, RemoteEntity};
use monaco_core::entity::{ID_PROPERTY, NAME_PROPERTY};
use monaco_core::{
    Cancellation, Coordinate, DeployError, DeployWarning, EntityMap, Properties, ResolvedEntity,
    Result,
};
use tracing::{debug, info};

use crate::retry::RetryPolicy;
use crate::{classic, platform};

/// Property settings objects are scoped by.
pub const SCOPE_PROPERTY: &str = "scope";

/// Result of deploying one config.
#[derive(Debug, Clone)]
pub struct Deployment {
    pub entity: ResolvedEntity,
    pub warnings: Vec<DeployWarning>,
}

/// A rendered config on its way to a strategy.
#[derive(Debug)]
pub struct Rendered<'a> {
    pub coordinate: &'a Coordinate,
    pub config_type: &'a ConfigType,
    pub properties: &'a Properties,
    pub payload: &'a str,
    pub origin_object_id: Option<&'a str>,
    /// Entities deployed so far in this run.
    pub entities: &'a EntityMap,
}

impl Rendered<'_> {
    /// The resolved `name` property.
    pub fn name(&self) -> Result<String> {
        required(self.coordinate, self.properties, NAME_PROPERTY)
    }

    pub fn scope(&self) -> Result<String> {
        required(self.coordinate, self.properties, SCOPE_PROPERTY)
    }
}

/// What a strategy reports back.
#[derive(Debug)]
pub struct Outcome {
    pub entity: RemoteEntity,
    pub warnings: Vec<DeployWarning>,
}

impl From<RemoteEntity> for Outcome {
    fn from(entity: RemoteEntity) -> Self {
        Self {
            entity,
            warnings: Vec::new(),
        }
    }
}

/// Deploys configs of one environment using that environment's clients.
#[derive(Debug, Clone)]
pub struct DeploymentEngine {
    pub(crate) clients: ClientSet,
    pub(crate) retry: RetryPolicy,
    pub(crate) cancel: Cancellation,
    env: EnvironmentLookup,
}

impl DeploymentEngine {
    pub fn new(
        clients: ClientSet,
        env: EnvironmentLookup,
        retry: RetryPolicy,
        cancel: Cancellation,
    ) -> Self {
        Self {
            clients,
            retry,
            cancel,
            env,
        }
    }

    /// Deploy a single config. Every config it references must already be in `entities`.
    pub async fn deploy(&self, config: &Config, entities: &EntityMap) -> Result<Deployment> {
        let coordinate = &config.coordinate;

        if config.skip {
            debug!(config = %coordinate, "Skipping config");
            return Ok(Deployment {
                entity: ResolvedEntity::skipped(coordinate.clone()),
                warnings: Vec::new(),
            });
        }

        self.ensure_active(coordinate)?;

        let mut properties =
            resolve_parameters(coordinate, &config.parameters, entities, &self.env)
                .map_err(|e| e.into_deploy_error(coordinate))?;

        validate(config, &properties)?;

        let payload = config
            .template
            .content()
            .and_then(|content| template::render(&content, &properties))
            .map_err(|e| e.into_deploy_error(coordinate))?;

        let rendered = Rendered {
            coordinate,
            config_type: &config.config_type,
            properties: &properties,
            payload: &payload,
            origin_object_id: config.origin_object_id.as_deref(),
            entities,
        };

        let outcome = self.dispatch(&rendered).await?;

        let entity_name = properties
            .get(NAME_PROPERTY)
            .map(ToString::to_string)
            .unwrap_or_else(|| outcome.entity.name.clone());
        properties.insert(ID_PROPERTY.to_string(), outcome.entity.id.clone().into());

        info!(
            config = %coordinate,
            kind = config.config_type.kind_name(),
            id = %outcome.entity.id,
            "Deployed config"
        );

        Ok(Deployment {
            entity: ResolvedEntity {
                coordinate: coordinate.clone(),
                entity_name,
                properties,
                skip: false,
            },
            warnings: outcome.warnings,
        })
    }

    /// Single dispatch point from config kind to upsert strategy.
    async fn dispatch(&self, rendered: &Rendered<'_>) -> Result<Outcome> {
        match rendered.config_type {
            ConfigType::ClassicApi { api } => {
                let client = self.client(&self.clients.classic, rendered)?;
                classic::deploy(self, client.as_ref(), api, rendered).await
            }
            ConfigType::Settings {
                schema_id,
                schema_version,
            } => {
                let client = self.client(&self.clients.settings, rendered)?;
                platform::deploy_settings(
                    self,
                    client.as_ref(),
                    schema_id,
                    schema_version.as_deref(),
                    rendered,
                )
                .await
            }
            ConfigType::Automation { resource } => {
                let client = self.client(&self.clients.automation, rendered)?;
                platform::deploy_automation(self, client.as_ref(), *resource, rendered).await
            }
            ConfigType::Document { kind, private } => {
                let client = self.client(&self.clients.document, rendered)?;
                platform::deploy_document(self, client.as_ref(), *kind, *private, rendered).await
            }
            ConfigType::Bucket => {
                let client = self.client(&self.clients.bucket, rendered)?;
                platform::deploy_bucket(self, client.as_ref(), rendered).await
            }
            ConfigType::OpenPipeline { kind } => {
                let client = self.client(&self.clients.openpipeline, rendered)?;
                platform::deploy_openpipeline(self, client.as_ref(), kind, rendered).await
            }
        }
    }

    fn client<'c, C: ?Sized>(
        &self,
        client: &'c Option<std::sync::Arc<C>>,
        rendered: &Rendered<'_>,
    ) -> Result<&'c std::sync::Arc<C>> {
        client.as_ref().ok_or_else(|| DeployError::Validation {
            coordinate: rendered.coordinate.clone(),
            message: format!(
                "no client configured for {} configs",
                rendered.config_type.kind_name()
            ),
        })
    }

    /// Fail with a cancellation error if the run has been cancelled.
    pub(crate) fn ensure_active(&self, coordinate: &Coordinate) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(DeployError::Cancelled {
                coordinate: coordinate.clone(),
            });
        }
        Ok(())
    }
}

/// Checks that need no network call.
fn validate(config: &Config, properties: &Properties) -> Result<()> {
    if config.config_type.requires_name() {
        required(&config.coordinate, properties, NAME_PROPERTY)?;
    }
    if matches!(config.config_type, ConfigType::Settings { .. }) {
        required(&config.coordinate, properties, SCOPE_PROPERTY)?;
    }
    Ok(())
}

fn required(coordinate: &Coordinate, properties: &Properties, property: &str) -> Result<String> {
    match properties.get(property).map(ToString::to_string) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(DeployError::Validation {
            coordinate: coordinate.clone(),
            message: format!(
                "{} configs require a {property} parameter",
                coordinate.config_type
            ),
        }),
    }
}
