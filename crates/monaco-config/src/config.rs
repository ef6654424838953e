//! Config definitions.

use monaco_core::Coordinate;
use monaco_core::client::{AutomationResource, ClassicApi, DocumentKind};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::{ConfigError, ConfigResult};
use crate::parameter::{Parameter, ParameterReference};

/// A declarative unit of desired remote state.
///
/// Configs arrive pre-validated from the loader and are read-only for the
/// duration of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub coordinate: Coordinate,
    pub template: Template,
    #[serde(rename = "type")]
    pub config_type: ConfigType,
    #[serde(default)]
    pub parameters: BTreeMap<String, Parameter>,
    #[serde(default)]
    pub skip: bool,
    pub environment: String,
    #[serde(default)]
    pub group: String,
    /// Remote object ID this config is pinned to.
    #[serde(default)]
    pub origin_object_id: Option<String>,
}

impl Config {
    /// All references of all parameters, in parameter-name order.
    pub fn references(&self) -> Vec<(&str, ParameterReference)> {
        self.parameters
            .iter()
            .flat_map(|(name, param)| {
                param
                    .references()
                    .into_iter()
                    .map(move |r| (name.as_str(), r))
            })
            .collect()
    }

    /// References to other configs. References to the config's own parameters are excluded.
    pub fn external_references(&self) -> Vec<(&str, ParameterReference)> {
        self.references()
            .into_iter()
            .filter(|(_, r)| r.coordinate != self.coordinate)
            .collect()
    }
}

/// Kind of a config, with the fields specific to that kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ConfigType {
    ClassicApi {
        api: ClassicApi,
    },
    #[serde(rename_all = "camelCase")]
    Settings {
        schema_id: String,
        #[serde(default)]
        schema_version: Option<String>,
    },
    Automation {
        resource: AutomationResource,
    },
    Document {
        #[serde(rename = "documentKind")]
        kind: DocumentKind,
        #[serde(default)]
        private: bool,
    },
    Bucket,
    OpenPipeline {
        #[serde(rename = "pipelineKind")]
        kind: String,
    },
}

impl ConfigType {
    pub fn kind_name(&self) -> &'static str {
        match self {
            ConfigType::ClassicApi { .. } => "classic-api",
            ConfigType::Settings { .. } => "settings",
            ConfigType::Automation { .. } => "automation",
            ConfigType::Document { .. } => "document",
            ConfigType::Bucket => "bucket",
            ConfigType::OpenPipeline { .. } => "openpipeline",
        }
    }

    /// Kinds addressed by a human-readable name need a resolved `name` property.
    pub fn requires_name(&self) -> bool {
        match self {
            ConfigType::ClassicApi { api } => !api.single_configuration,
            ConfigType::Document { .. } => true,
            _ => false,
        }
    }
}

/// Template content, loaded lazily when a config is rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "kebab-case")]
pub enum Template {
    Inline { id: String, content: String },
    File { path: PathBuf },
}

impl Template {
    pub fn inline(id: impl Into<String>, content: impl Into<String>) -> Self {
        Template::Inline {
            id: id.into(),
            content: content.into(),
        }
    }

    pub fn id(&self) -> Cow<'_, str> {
        match self {
            Template::Inline { id, .. } => Cow::Borrowed(id),
            Template::File { path } => path.to_string_lossy(),
        }
    }

    pub fn content(&self) -> ConfigResult<Cow<'_, str>> {
        match self {
            Template::Inline { content, .. } => Ok(Cow::Borrowed(content)),
            Template::File { path } => std::fs::read_to_string(path)
                .map(Cow::Owned)
                .map_err(|e| ConfigError::TemplateIo {
                    path: path.display().to_string(),
                    message: e.to_string(),
                }),
        }
    }
}
