//! Parameter resolution and rendering errors.

use monaco_core::error::MissingReason;
use monaco_core::{Coordinate, DeployError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("parameter {parameter} references {target}.{property}: {reason}")]
    MissingReference {
        parameter: String,
        target: Coordinate,
        property: String,
        reason: MissingReason,
    },

    #[error("parameter {parameter}: environment variable {name} is not set")]
    UnsetEnvironmentVariable { parameter: String, name: String },

    #[error("parameter {parameter}: {message}")]
    InvalidParameter { parameter: String, message: String },

    #[error("cycle detected between parameters: {}", .0.join(" -> "))]
    ParameterCycle(Vec<String>),

    #[error("template references unknown property {0}")]
    MissingProperty(String),

    #[error("malformed template: {0}")]
    MalformedTemplate(String),

    #[error("failed to read template {path}: {message}")]
    TemplateIo { path: String, message: String },
}

impl ConfigError {
    /// Attach the failing config's coordinate.
    pub fn into_deploy_error(self, coordinate: &Coordinate) -> DeployError {
        let coordinate = coordinate.clone();
        match self {
            ConfigError::MissingReference {
                parameter,
                target,
                property,
                reason,
            } => DeployError::MissingReference {
                coordinate,
                parameter,
                target,
                property,
                reason,
            },
            ConfigError::UnsetEnvironmentVariable { ref parameter, .. }
            | ConfigError::InvalidParameter { ref parameter, .. } => DeployError::Resolution {
                parameter: parameter.clone(),
                message: self.to_string(),
                coordinate,
            },
            ConfigError::ParameterCycle(ref names) => DeployError::Resolution {
                parameter: names.first().cloned().unwrap_or_default(),
                message: self.to_string(),
                coordinate,
            },
            ConfigError::MissingProperty(_)
            | ConfigError::MalformedTemplate(_)
            | ConfigError::TemplateIo { .. } => DeployError::Render {
                message: self.to_string(),
                coordinate,
            },
        }
    }
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
