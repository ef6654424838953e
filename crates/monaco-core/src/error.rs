//! Error types for monaco deployments.

use serde::Serialize;
use thiserror::Error;

use crate::Coordinate;

/// Why a reference could not be satisfied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum MissingReason {
    /// The target is not part of the environment's deployment set.
    NotInDeploymentSet,
    /// The target was explicitly skipped.
    TargetSkipped,
    /// The target failed (directly or through its own references).
    TargetFailed,
    /// The target was deployed but does not carry the property.
    PropertyMissing,
}

impl std::fmt::Display for MissingReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            MissingReason::NotInDeploymentSet => "target is not part of the deployment",
            MissingReason::TargetSkipped => "target was skipped",
            MissingReason::TargetFailed => "target failed to deploy",
            MissingReason::PropertyMissing => "target has no such property",
        };
        f.write_str(text)
    }
}

/// Errors recorded against a config during a run.
#[derive(Debug, Clone, Error, Serialize)]
pub enum DeployError {
    #[error("cyclic dependency in environment {environment}: {}", join(.cycle))]
    CyclicDependency {
        environment: String,
        cycle: Vec<Coordinate>,
        /// Configs connected to the cycle that were not scheduled either.
        blocked: Vec<Coordinate>,
    },

    #[error("{coordinate}: parameter {parameter} references {target}.{property}: {reason}")]
    MissingReference {
        coordinate: Coordinate,
        parameter: String,
        target: Coordinate,
        property: String,
        reason: MissingReason,
    },

    #[error("{coordinate}: failed to resolve parameter {parameter}: {message}")]
    Resolution {
        coordinate: Coordinate,
        parameter: String,
        message: String,
    },

    #[error("{coordinate}: validation failed: {message}")]
    Validation {
        coordinate: Coordinate,
        message: String,
    },

    #[error("{coordinate}: failed to render template: {message}")]
    Render {
        coordinate: Coordinate,
        message: String,
    },

    #[error("{coordinate}: API request failed with status {status}: {body}")]
    PermanentApi {
        coordinate: Coordinate,
        status: u16,
        body: String,
        /// Number of attempts made, including the first call.
        attempts: u32,
    },

    #[error("{coordinate}: transport error: {message}")]
    Transport {
        coordinate: Coordinate,
        message: String,
    },

    #[error("{coordinate}: cancelled")]
    Cancelled { coordinate: Coordinate },

    #[error("{coordinate}: internal error: {message}")]
    Internal {
        coordinate: Coordinate,
        message: String,
    },
}

impl DeployError {
    /// The config this error is attached to. For cycles, the first cycle member.
    pub fn coordinate(&self) -> Option<&Coordinate> {
        match self {
            DeployError::CyclicDependency { cycle, .. } => cycle.first(),
            DeployError::MissingReference { coordinate, .. }
            | DeployError::Resolution { coordinate, .. }
            | DeployError::Validation { coordinate, .. }
            | DeployError::Render { coordinate, .. }
            | DeployError::PermanentApi { coordinate, .. }
            | DeployError::Transport { coordinate, .. }
            | DeployError::Cancelled { coordinate }
            | DeployError::Internal { coordinate, .. } => Some(coordinate),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, DeployError::Cancelled { .. })
    }
}

/// Non-fatal findings surfaced alongside a run result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DeployWarning {
    /// Several remote objects share a config's name and none carries its
    /// deterministic ID; a new object was claimed with that ID instead.
    AmbiguousMatch {
        coordinate: Coordinate,
        name: String,
        claimed_id: String,
        matches: Vec<String>,
    },
}

impl std::fmt::Display for DeployWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeployWarning::AmbiguousMatch {
                coordinate,
                name,
                claimed_id,
                matches,
            } => write!(
                f,
                "{coordinate}: {} remote objects named {name:?} exist ({}), none with ID {claimed_id}; created a new one",
                matches.len(),
                matches.join(", ")
            ),
        }
    }
}

fn join(coordinates: &[Coordinate]) -> String {
    coordinates
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

pub type Result<T> = std::result::Result<T, DeployError>;
