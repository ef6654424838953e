//! Config coordinates.

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Unique key of a config within one environment: project, config type and config id.
///
/// Ordering is lexical over (project, type, config id) and is what keeps
/// deployment order reproducible between runs.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
)]
#[display("{project}:{config_type}:{config_id}")]
pub struct Coordinate {
    pub project: String,
    #[serde(rename = "type")]
    pub config_type: String,
    #[serde(rename = "configId")]
    pub config_id: String,
}

impl Coordinate {
    pub fn new(
        project: impl Into<String>,
        config_type: impl Into<String>,
        config_id: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            config_type: config_type.into(),
            config_id: config_id.into(),
        }
    }
}
