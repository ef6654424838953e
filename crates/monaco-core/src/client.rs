//! Capability traits for the remote configuration platform.
//!
//! Clients are collaborators over HTTP. The engine only hands them payload text
//! and target identifiers; transport, authentication and rate limiting live
//! behind these traits.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Descriptor of a classic configuration API.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClassicApi {
    /// API identifier (e.g. "alerting-profile", "dashboard").
    pub id: String,
    /// Several objects may legitimately share a name (dashboards and the like).
    #[serde(default)]
    pub non_unique_name: bool,
    /// The API holds exactly one configuration object, so there is nothing to look up.
    #[serde(default)]
    pub single_configuration: bool,
}

impl ClassicApi {
    pub fn unique(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            non_unique_name: false,
            single_configuration: false,
        }
    }

    pub fn non_unique(id: impl Into<String>) -> Self {
        Self {
            non_unique_name: true,
            ..Self::unique(id)
        }
    }

    pub fn single(id: impl Into<String>) -> Self {
        Self {
            single_configuration: true,
            ..Self::unique(id)
        }
    }

    pub fn is_synthetic(&self) -> bool {
        self.id.contains("synthetic")
    }
}

/// Automation resources addressable by the automation client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AutomationResource {
    Workflow,
    BusinessCalendar,
    SchedulingRule,
}

impl AutomationResource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AutomationResource::Workflow => "workflows",
            AutomationResource::BusinessCalendar => "business-calendars",
            AutomationResource::SchedulingRule => "scheduling-rules",
        }
    }
}

/// Kinds of documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentKind {
    Dashboard,
    Notebook,
    Launchpad,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Dashboard => "dashboard",
            DocumentKind::Notebook => "notebook",
            DocumentKind::Launchpad => "launchpad",
        }
    }
}

/// An object as reported back by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntity {
    pub id: String,
    pub name: String,
}

impl RemoteEntity {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// A non-success response from the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_4xx(&self) -> bool {
        (400..500).contains(&self.status)
    }

    pub fn is_5xx(&self) -> bool {
        (500..600).contains(&self.status)
    }

    pub fn body_contains(&self, needle: &str) -> bool {
        self.body.contains(needle)
    }
}

/// Errors returned by platform clients.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("API responded with status {}: {}", .0.status, .0.body)]
    Api(ApiResponse),

    #[error("transport error: {0}")]
    Transport(String),
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Settings object handed to the settings client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsObject {
    pub schema_id: String,
    pub schema_version: Option<String>,
    pub scope: String,
    pub external_id: String,
    /// Remote object ID the config is pinned to, if any.
    pub origin_object_id: Option<String>,
    pub content: String,
}

/// A settings object already present on the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownSetting {
    pub object_id: String,
    pub external_id: Option<String>,
    pub schema_id: String,
    pub scope: String,
}

#[async_trait]
pub trait ClassicConfigClient: Send + Sync {
    /// List every object of an API.
    async fn list(&self, api: &ClassicApi) -> ClientResult<Vec<RemoteEntity>>;

    /// First object with the given name, if any.
    async fn read_by_name(&self, api: &ClassicApi, name: &str)
    -> ClientResult<Option<RemoteEntity>>;

    /// Payload of the object with the given ID, if any.
    async fn read_by_id(&self, api: &ClassicApi, id: &str) -> ClientResult<Option<String>>;

    /// Create an object addressed by name (or overwrite a single-configuration API).
    async fn upsert_by_name(
        &self,
        api: &ClassicApi,
        name: &str,
        payload: &str,
    ) -> ClientResult<RemoteEntity>;

    /// Create or update the object with the given ID.
    async fn upsert_by_entity_id(
        &self,
        api: &ClassicApi,
        entity_id: &str,
        name: &str,
        payload: &str,
    ) -> ClientResult<RemoteEntity>;

    async fn delete(&self, api: &ClassicApi, id: &str) -> ClientResult<()>;
}

#[async_trait]
pub trait SettingsClient: Send + Sync {
    async fn list_known_settings(&self, schema_id: &str) -> ClientResult<Vec<KnownSetting>>;

    /// Create or update a settings object keyed by its external ID.
    async fn upsert_settings(&self, object: &SettingsObject) -> ClientResult<RemoteEntity>;
}

#[async_trait]
pub trait AutomationClient: Send + Sync {
    async fn upsert(
        &self,
        resource: AutomationResource,
        id: &str,
        payload: &str,
    ) -> ClientResult<RemoteEntity>;
}

#[async_trait]
pub trait DocumentClient: Send + Sync {
    async fn upsert(
        &self,
        id: &str,
        name: &str,
        kind: DocumentKind,
        private: bool,
        payload: &str,
    ) -> ClientResult<RemoteEntity>;
}

#[async_trait]
pub trait BucketClient: Send + Sync {
    async fn upsert(&self, bucket_name: &str, payload: &str) -> ClientResult<RemoteEntity>;
}

#[async_trait]
pub trait OpenPipelineClient: Send + Sync {
    /// Replace the pipeline configuration of a kind (e.g. "logs", "events").
    async fn update(&self, kind: &str, payload: &str) -> ClientResult<RemoteEntity>;
}

/// The clients available for one environment. Kinds without a client cannot be deployed.
#[derive(Clone, Default)]
pub struct ClientSet {
    pub classic: Option<Arc<dyn ClassicConfigClient>>,
    pub settings: Option<Arc<dyn SettingsClient>>,
    pub automation: Option<Arc<dyn AutomationClient>>,
    pub document: Option<Arc<dyn DocumentClient>>,
    pub bucket: Option<Arc<dyn BucketClient>>,
    pub openpipeline: Option<Arc<dyn OpenPipelineClient>>,
}

impl std::fmt::Debug for ClientSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSet")
            .field("classic", &self.classic.is_some())
            .field("settings", &self.settings.is_some())
            .field("automation", &self.automation.is_some())
            .field("document", &self.document.is_some())
            .field("bucket", &self.bucket.is_some())
            .field("openpipeline", &self.openpipeline.is_some())
            .finish()
    }
}
