//! Upserts against platform APIs keyed by a caller-supplied ID.
//!
//! None of these kinds need a lookup first: the ID is either pinned on the
//! config or derived deterministically from its coordinate, so repeating a
//! deployment updates the same object.

use monaco_core::Result;
use monaco_core::client::{
    AutomationClient, AutomationResource, BucketClient, DocumentClient, DocumentKind,
    OpenPipelineClient, SettingsClient, SettingsObject,
};
use monaco_core::id::{bucket_name, generate_external_id, uuid_from_coordinate};

use crate::engine::{DeploymentEngine, Outcome, Rendered};

fn pinned_or_uuid(rendered: &Rendered<'_>) -> String {
    rendered
        .origin_object_id
        .map(str::to_string)
        .unwrap_or_else(|| uuid_from_coordinate(rendered.coordinate).to_string())
}

pub async fn deploy_settings(
    engine: &DeploymentEngine,
    client: &dyn SettingsClient,
    schema_id: &str,
    schema_version: Option<&str>,
    rendered: &Rendered<'_>,
) -> Result<Outcome> {
    let object = SettingsObject {
        schema_id: schema_id.to_string(),
        schema_version: schema_version.map(str::to_string),
        scope: rendered.scope()?,
        external_id: generate_external_id(schema_id, &rendered.coordinate.to_string()),
        origin_object_id: rendered.origin_object_id.map(str::to_string),
        content: rendered.payload.to_string(),
    };

    let entity = engine
        .retry
        .call(rendered.coordinate, rendered.config_type, &engine.cancel, || {
            client.upsert_settings(&object)
        })
        .await?;
    Ok(entity.into())
}

pub async fn deploy_automation(
    engine: &DeploymentEngine,
    client: &dyn AutomationClient,
    resource: AutomationResource,
    rendered: &Rendered<'_>,
) -> Result<Outcome> {
    let id = pinned_or_uuid(rendered);
    let entity = engine
        .retry
        .call(rendered.coordinate, rendered.config_type, &engine.cancel, || {
            client.upsert(resource, &id, rendered.payload)
        })
        .await?;
    Ok(entity.into())
}

pub async fn deploy_document(
    engine: &DeploymentEngine,
    client: &dyn DocumentClient,
    kind: DocumentKind,
    private: bool,
    rendered: &Rendered<'_>,
) -> Result<Outcome> {
    let name = rendered.name()?;
    let id = pinned_or_uuid(rendered);
    let entity = engine
        .retry
        .call(rendered.coordinate, rendered.config_type, &engine.cancel, || {
            client.upsert(&id, &name, kind, private, rendered.payload)
        })
        .await?;
    Ok(entity.into())
}

pub async fn deploy_bucket(
    engine: &DeploymentEngine,
    client: &dyn BucketClient,
    rendered: &Rendered<'_>,
) -> Result<Outcome> {
    let name = rendered
        .origin_object_id
        .map(str::to_string)
        .unwrap_or_else(|| bucket_name(rendered.coordinate));
    let entity = engine
        .retry
        .call(rendered.coordinate, rendered.config_type, &engine.cancel, || {
            client.upsert(&name, rendered.payload)
        })
        .await?;
    Ok(entity.into())
}

pub async fn deploy_openpipeline(
    engine: &DeploymentEngine,
    client: &dyn OpenPipelineClient,
    kind: &str,
    rendered: &Rendered<'_>,
) -> Result<Outcome> {
    let entity = engine
        .retry
        .call(rendered.coordinate, rendered.config_type, &engine.cancel, || {
            client.update(kind, rendered.payload)
        })
        .await?;
    Ok(entity.into())
}
