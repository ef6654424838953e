//! Upserts against classic configuration APIs.
//!
//! Three flavours exist:
//! - single-configuration APIs hold one object and are always overwritten
//! - unique-name APIs are looked up by name, then updated or created
//! - non-unique-name APIs are addressed by a deterministic ID derived from the
//!   coordinate, because the name alone cannot identify an object
//!
//! Name lookups return the first match in the platform's listing order. That
//! order is not guaranteed to be stable, so with several same-named objects on a
//! unique-name API which one gets updated is not deterministic.

use monaco_core::DeployWarning;
use monaco_core::Result;
use monaco_core::client::{ClassicApi, ClassicConfigClient, RemoteEntity};
use monaco_core::id::{is_coordinate_uuid, uuid_from_coordinate};
use tracing::{debug, warn};

use crate::engine::{DeploymentEngine, Outcome, Rendered};
use crate::retry::client_error;

pub async fn deploy(
    engine: &DeploymentEngine,
    client: &dyn ClassicConfigClient,
    api: &ClassicApi,
    rendered: &Rendered<'_>,
) -> Result<Outcome> {
    if api.single_configuration {
        let name = rendered
            .name()
            .unwrap_or_else(|_| rendered.coordinate.config_id.clone());
        return upsert_by_name(engine, client, api, &name, rendered)
            .await
            .map(Outcome::from);
    }

    if api.non_unique_name {
        return deploy_non_unique(engine, client, api, rendered).await;
    }

    let name = rendered.name()?;
    engine.ensure_active(rendered.coordinate)?;
    let existing = client
        .read_by_name(api, &name)
        .await
        .map_err(|e| client_error(rendered.coordinate, e))?;

    let entity = match existing {
        Some(existing) => {
            debug!(config = %rendered.coordinate, id = %existing.id, "Updating existing object");
            upsert_by_id(engine, client, api, &existing.id, &name, rendered).await?
        }
        None => upsert_by_name(engine, client, api, &name, rendered).await?,
    };
    Ok(entity.into())
}

async fn deploy_non_unique(
    engine: &DeploymentEngine,
    client: &dyn ClassicConfigClient,
    api: &ClassicApi,
    rendered: &Rendered<'_>,
) -> Result<Outcome> {
    let name = rendered.name()?;
    let candidate = rendered
        .origin_object_id
        .map(str::to_string)
        .unwrap_or_else(|| uuid_from_coordinate(rendered.coordinate).to_string());

    engine.ensure_active(rendered.coordinate)?;
    let existing = client
        .list(api)
        .await
        .map_err(|e| client_error(rendered.coordinate, e))?;

    let (target, warning) = choose_target(rendered, &name, candidate, &existing);
    let entity = upsert_by_id(engine, client, api, &target, &name, rendered).await?;

    Ok(Outcome {
        entity,
        warnings: warning.into_iter().collect(),
    })
}

/// Pick the ID to upsert for a non-unique-name object.
///
/// An object already carrying the candidate ID is ours. A single unclaimed
/// object with the same name is adopted. Otherwise the candidate ID is claimed,
/// and if several objects share the name they are reported rather than merged into.
fn choose_target(
    rendered: &Rendered<'_>,
    name: &str,
    candidate: String,
    existing: &[RemoteEntity],
) -> (String, Option<DeployWarning>) {
    if existing.iter().any(|e| e.id == candidate) {
        return (candidate, None);
    }

    // Objects claimed by another config of this run, or derived from some
    // other coordinate, belong to someone else.
    let same_name: Vec<&RemoteEntity> = existing
        .iter()
        .filter(|e| e.name == name)
        .filter(|e| !rendered.entities.holds_id(&e.id) && !is_coordinate_uuid(&e.id))
        .collect();
    match same_name.as_slice() {
        [] => (candidate, None),
        [single] => (single.id.clone(), None),
        several => {
            let matches: Vec<String> = several.iter().map(|e| e.id.clone()).collect();
            warn!(
                config = %rendered.coordinate,
                name,
                claimed_id = %candidate,
                ?matches,
                "Several objects share this name and none has the config's ID; creating a new one"
            );
            let warning = DeployWarning::AmbiguousMatch {
                coordinate: rendered.coordinate.clone(),
                name: name.to_string(),
                claimed_id: candidate.clone(),
                matches,
            };
            (candidate, Some(warning))
        }
    }
}

async fn upsert_by_name(
    engine: &DeploymentEngine,
    client: &dyn ClassicConfigClient,
    api: &ClassicApi,
    name: &str,
    rendered: &Rendered<'_>,
) -> Result<RemoteEntity> {
    engine
        .retry
        .call(rendered.coordinate, rendered.config_type, &engine.cancel, || {
            client.upsert_by_name(api, name, rendered.payload)
        })
        .await
}

async fn upsert_by_id(
    engine: &DeploymentEngine,
    client: &dyn ClassicConfigClient,
    api: &ClassicApi,
    id: &str,
    name: &str,
    rendered: &Rendered<'_>,
) -> Result<RemoteEntity> {
    engine
        .retry
        .call(rendered.coordinate, rendered.config_type, &engine.cancel, || {
            client.upsert_by_entity_id(api, id, name, rendered.payload)
        })
        .await
}
