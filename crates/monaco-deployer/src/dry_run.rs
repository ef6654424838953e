//! In-memory clients that record calls instead of talking to a platform.

use async_trait::async_trait;
use monaco_core::client::*;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// A call received by a dry-run client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DryRunCall {
    List { api: String },
    ReadByName { api: String, name: String },
    ReadById { api: String, id: String },
    UpsertByName { api: String, name: String },
    UpsertById { api: String, id: String, name: String },
    Delete { api: String, id: String },
    ListSettings { schema_id: String },
    UpsertSettings { schema_id: String, external_id: String },
    UpsertAutomation { resource: AutomationResource, id: String },
    UpsertDocument { id: String, name: String },
    UpsertBucket { name: String },
    UpdateOpenPipeline { kind: String },
}

impl DryRunCall {
    /// Whether the call would have changed remote state.
    pub fn is_write(&self) -> bool {
        !matches!(
            self,
            DryRunCall::List { .. }
                | DryRunCall::ReadByName { .. }
                | DryRunCall::ReadById { .. }
                | DryRunCall::ListSettings { .. }
        )
    }
}

#[derive(Default)]
struct Store {
    calls: Vec<DryRunCall>,
    // api id -> objects with their payloads
    classic: HashMap<String, Vec<(RemoteEntity, String)>>,
    settings: Vec<KnownSetting>,
}

/// Implements every client capability against an in-memory store.
///
/// Objects "created" during a run are remembered, so later lookups within
/// the same run see them.
#[derive(Default)]
pub struct DryRunClient {
    store: Mutex<Store>,
}

impl DryRunClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Pre-populate objects of a classic API.
    pub async fn seed_classic(&self, api: &str, objects: impl IntoIterator<Item = RemoteEntity>) {
        let mut store = self.store.lock().await;
        store
            .classic
            .entry(api.to_string())
            .or_default()
            .extend(objects.into_iter().map(|e| (e, String::new())));
    }

    /// A client set backed entirely by this dry-run client.
    pub fn client_set(self: &Arc<Self>) -> ClientSet {
        ClientSet {
            classic: Some(self.clone()),
            settings: Some(self.clone()),
            automation: Some(self.clone()),
            document: Some(self.clone()),
            bucket: Some(self.clone()),
            openpipeline: Some(self.clone()),
        }
    }

    pub async fn calls(&self) -> Vec<DryRunCall> {
        self.store.lock().await.calls.clone()
    }

    pub async fn write_count(&self) -> usize {
        self.store
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| c.is_write())
            .count()
    }

    async fn record(&self, call: DryRunCall) {
        self.store.lock().await.calls.push(call);
    }
}

#[async_trait]
impl ClassicConfigClient for DryRunClient {
    async fn list(&self, api: &ClassicApi) -> ClientResult<Vec<RemoteEntity>> {
        let mut store = self.store.lock().await;
        store.calls.push(DryRunCall::List {
            api: api.id.clone(),
        });
        Ok(store
            .classic
            .get(&api.id)
            .map(|objects| objects.iter().map(|(e, _)| e.clone()).collect())
            .unwrap_or_default())
    }

    async fn read_by_name(
        &self,
        api: &ClassicApi,
        name: &str,
    ) -> ClientResult<Option<RemoteEntity>> {
        let mut store = self.store.lock().await;
        store.calls.push(DryRunCall::ReadByName {
            api: api.id.clone(),
            name: name.to_string(),
        });
        Ok(store
            .classic
            .get(&api.id)
            .and_then(|objects| objects.iter().find(|(e, _)| e.name == name))
            .map(|(e, _)| e.clone()))
    }

    async fn read_by_id(&self, api: &ClassicApi, id: &str) -> ClientResult<Option<String>> {
        let mut store = self.store.lock().await;
        store.calls.push(DryRunCall::ReadById {
            api: api.id.clone(),
            id: id.to_string(),
        });
        Ok(store
            .classic
            .get(&api.id)
            .and_then(|objects| objects.iter().find(|(e, _)| e.id == id))
            .map(|(_, payload)| payload.clone()))
    }

    async fn upsert_by_name(
        &self,
        api: &ClassicApi,
        name: &str,
        payload: &str,
    ) -> ClientResult<RemoteEntity> {
        let mut store = self.store.lock().await;
        store.calls.push(DryRunCall::UpsertByName {
            api: api.id.clone(),
            name: name.to_string(),
        });
        let objects = store.classic.entry(api.id.clone()).or_default();
        if api.single_configuration {
            let entity = RemoteEntity::new(api.id.clone(), name);
            objects.clear();
            objects.push((entity.clone(), payload.to_string()));
            return Ok(entity);
        }
        if let Some((entity, stored)) = objects.iter_mut().find(|(e, _)| e.name == name) {
            *stored = payload.to_string();
            return Ok(entity.clone());
        }
        let entity = RemoteEntity::new(Uuid::new_v4().to_string(), name);
        objects.push((entity.clone(), payload.to_string()));
        Ok(entity)
    }

    async fn upsert_by_entity_id(
        &self,
        api: &ClassicApi,
        entity_id: &str,
        name: &str,
        payload: &str,
    ) -> ClientResult<RemoteEntity> {
        let mut store = self.store.lock().await;
        store.calls.push(DryRunCall::UpsertById {
            api: api.id.clone(),
            id: entity_id.to_string(),
            name: name.to_string(),
        });
        let objects = store.classic.entry(api.id.clone()).or_default();
        let entity = RemoteEntity::new(entity_id, name);
        match objects.iter_mut().find(|(e, _)| e.id == entity_id) {
            Some(existing) => *existing = (entity.clone(), payload.to_string()),
            None => objects.push((entity.clone(), payload.to_string())),
        }
        Ok(entity)
    }

    async fn delete(&self, api: &ClassicApi, id: &str) -> ClientResult<()> {
        let mut store = self.store.lock().await;
        store.calls.push(DryRunCall::Delete {
            api: api.id.clone(),
            id: id.to_string(),
        });
        if let Some(objects) = store.classic.get_mut(&api.id) {
            objects.retain(|(e, _)| e.id != id);
        }
        Ok(())
    }
}

#[async_trait]
impl SettingsClient for DryRunClient {
    async fn list_known_settings(&self, schema_id: &str) -> ClientResult<Vec<KnownSetting>> {
        let mut store = self.store.lock().await;
        store.calls.push(DryRunCall::ListSettings {
            schema_id: schema_id.to_string(),
        });
        Ok(store
            .settings
            .iter()
            .filter(|s| s.schema_id == schema_id)
            .cloned()
            .collect())
    }

    async fn upsert_settings(&self, object: &SettingsObject) -> ClientResult<RemoteEntity> {
        let known = self.list_known_settings(&object.schema_id).await?;
        let existing = known.into_iter().find(|s| {
            object.origin_object_id.as_deref() == Some(s.object_id.as_str())
                || s.external_id.as_deref() == Some(object.external_id.as_str())
        });

        let mut store = self.store.lock().await;
        store.calls.push(DryRunCall::UpsertSettings {
            schema_id: object.schema_id.clone(),
            external_id: object.external_id.clone(),
        });
        let object_id = match existing {
            Some(s) => s.object_id,
            None => {
                let object_id = Uuid::new_v4().to_string();
                store.settings.push(KnownSetting {
                    object_id: object_id.clone(),
                    external_id: Some(object.external_id.clone()),
                    schema_id: object.schema_id.clone(),
                    scope: object.scope.clone(),
                });
                object_id
            }
        };
        Ok(RemoteEntity::new(object_id, object.external_id.clone()))
    }
}

#[async_trait]
impl AutomationClient for DryRunClient {
    async fn upsert(
        &self,
        resource: AutomationResource,
        id: &str,
        _payload: &str,
    ) -> ClientResult<RemoteEntity> {
        self.record(DryRunCall::UpsertAutomation {
            resource,
            id: id.to_string(),
        })
        .await;
        Ok(RemoteEntity::new(id, id))
    }
}

#[async_trait]
impl DocumentClient for DryRunClient {
    async fn upsert(
        &self,
        id: &str,
        name: &str,
        _kind: DocumentKind,
        _private: bool,
        _payload: &str,
    ) -> ClientResult<RemoteEntity> {
        self.record(DryRunCall::UpsertDocument {
            id: id.to_string(),
            name: name.to_string(),
        })
        .await;
        Ok(RemoteEntity::new(id, name))
    }
}

#[async_trait]
impl BucketClient for DryRunClient {
    async fn upsert(&self, bucket_name: &str, _payload: &str) -> ClientResult<RemoteEntity> {
        self.record(DryRunCall::UpsertBucket {
            name: bucket_name.to_string(),
        })
        .await;
        Ok(RemoteEntity::new(bucket_name, bucket_name))
    }
}

#[async_trait]
impl OpenPipelineClient for DryRunClient {
    async fn update(&self, kind: &str, _payload: &str) -> ClientResult<RemoteEntity> {
        self.record(DryRunCall::UpdateOpenPipeline {
            kind: kind.to_string(),
        })
        .await;
        Ok(RemoteEntity::new(kind, kind))
    }
}
