//! Resolved entities and the run-scoped entity map.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::{Coordinate, DeployError, Result, Value};

/// Resolved property values of a config, keyed by parameter name.
pub type Properties = BTreeMap<String, Value>;

/// Property every successfully deployed entity carries.
pub const ID_PROPERTY: &str = "id";

/// Property carrying the human-readable name of a config.
pub const NAME_PROPERTY: &str = "name";

/// Outcome of deploying (or explicitly skipping) one config during a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedEntity {
    pub coordinate: Coordinate,
    pub entity_name: String,
    pub properties: Properties,
    pub skip: bool,
}

impl ResolvedEntity {
    /// Entity recorded for a config marked as skipped. It carries no properties.
    pub fn skipped(coordinate: Coordinate) -> Self {
        Self {
            entity_name: coordinate.config_id.clone(),
            coordinate,
            properties: Properties::new(),
            skip: true,
        }
    }

    /// Remote identifier assigned on deployment.
    pub fn id(&self) -> Option<&str> {
        self.properties.get(ID_PROPERTY).and_then(Value::as_str)
    }
}

/// Write-once store of resolved entities for one environment's run.
#[derive(Debug, Default, Clone)]
pub struct EntityMap {
    entities: HashMap<Coordinate, ResolvedEntity>,
}

impl EntityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an entity. A second insert for the same coordinate is an invariant violation.
    pub fn insert(&mut self, entity: ResolvedEntity) -> Result<()> {
        if self.entities.contains_key(&entity.coordinate) {
            return Err(DeployError::Internal {
                message: "entity already recorded for this run".to_string(),
                coordinate: entity.coordinate,
            });
        }
        self.entities.insert(entity.coordinate.clone(), entity);
        Ok(())
    }

    pub fn get(&self, coordinate: &Coordinate) -> Option<&ResolvedEntity> {
        self.entities.get(coordinate)
    }

    pub fn contains(&self, coordinate: &Coordinate) -> bool {
        self.entities.contains_key(coordinate)
    }

    /// Look up a resolved property of a deployed, non-skipped entity.
    pub fn property(&self, coordinate: &Coordinate, property: &str) -> Option<&Value> {
        self.entities
            .get(coordinate)
            .filter(|e| !e.skip)
            .and_then(|e| e.properties.get(property))
    }

    /// Whether an entity of this run was deployed to the remote object `id`.
    pub fn holds_id(&self, id: &str) -> bool {
        self.entities.values().any(|e| e.id() == Some(id))
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedEntity> {
        self.entities.values()
    }
}
