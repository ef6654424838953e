//! Parameters and their resolution.
//!
//! A parameter is a value source. Resolution turns it into a [`Value`], possibly
//! by reading the resolved properties of another config from the [`EntityMap`].
//! References are also what the dependency graph is built from.

use monaco_core::error::MissingReason;
use monaco_core::{Coordinate, EntityMap, Properties, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::settings::EnvironmentLookup;
use crate::template;

/// Points at a property of a config.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParameterReference {
    pub coordinate: Coordinate,
    pub property: String,
}

impl ParameterReference {
    pub fn new(coordinate: Coordinate, property: impl Into<String>) -> Self {
        Self {
            coordinate,
            property: property.into(),
        }
    }
}

/// A reference inside a compound parameter, exposed to the format string as `{{ .name }}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompoundReference {
    pub name: String,
    pub target: ParameterReference,
}

impl CompoundReference {
    pub fn new(name: impl Into<String>, coordinate: Coordinate, property: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: ParameterReference::new(coordinate, property),
        }
    }
}

/// A resolvable value source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Parameter {
    /// A literal.
    Value { value: Value },
    /// Read from the environment lookup.
    Environment {
        name: String,
        #[serde(default)]
        default: Option<String>,
    },
    /// A property of another config (or of this config's own parameters).
    Reference {
        target: ParameterReference,
        #[serde(default)]
        default: Option<Value>,
    },
    /// A list of literals, rendered as comma separated JSON values.
    List { values: Vec<Value> },
    /// Several named references combined through a `{{ .name }}` format string.
    Compound {
        format: String,
        references: Vec<CompoundReference>,
    },
}

/// Everything a parameter may read while resolving.
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    /// Config the parameter belongs to.
    pub coordinate: &'a Coordinate,
    /// Name of the parameter being resolved.
    pub parameter: &'a str,
    /// Entities deployed so far in this environment.
    pub entities: &'a EntityMap,
    /// Parameters of the same config resolved so far.
    pub resolved: &'a Properties,
    pub env: &'a EnvironmentLookup,
}

impl Parameter {
    pub fn value(value: impl Into<Value>) -> Self {
        Parameter::Value {
            value: value.into(),
        }
    }

    pub fn env(name: impl Into<String>) -> Self {
        Parameter::Environment {
            name: name.into(),
            default: None,
        }
    }

    pub fn reference(coordinate: Coordinate, property: impl Into<String>) -> Self {
        Parameter::Reference {
            target: ParameterReference::new(coordinate, property),
            default: None,
        }
    }

    /// References this parameter needs resolved first.
    pub fn references(&self) -> Vec<ParameterReference> {
        match self {
            Parameter::Value { .. } | Parameter::Environment { .. } | Parameter::List { .. } => {
                Vec::new()
            }
            Parameter::Reference { target, .. } => vec![target.clone()],
            Parameter::Compound { references, .. } => {
                references.iter().map(|r| r.target.clone()).collect()
            }
        }
    }

    pub fn resolve(&self, ctx: &ResolveContext<'_>) -> ConfigResult<Value> {
        match self {
            Parameter::Value { value } => Ok(value.clone()),
            Parameter::Environment { name, default } => match ctx.env.get(name) {
                Some(v) => Ok(Value::from(v)),
                None => default.clone().map(Value::from).ok_or_else(|| {
                    ConfigError::UnsetEnvironmentVariable {
                        parameter: ctx.parameter.to_string(),
                        name: name.clone(),
                    }
                }),
            },
            Parameter::Reference { target, default } => {
                lookup(ctx, target, default.as_ref())
            }
            Parameter::List { values } => Ok(Value::String(
                values
                    .iter()
                    .map(Value::to_json)
                    .collect::<Vec<_>>()
                    .join(", "),
            )),
            Parameter::Compound { format, references } => {
                let mut values = Properties::new();
                for reference in references {
                    let value = lookup(ctx, &reference.target, None)?;
                    if values.insert(reference.name.clone(), value).is_some() {
                        return Err(ConfigError::InvalidParameter {
                            parameter: ctx.parameter.to_string(),
                            message: format!(
                                "compound uses the name {} more than once",
                                reference.name
                            ),
                        });
                    }
                }
                template::format(format, &values)
                    .map(Value::String)
                    .map_err(|e| ConfigError::InvalidParameter {
                        parameter: ctx.parameter.to_string(),
                        message: e.to_string(),
                    })
            }
        }
    }
}

fn lookup(
    ctx: &ResolveContext<'_>,
    target: &ParameterReference,
    default: Option<&Value>,
) -> ConfigResult<Value> {
    let missing = |reason| ConfigError::MissingReference {
        parameter: ctx.parameter.to_string(),
        target: target.coordinate.clone(),
        property: target.property.clone(),
        reason,
    };

    let found = if &target.coordinate == ctx.coordinate {
        ctx.resolved.get(&target.property)
    } else {
        match ctx.entities.get(&target.coordinate) {
            None => return Err(missing(MissingReason::NotInDeploymentSet)),
            // A default never stands in for a skipped target.
            Some(entity) if entity.skip => return Err(missing(MissingReason::TargetSkipped)),
            Some(entity) => entity.properties.get(&target.property),
        }
    };

    found
        .or(default)
        .cloned()
        .ok_or_else(|| missing(MissingReason::PropertyMissing))
}

/// Order a config's parameters so that parameters referencing other parameters
/// of the same config come after them. Ties resolve by parameter name.
pub fn sort_parameters<'a>(
    coordinate: &Coordinate,
    parameters: &'a BTreeMap<String, Parameter>,
) -> ConfigResult<Vec<(&'a str, &'a Parameter)>> {
    // name -> names of own parameters it needs first
    let mut pending: BTreeMap<&str, BTreeSet<&str>> = parameters
        .iter()
        .map(|(name, param)| {
            let needs = param
                .references()
                .into_iter()
                .filter(|r| &r.coordinate == coordinate)
                .filter_map(|r| parameters.get_key_value(&r.property).map(|(k, _)| k.as_str()))
                .collect();
            (name.as_str(), needs)
        })
        .collect();

    let mut ordered = Vec::with_capacity(parameters.len());
    loop {
        let ready: Vec<&str> = pending
            .iter()
            .filter(|(_, needs)| needs.is_empty())
            .map(|(name, _)| *name)
            .collect();
        if ready.is_empty() {
            break;
        }
        for name in ready {
            pending.remove(name);
            for needs in pending.values_mut() {
                needs.remove(name);
            }
            if let Some((key, param)) = parameters.get_key_value(name) {
                ordered.push((key.as_str(), param));
            }
        }
    }

    if !pending.is_empty() {
        return Err(ConfigError::ParameterCycle(
            pending.keys().map(|n| n.to_string()).collect(),
        ));
    }

    Ok(ordered)
}

/// Resolve all parameters of a config in dependency order.
pub fn resolve_parameters(
    coordinate: &Coordinate,
    parameters: &BTreeMap<String, Parameter>,
    entities: &EntityMap,
    env: &EnvironmentLookup,
) -> ConfigResult<Properties> {
    let mut resolved = Properties::new();
    for (name, param) in sort_parameters(coordinate, parameters)? {
        let value = param.resolve(&ResolveContext {
            coordinate,
            parameter: name,
            entities,
            resolved: &resolved,
            env,
        })?;
        debug!(config = %coordinate, parameter = name, "Resolved parameter");
        resolved.insert(name.to_string(), value);
    }
    Ok(resolved)
}
