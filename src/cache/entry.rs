use serde::{Deserialize, Serialize};
use serde_json::Map;
use std::fmt;
use crate::core::{Identifier, OrmError, Result, Value};
use crate::instance::ObjectValue;
use crate::metamodel::ManagedTypeDescriptor;

/// Identity of a cached entity: root entity name, identifier and tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub root_entity: String,
    pub identifier: Identifier,
    pub tenant: Option<String>,
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tenant {
            Some(tenant) => write!(f, "{}#{}@{}", self.root_entity, self.identifier, tenant),
            None => write!(f, "{}#{}", self.root_entity, self.identifier),
        }
    }
}

/// Session-independent form of a state-array slot. References to other
/// managed objects are kept as keys only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CachedValue {
    Null,
    Basic { value: Value },
    Composite { values: Vec<CachedValue> },
    EntityRef { entity: String, identifier: Option<Identifier> },
    Collection { owner_key: Option<Identifier> },
    Array { values: Vec<CachedValue> },
}

impl CachedValue {
    pub fn disassemble(value: &ObjectValue) -> Result<Self> {
        Ok(match value {
            ObjectValue::Null => Self::Null,
            ObjectValue::Basic(value) => Self::Basic { value: value.clone() },
            ObjectValue::Composite(composite) => Self::Composite {
                values: composite.values.iter().map(Self::disassemble).collect::<Result<_>>()?,
            },
            ObjectValue::Entity(instance) => Self::EntityRef {
                entity: instance.entity_name(),
                identifier: match instance.identifier() {
                    Some(id) => id.to_identifier()?,
                    None => None,
                },
            },
            ObjectValue::Proxy(proxy) => Self::EntityRef {
                entity: proxy.entity_name().to_string(),
                identifier: Some(proxy.key().identifier().clone()),
            },
            ObjectValue::Collection(collection) => Self::Collection {
                owner_key: collection.owner_key(),
            },
            ObjectValue::Array(values) => Self::Array {
                values: values.iter().map(Self::disassemble).collect::<Result<_>>()?,
            },
        })
    }
}

/// Second-level cache entry for one entity.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEntry {
    /// Disassembled state array; slot `i` holds the attribute at state-array position `i`.
    Standard {
        subclass: String,
        version: Option<Value>,
        state: Vec<CachedValue>,
    },
    /// Map keyed by attribute name, as produced with structured cache entries enabled.
    Structured(serde_json::Value),
}

const SUBCLASS_KEY: &str = "_subclass";
const VERSION_KEY: &str = "_version";

impl CacheEntry {
    pub fn standard(
        descriptor: &ManagedTypeDescriptor,
        state: &[ObjectValue],
        version: Option<Value>,
    ) -> Result<Self> {
        Ok(Self::Standard {
            subclass: descriptor.name.clone(),
            version,
            state: state.iter().map(CachedValue::disassemble).collect::<Result<_>>()?,
        })
    }

    pub fn structured(
        descriptor: &ManagedTypeDescriptor,
        state: &[ObjectValue],
        version: Option<Value>,
    ) -> Result<Self> {
        let mut map = Map::new();
        map.insert(SUBCLASS_KEY.to_string(), serde_json::Value::String(descriptor.name.clone()));
        map.insert(VERSION_KEY.to_string(), serde_json::to_value(&version)?);
        for attribute in descriptor.attributes() {
            let value = state.get(attribute.position).unwrap_or(&ObjectValue::Null);
            map.insert(
                attribute.name.clone(),
                serde_json::to_value(CachedValue::disassemble(value)?)?,
            );
        }
        Ok(Self::Structured(serde_json::Value::Object(map)))
    }

    pub fn subclass(&self) -> Option<&str> {
        match self {
            Self::Standard { subclass, .. } => Some(subclass),
            Self::Structured(map) => map.get(SUBCLASS_KEY).and_then(serde_json::Value::as_str),
        }
    }

    /// Disassembled state in state-array order.
    pub fn disassembled_state(&self, descriptor: &ManagedTypeDescriptor) -> Result<Vec<CachedValue>> {
        match self {
            Self::Standard { state, .. } => {
                if state.len() != descriptor.state_array_size() {
                    return Err(OrmError::CacheError(format!(
                        "Cache entry for '{}' has {} slots, expected {}",
                        descriptor.name,
                        state.len(),
                        descriptor.state_array_size()
                    )));
                }
                Ok(state.clone())
            }
            Self::Structured(map) => descriptor
                .attributes()
                .iter()
                .map(|attribute| match map.get(&attribute.name) {
                    Some(value) => Ok(serde_json::from_value(value.clone())?),
                    None => Ok(CachedValue::Null),
                })
                .collect(),
        }
    }

    pub fn version(&self) -> Result<Option<Value>> {
        match self {
            Self::Standard { version, .. } => Ok(version.clone()),
            Self::Structured(map) => match map.get(VERSION_KEY) {
                Some(value) => Ok(serde_json::from_value(value.clone())?),
                None => Ok(None),
            },
        }
    }
}
