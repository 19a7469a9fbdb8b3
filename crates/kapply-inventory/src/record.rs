use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::{parse_key, InventorySet, Result};

/// Annotation holding encoded [`InventorySet`]s
pub const INVENTORY_ANNOTATION: &str = "kustomize.config.k8s.io/Inventory";
/// Annotation holding opaque generation token
pub const INVENTORY_HASH_ANNOTATION: &str = "kustomize.config.k8s.io/InventoryHash";

/// Values are referrer lists in some writers, we only care about keys
#[derive(Deserialize)]
struct Document {
    #[serde(default)]
    current: BTreeMap<String, Value>,
    #[serde(default)]
    previous: BTreeMap<String, Value>,
}

fn keys_to_value(set: &InventorySet) -> Value {
    Value::Object(
        set.iter()
            .map(|reference| (reference.key(), Value::Null))
            .collect::<Map<_, _>>(),
    )
}

fn keys_to_set(keys: BTreeMap<String, Value>) -> Result<InventorySet> {
    keys.keys().map(|key| parse_key(key)).collect()
}

/// Encode set as `{"current": {"<key>": null, ...}}`
pub fn encode(set: &InventorySet) -> String {
    let mut document = Map::new();
    document.insert("current".to_owned(), keys_to_value(set));
    Value::Object(document).to_string()
}

/// Decode `current` member of inventory annotation
pub fn decode(annotation: &str) -> Result<InventorySet> {
    let document: Document = serde_json::from_str(annotation)?;
    keys_to_set(document.current)
}

/// Persisted generation of applied objects
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InventoryRecord {
    /// Objects of the latest applied generation
    pub current: InventorySet,
    /// Objects of superseded generations which were not pruned yet
    pub previous: InventorySet,
    /// Opaque caller-assigned token, never interpreted
    pub hash: Option<String>,
}

impl InventoryRecord {
    pub fn new(current: InventorySet, hash: Option<String>) -> Self {
        Self {
            current,
            previous: InventorySet::new(),
            hash,
        }
    }

    /// Missing inventory annotation decodes to empty record
    pub fn decode(inventory: Option<&str>, hash: Option<&str>) -> Result<Self> {
        let (current, previous) = match inventory {
            Some(annotation) => {
                let document: Document = serde_json::from_str(annotation)?;
                (
                    keys_to_set(document.current)?,
                    keys_to_set(document.previous)?,
                )
            }
            None => Default::default(),
        };
        Ok(Self {
            current,
            previous,
            hash: hash.map(ToOwned::to_owned),
        })
    }

    /// Encoded inventory annotation, `previous` is only written when non-empty
    pub fn encode(&self) -> String {
        let mut document = Map::new();
        document.insert("current".to_owned(), keys_to_value(&self.current));
        if !self.previous.is_empty() {
            document.insert("previous".to_owned(), keys_to_value(&self.previous));
        }
        Value::Object(document).to_string()
    }

    /// Every object this record still accounts for
    pub fn tracked(&self) -> InventorySet {
        self.previous.union(&self.current)
    }

    /// Record for newly applied generation, superseded objects are kept as prune candidates
    pub fn roll_forward(&self, current: InventorySet, hash: Option<String>) -> Self {
        Self {
            previous: self.tracked().difference(&current),
            current,
            hash,
        }
    }

    /// Tracked objects missing from `current`
    pub fn stale(&self, current: &InventorySet) -> InventorySet {
        self.tracked().difference(current)
    }
}
