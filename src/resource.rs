use kapply_inventory::{InventorySet, ResourceReference, INVENTORY_ANNOTATION};
use serde_json::{json, Value};

use crate::config::ConfigError;

fn string_field<'a>(value: &'a Value, field: &'static str) -> Result<&'a str, ConfigError> {
    value
        .get(field)
        .and_then(Value::as_str)
        .ok_or(ConfigError::MissingField(field))
}

pub(crate) fn annotation<'a>(object: &'a Value, key: &str) -> Option<&'a str> {
    object.get("metadata")?.get("annotations")?.get(key)?.as_str()
}

pub(crate) fn set_annotation(object: &mut Value, key: &str, value: String) {
    // metadata field should exist, it is checked while building DeclaredResource
    if let Some(metadata) = object.get_mut("metadata").and_then(Value::as_object_mut) {
        let annotations = metadata
            .entry("annotations")
            .or_insert_with(|| json!({}));
        if let Some(annotations) = annotations.as_object_mut() {
            annotations.insert(key.to_owned(), Value::String(value));
        }
    }
}

pub(crate) fn remove_annotation(object: &mut Value, key: &str) {
    if let Some(annotations) = object
        .get_mut("metadata")
        .and_then(|metadata| metadata.get_mut("annotations"))
        .and_then(Value::as_object_mut)
    {
        annotations.remove(key);
    }
}

/// Server-issued concurrency token
pub(crate) fn resource_version(object: &Value) -> Option<&str> {
    object.get("metadata")?.get("resourceVersion")?.as_str()
}

pub(crate) fn set_resource_version(object: &mut Value, version: &str) {
    if let Some(metadata) = object.get_mut("metadata").and_then(Value::as_object_mut) {
        metadata.insert("resourceVersion".to_owned(), json!(version));
    }
}

/// Resource document supplied by config provider
#[derive(Clone, Debug)]
pub struct DeclaredResource {
    reference: ResourceReference,
    object: Value,
}

impl DeclaredResource {
    pub fn new(object: Value) -> Result<Self, ConfigError> {
        if !object.is_object() {
            return Err(ConfigError::NotAnObject);
        }
        let api_version = string_field(&object, "apiVersion")?;
        let kind = string_field(&object, "kind")?;
        let metadata = object
            .get("metadata")
            .ok_or(ConfigError::MissingField("metadata"))?;
        let name = string_field(metadata, "name")?;
        let namespace = metadata.get("namespace").and_then(Value::as_str);

        let reference = ResourceReference::new(api_version, kind, namespace, name);
        Ok(Self { reference, object })
    }

    pub fn reference(&self) -> &ResourceReference {
        &self.reference
    }

    pub fn object(&self) -> &Value {
        &self.object
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        annotation(&self.object, key)
    }

    /// Inventory object is the one carrying inventory annotation
    pub fn is_inventory(&self) -> bool {
        self.annotation(INVENTORY_ANNOTATION).is_some()
    }
}

/// Declared resources with inventory object separated
#[derive(Clone, Debug, Default)]
pub struct Batch {
    pub inventory: Option<DeclaredResource>,
    pub resources: Vec<DeclaredResource>,
}

impl Batch {
    pub fn split(declared: Vec<DeclaredResource>) -> Result<Self, ConfigError> {
        let (mut inventories, resources): (Vec<_>, Vec<_>) =
            declared.into_iter().partition(DeclaredResource::is_inventory);
        if inventories.len() > 1 {
            return Err(ConfigError::MultipleInventoryObjects(
                inventories
                    .iter()
                    .map(|resource| resource.reference().clone())
                    .collect(),
            ));
        }
        Ok(Self {
            inventory: inventories.pop(),
            resources,
        })
    }

    /// References of every non-inventory resource
    pub fn current_set(&self) -> InventorySet {
        self.resources
            .iter()
            .map(|resource| resource.reference().clone())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.inventory.is_none() && self.resources.is_empty()
    }
}
