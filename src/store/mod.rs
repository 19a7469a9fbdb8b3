//! Remote object store the reconciler talks to

mod cluster;
mod memory;

use async_trait::async_trait;
use kapply_inventory::{ResourceReference, ResourceType};
use serde_json::Value;
use thiserror::Error;

pub use cluster::{KubeStore, ObjectData, RuntimeTypeData};
pub use memory::MemoryStore;

#[derive(Error, Debug)]
pub enum StoreError {
    /// Type is not (yet) served, e.g. its definition was just created
    #[error("type {0} is not registered")]
    TypeNotRegistered(ResourceType),
    #[error("{0} was modified concurrently")]
    Conflict(ResourceReference),
    #[error("{0} not found")]
    NotFound(ResourceReference),
    #[error("kube error: {0}")]
    Kube(#[from] kube::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// Get/Create/Update/Delete by reference, List by type.
///
/// Absent objects are reported as `None`/`false`, not as errors.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, reference: &ResourceReference) -> Result<Option<Value>>;

    async fn create(&self, reference: &ResourceReference, object: &Value) -> Result<Value>;

    /// Conditioned on `metadata.resourceVersion` of passed object, if present
    async fn update(&self, reference: &ResourceReference, object: &Value) -> Result<Value>;

    /// Returns `false` if object was already absent
    async fn delete(&self, reference: &ResourceReference) -> Result<bool>;

    async fn list(&self, ty: &ResourceType, namespace: Option<&str>) -> Result<Vec<Value>>;
}
