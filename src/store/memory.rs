use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use kapply_inventory::{ResourceReference, ResourceType};
use serde_json::Value;

use super::{ObjectStore, Result, StoreError};
use crate::{order::is_type_defining, resource};

/// Versionless type identity, every served version shares the same objects
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct KindKey {
    group: String,
    kind: String,
}

impl From<&ResourceType> for KindKey {
    fn from(ty: &ResourceType) -> Self {
        Self {
            group: ty.group.clone(),
            kind: ty.kind.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct ObjectKey {
    kind: KindKey,
    namespace: Option<String>,
    name: String,
}

struct KindState {
    namespaced: bool,
    /// Store operations left until type is served
    pending: u32,
}

#[derive(Default)]
struct State {
    kinds: BTreeMap<KindKey, KindState>,
    objects: BTreeMap<ObjectKey, Value>,
    resource_version: u64,
}

impl State {
    /// Registration is asynchronous, every operation brings pending types closer to being served
    fn tick(&mut self) {
        for state in self.kinds.values_mut() {
            state.pending = state.pending.saturating_sub(1);
        }
    }

    fn served(&self, ty: &ResourceType) -> Result<bool> {
        match self.kinds.get(&KindKey::from(ty)) {
            Some(state) if state.pending == 0 => Ok(state.namespaced),
            _ => Err(StoreError::TypeNotRegistered(ty.clone())),
        }
    }

    fn key(&self, reference: &ResourceReference) -> Result<ObjectKey> {
        let namespaced = self.served(&reference.resource_type())?;
        Ok(ObjectKey {
            kind: KindKey::from(&reference.resource_type()),
            namespace: if namespaced {
                Some(reference.namespace.clone().unwrap_or_else(|| "default".to_owned()))
            } else {
                None
            },
            name: reference.name.clone(),
        })
    }

    fn next_version(&mut self) -> String {
        self.resource_version += 1;
        self.resource_version.to_string()
    }

    fn register_definition(&mut self, definition: &Value, lag: u32) {
        let spec = &definition["spec"];
        let (Some(group), Some(kind)) = (spec["group"].as_str(), spec["names"]["kind"].as_str())
        else {
            log::warn!("Ignoring malformed CustomResourceDefinition");
            return;
        };
        let key = KindKey {
            group: group.to_owned(),
            kind: kind.to_owned(),
        };
        let namespaced = spec["scope"].as_str() != Some("Cluster");
        self.kinds.entry(key).or_insert(KindState {
            namespaced,
            pending: lag,
        });
    }

    fn unregister_definition(&mut self, definition: &Value) {
        let spec = &definition["spec"];
        if let (Some(group), Some(kind)) = (spec["group"].as_str(), spec["names"]["kind"].as_str()) {
            let key = KindKey {
                group: group.to_owned(),
                kind: kind.to_owned(),
            };
            self.kinds.remove(&key);
            // Instances go away together with their definition
            self.objects.retain(|object, _| object.kind != key);
        }
    }
}

/// In-process [`ObjectStore`] with kubernetes-like semantics.
///
/// Types defined by CustomResourceDefinitions become served only after
/// `registration_lag` further store operations, imitating asynchronous registration.
pub struct MemoryStore {
    state: Mutex<State>,
    registration_lag: u32,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let mut state = State::default();
        for (api_version, kind, namespaced) in [
            ("v1", "ConfigMap", true),
            ("v1", "Secret", true),
            ("v1", "Service", true),
            ("v1", "Namespace", false),
            ("apiextensions.k8s.io/v1", "CustomResourceDefinition", false),
        ] {
            state.kinds.insert(
                KindKey::from(&ResourceType::new(api_version, kind)),
                KindState {
                    namespaced,
                    pending: 0,
                },
            );
        }
        Self {
            state: Mutex::new(state),
            registration_lag: 0,
        }
    }

    pub fn with_registration_lag(mut self, operations: u32) -> Self {
        self.registration_lag = operations;
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.tick();
        state
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, reference: &ResourceReference) -> Result<Option<Value>> {
        let state = self.lock();
        let key = state.key(reference)?;
        Ok(state.objects.get(&key).cloned())
    }

    async fn create(&self, reference: &ResourceReference, object: &Value) -> Result<Value> {
        let mut state = self.lock();
        let key = state.key(reference)?;
        if state.objects.contains_key(&key) {
            return Err(StoreError::Conflict(reference.clone()));
        }
        let mut object = object.clone();
        let version = state.next_version();
        resource::set_resource_version(&mut object, &version);
        if is_type_defining(reference) {
            state.register_definition(&object, self.registration_lag);
        }
        state.objects.insert(key, object.clone());
        Ok(object)
    }

    async fn update(&self, reference: &ResourceReference, object: &Value) -> Result<Value> {
        let mut state = self.lock();
        let key = state.key(reference)?;
        let live = state
            .objects
            .get(&key)
            .ok_or_else(|| StoreError::NotFound(reference.clone()))?;
        if let Some(expected) = resource::resource_version(object) {
            if resource::resource_version(live) != Some(expected) {
                return Err(StoreError::Conflict(reference.clone()));
            }
        }
        let mut object = object.clone();
        let version = state.next_version();
        resource::set_resource_version(&mut object, &version);
        if is_type_defining(reference) {
            state.register_definition(&object, self.registration_lag);
        }
        state.objects.insert(key, object.clone());
        Ok(object)
    }

    async fn delete(&self, reference: &ResourceReference) -> Result<bool> {
        let mut state = self.lock();
        let key = match state.key(reference) {
            Ok(key) => key,
            Err(StoreError::TypeNotRegistered(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        match state.objects.remove(&key) {
            Some(removed) => {
                if is_type_defining(reference) {
                    state.unregister_definition(&removed);
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list(&self, ty: &ResourceType, namespace: Option<&str>) -> Result<Vec<Value>> {
        let state = self.lock();
        // Namespace is meaningless for cluster-scoped kinds
        let namespace = if state.served(ty)? { namespace } else { None };
        let kind = KindKey::from(ty);
        Ok(state
            .objects
            .iter()
            .filter(|(key, _)| key.kind == kind)
            .filter(|(key, _)| namespace.is_none() || key.namespace.as_deref() == namespace)
            .map(|(_, object)| object.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cm(name: &str) -> (ResourceReference, Value) {
        (
            ResourceReference::new("v1", "ConfigMap", Some("default"), name),
            json!({
                "apiVersion": "v1",
                "kind": "ConfigMap",
                "metadata": {"name": name, "namespace": "default"},
            }),
        )
    }

    fn crontab_crd() -> (ResourceReference, Value) {
        (
            ResourceReference::new(
                "apiextensions.k8s.io/v1beta1",
                "CustomResourceDefinition",
                None,
                "crontabs.stable.example.com",
            ),
            json!({
                "apiVersion": "apiextensions.k8s.io/v1beta1",
                "kind": "CustomResourceDefinition",
                "metadata": {"name": "crontabs.stable.example.com"},
                "spec": {
                    "group": "stable.example.com",
                    "scope": "Namespaced",
                    "names": {"plural": "crontabs", "kind": "CronTab"},
                },
            }),
        )
    }

    #[tokio::test]
    async fn create_get_update_delete() {
        let store = MemoryStore::new();
        let (reference, object) = cm("cm1");

        assert!(store.get(&reference).await.unwrap().is_none());
        let created = store.create(&reference, &object).await.unwrap();
        assert_eq!(resource::resource_version(&created), Some("1"));
        assert!(matches!(
            store.create(&reference, &object).await,
            Err(StoreError::Conflict(_))
        ));

        let updated = store.update(&reference, &created).await.unwrap();
        assert_eq!(resource::resource_version(&updated), Some("2"));
        // token from the first read is stale now
        assert!(matches!(
            store.update(&reference, &created).await,
            Err(StoreError::Conflict(_))
        ));

        assert!(store.delete(&reference).await.unwrap());
        assert!(!store.delete(&reference).await.unwrap());
        assert!(matches!(
            store.update(&reference, &object).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn list_by_namespace() {
        let store = MemoryStore::new();
        for name in ["a", "b"] {
            let (reference, object) = cm(name);
            store.create(&reference, &object).await.unwrap();
        }
        let other = ResourceReference::new("v1", "ConfigMap", Some("other"), "c");
        store.create(&other, &json!({"metadata": {"name": "c"}})).await.unwrap();

        let ty = ResourceType::new("v1", "ConfigMap");
        assert_eq!(store.list(&ty, Some("default")).await.unwrap().len(), 2);
        assert_eq!(store.list(&ty, None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn cluster_scoped_list_ignores_namespace() {
        let store = MemoryStore::new();
        let prod = ResourceReference::new("v1", "Namespace", None, "prod");
        store
            .create(&prod, &json!({"metadata": {"name": "prod"}}))
            .await
            .unwrap();

        let ty = ResourceType::new("v1", "Namespace");
        assert_eq!(store.list(&ty, Some("default")).await.unwrap().len(), 1);
        assert_eq!(store.list(&ty, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn definitions_register_after_lag() {
        let store = MemoryStore::new().with_registration_lag(2);
        let (crd, object) = crontab_crd();
        let cron = ResourceReference::new("stable.example.com/v1", "CronTab", Some("default"), "c");
        let cron_type = cron.resource_type();

        assert!(matches!(
            store.get(&cron).await,
            Err(StoreError::TypeNotRegistered(_))
        ));
        store.create(&crd, &object).await.unwrap();
        assert!(matches!(
            store.get(&cron).await,
            Err(StoreError::TypeNotRegistered(ty)) if ty == cron_type
        ));
        assert!(store.get(&cron).await.unwrap().is_none());

        store
            .create(&cron, &json!({"metadata": {"name": "c", "namespace": "default"}}))
            .await
            .unwrap();
        assert_eq!(store.list(&cron_type, None).await.unwrap().len(), 1);

        assert!(store.delete(&crd).await.unwrap());
        assert!(matches!(
            store.list(&cron_type, None).await,
            Err(StoreError::TypeNotRegistered(_))
        ));
        assert!(!store.delete(&cron).await.unwrap());
    }
}
