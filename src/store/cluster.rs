use std::collections::BTreeMap;

use async_trait::async_trait;
use kapply_inventory::{ResourceReference, ResourceType};
use kube::{
    api::{Api, ApiResource, DeleteParams, DynamicObject, ListParams, PostParams},
    Client,
};
use serde_json::Value;
use tokio::sync::RwLock;

use super::{ObjectStore, Result, StoreError};

pub type RuntimeTypeData = BTreeMap<ResourceType, ObjectData>;

/// Represents object kind metadata
#[derive(Clone, Debug)]
pub struct ObjectData {
    pub namespaced: bool,
    pub plural: String,
}

/// List all defined object kinds with additional meta
pub async fn list_apis(client: &Client) -> Result<RuntimeTypeData, kube::Error> {
    let mut out = BTreeMap::new();

    for version in client.list_core_api_versions().await?.versions {
        for resource in client.list_core_api_resources(&version).await?.resources {
            if resource.name.contains('/') {
                continue;
            }
            out.insert(
                ResourceType::new(&version, &resource.kind),
                ObjectData {
                    namespaced: resource.namespaced,
                    plural: resource.name,
                },
            );
        }
    }

    for group in client.list_api_groups().await?.groups {
        for version in group.versions {
            // Aggregated apis may be unavailable, this shouldn't break unrelated objects
            let resources = match client
                .list_api_group_resources(&version.group_version)
                .await
            {
                Ok(list) => list.resources,
                Err(e) => {
                    log::warn!("Skipping {} discovery: {}", version.group_version, e);
                    continue;
                }
            };
            for resource in resources {
                if resource.name.contains('/') {
                    continue;
                }
                out.insert(
                    ResourceType::new(&version.group_version, &resource.kind),
                    ObjectData {
                        namespaced: resource.namespaced,
                        plural: resource.name,
                    },
                );
            }
        }
    }

    Ok(out)
}

fn api_resource(ty: &ResourceType, data: &ObjectData) -> (ApiResource, bool) {
    (
        ApiResource {
            group: ty.group.clone(),
            version: ty.version.clone(),
            api_version: ty.api_version(),
            kind: ty.kind.clone(),
            plural: data.plural.clone(),
        },
        data.namespaced,
    )
}

/// [`ObjectStore`] backed by a kubernetes api server
pub struct KubeStore {
    client: Client,
    default_namespace: String,
    post_params: PostParams,
    delete_params: DeleteParams,
    types: RwLock<RuntimeTypeData>,
}

impl KubeStore {
    pub fn new(client: Client, default_namespace: impl Into<String>, field_manager: Option<String>) -> Self {
        Self {
            client,
            default_namespace: default_namespace.into(),
            post_params: PostParams {
                field_manager,
                ..PostParams::default()
            },
            delete_params: DeleteParams::default(),
            types: RwLock::new(BTreeMap::new()),
        }
    }

    /// Discovery is cached, new types (i.e from just applied CRDs) trigger rediscovery
    async fn resolve(&self, ty: &ResourceType) -> Result<(ApiResource, bool)> {
        let cached = self
            .types
            .read()
            .await
            .get(ty)
            .map(|data| api_resource(ty, data));
        if let Some(found) = cached {
            return Ok(found);
        }

        log::debug!("{} is not known, refreshing api discovery", ty);
        let discovered = list_apis(&self.client).await?;
        let found = discovered.get(ty).map(|data| api_resource(ty, data));
        *self.types.write().await = discovered;
        found.ok_or_else(|| StoreError::TypeNotRegistered(ty.clone()))
    }

    async fn api(&self, reference: &ResourceReference) -> Result<Api<DynamicObject>> {
        let (resource, namespaced) = self.resolve(&reference.resource_type()).await?;
        Ok(if namespaced {
            let namespace = reference
                .namespace
                .as_deref()
                .unwrap_or(&self.default_namespace);
            Api::namespaced_with(self.client.clone(), namespace, &resource)
        } else {
            Api::all_with(self.client.clone(), &resource)
        })
    }

    async fn classify(&self, reference: &ResourceReference, err: kube::Error) -> StoreError {
        match err {
            kube::Error::Api(response) if response.code == 409 => {
                StoreError::Conflict(reference.clone())
            }
            kube::Error::Api(response) if response.code == 404 => {
                // Endpoint itself is missing, definition was removed or is not served yet
                if response
                    .message
                    .contains("could not find the requested resource")
                {
                    let ty = reference.resource_type();
                    self.types.write().await.remove(&ty);
                    StoreError::TypeNotRegistered(ty)
                } else {
                    StoreError::NotFound(reference.clone())
                }
            }
            err => err.into(),
        }
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get(&self, reference: &ResourceReference) -> Result<Option<Value>> {
        let api = self.api(reference).await?;
        match api.get_opt(&reference.name).await {
            Ok(found) => Ok(found.map(serde_json::to_value).transpose()?),
            Err(err) => Err(self.classify(reference, err).await),
        }
    }

    async fn create(&self, reference: &ResourceReference, object: &Value) -> Result<Value> {
        let api = self.api(reference).await?;
        let object: DynamicObject = serde_json::from_value(object.clone())?;
        log::trace!("Creating {}", reference);
        match api.create(&self.post_params, &object).await {
            Ok(created) => Ok(serde_json::to_value(created)?),
            Err(err) => Err(self.classify(reference, err).await),
        }
    }

    async fn update(&self, reference: &ResourceReference, object: &Value) -> Result<Value> {
        let api = self.api(reference).await?;
        let object: DynamicObject = serde_json::from_value(object.clone())?;
        log::trace!("Replacing {}", reference);
        match api
            .replace(&reference.name, &self.post_params, &object)
            .await
        {
            Ok(updated) => Ok(serde_json::to_value(updated)?),
            Err(err) => Err(self.classify(reference, err).await),
        }
    }

    async fn delete(&self, reference: &ResourceReference) -> Result<bool> {
        // Unknown type can't have live objects
        let api = match self.api(reference).await {
            Ok(api) => api,
            Err(StoreError::TypeNotRegistered(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        match api.delete(&reference.name, &self.delete_params).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(response)) if response.code == 404 => Ok(false),
            Err(err) => Err(self.classify(reference, err).await),
        }
    }

    async fn list(&self, ty: &ResourceType, namespace: Option<&str>) -> Result<Vec<Value>> {
        let (resource, namespaced) = self.resolve(ty).await?;
        let api: Api<DynamicObject> = match namespace {
            Some(namespace) if namespaced => {
                Api::namespaced_with(self.client.clone(), namespace, &resource)
            }
            _ => Api::all_with(self.client.clone(), &resource),
        };
        let list = api.list(&ListParams::default()).await?;
        Ok(list
            .items
            .into_iter()
            .map(serde_json::to_value)
            .collect::<Result<_, _>>()?)
    }
}
