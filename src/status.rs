use std::sync::Arc;

use futures::{stream, StreamExt, TryStreamExt};
use kapply_inventory::ResourceReference;

use crate::{
    error::{Error, Result},
    resource::{Batch, DeclaredResource},
    store::{ObjectStore, StoreError},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceStatus {
    pub reference: ResourceReference,
    pub present: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Status {
    pub resources: Vec<ResourceStatus>,
}

impl Status {
    pub fn total(&self) -> usize {
        self.resources.len()
    }

    pub fn present(&self) -> usize {
        self.resources.iter().filter(|status| status.present).count()
    }
}

/// Reports presence of declared resources, readiness is not checked
pub struct StatusReader<S> {
    store: Arc<S>,
    concurrency: usize,
}

impl<S: ObjectStore> StatusReader<S> {
    pub fn new(store: Arc<S>, concurrency: usize) -> Self {
        Self {
            store,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn status(&self, batch: &Batch) -> Result<Status> {
        let resources = stream::iter(batch.resources.iter().chain(batch.inventory.iter()))
            .map(|resource| self.resource_status(resource))
            .buffered(self.concurrency)
            .try_collect()
            .await?;
        Ok(Status { resources })
    }

    async fn resource_status(&self, resource: &DeclaredResource) -> Result<ResourceStatus> {
        let reference = resource.reference();
        let present = match self.store.get(reference).await {
            Ok(found) => found.is_some(),
            // Definition isn't applied yet
            Err(StoreError::TypeNotRegistered(_)) => false,
            Err(e) => return Err(Error::read(reference, e)),
        };
        Ok(ResourceStatus {
            reference: reference.clone(),
            present,
        })
    }
}
