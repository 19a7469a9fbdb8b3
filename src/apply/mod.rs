mod retry;

pub use retry::{PendingRetry, RetryPolicy};

use std::{
    fmt::{self, Display},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use futures::{stream, StreamExt};
use kapply_inventory::{InventoryRecord, InventorySet, ResourceReference, INVENTORY_HASH_ANNOTATION};
use serde_json::Value;

use crate::{
    error::{Error, Result},
    inventory, order,
    resource::{self, Batch, DeclaredResource},
    store::{ObjectStore, StoreError},
};

/// What happened to an object during apply
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Created,
    Configured,
}

impl Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Configured => write!(f, "configured"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Applied {
    pub reference: ResourceReference,
    pub action: Action,
}

/// Create-or-update of declared resources
pub struct Applier<S> {
    store: Arc<S>,
    concurrency: usize,
    retry: RetryPolicy,
}

impl<S: ObjectStore> Applier<S> {
    pub fn new(store: Arc<S>, concurrency: usize, retry: RetryPolicy) -> Self {
        Self {
            store,
            concurrency: concurrency.max(1),
            retry,
        }
    }

    /// Apply every resource, then record the new generation on the inventory object.
    ///
    /// Fails on first unrecoverable error, already applied objects are left in place
    /// and recorded as prune candidates.
    pub async fn apply(&self, batch: &Batch) -> Result<Vec<Applied>> {
        let mut applied = Vec::with_capacity(batch.resources.len() + 1);

        for wave in order::apply_waves(batch.resources.iter().collect::<Vec<_>>(), |r| r.reference()) {
            let (done, errors) = self.apply_wave(wave).await;
            applied.extend(done);
            if let Some(error) = Error::aggregate(errors) {
                if let Some(inventory) = &batch.inventory {
                    self.record_partial(inventory, &applied).await;
                }
                return Err(error);
            }
        }

        if let Some(inventory) = &batch.inventory {
            applied.push(self.apply_inventory(inventory, batch.current_set()).await?);
        }

        Ok(applied)
    }

    /// Resources not started before the first failure are skipped, started ones run to completion
    async fn apply_wave(&self, wave: Vec<&DeclaredResource>) -> (Vec<Applied>, Vec<Error>) {
        let failed = AtomicBool::new(false);
        let failed = &failed;
        let results: Vec<Option<Result<Applied>>> = stream::iter(wave)
            .map(|resource| async move {
                if failed.load(Ordering::SeqCst) {
                    return None;
                }
                let result = self.apply_resource(resource).await;
                if result.is_err() {
                    failed.store(true, Ordering::SeqCst);
                }
                Some(result)
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut done = vec![];
        let mut errors = vec![];
        for result in results.into_iter().flatten() {
            match result {
                Ok(applied) => done.push(applied),
                Err(e) => errors.push(e),
            }
        }
        (done, errors)
    }

    /// Keep objects of a failed apply tracked, so they can be pruned later.
    ///
    /// Live generation is left as is, new objects only become prune candidates.
    async fn record_partial(&self, inventory: &DeclaredResource, applied: &[Applied]) {
        let reference = inventory.reference();
        let created: InventorySet = applied
            .iter()
            .map(|applied| applied.reference.clone())
            .collect();
        if created.is_empty() {
            return;
        }

        let result = self
            .apply_with_retry(reference, |live| {
                let (mut record, mut object) = match live {
                    Some(live) => (
                        inventory::read_record(live).map_err(|source| Error::Inventory {
                            reference: reference.clone(),
                            source,
                        })?,
                        live.clone(),
                    ),
                    None => (InventoryRecord::default(), inventory.object().clone()),
                };
                let untracked = created.difference(&record.tracked());
                log::debug!(
                    "Recording {} partially applied objects on {}",
                    untracked.len(),
                    reference
                );
                record.previous.extend(untracked);
                inventory::write_record(&mut object, &record);
                Ok(object)
            })
            .await;
        if let Err(e) = result {
            log::warn!("Failed to record partially applied objects: {}", e);
        }
    }

    async fn apply_resource(&self, resource: &DeclaredResource) -> Result<Applied> {
        self.apply_with_retry(resource.reference(), |_| Ok(resource.object().clone()))
            .await
    }

    async fn apply_inventory(
        &self,
        inventory: &DeclaredResource,
        current: InventorySet,
    ) -> Result<Applied> {
        let reference = inventory.reference();
        let hash = inventory
            .annotation(INVENTORY_HASH_ANNOTATION)
            .map(ToOwned::to_owned);

        self.apply_with_retry(reference, |live| {
            let live_record = match live {
                Some(live) => {
                    inventory::read_record(live).map_err(|source| Error::Inventory {
                        reference: reference.clone(),
                        source,
                    })?
                }
                None => InventoryRecord::default(),
            };
            let record = live_record.roll_forward(current.clone(), hash.clone());
            log::debug!(
                "Recording {} objects on {}, {} left to prune",
                record.current.len(),
                reference,
                record.previous.len()
            );

            let mut object = inventory.object().clone();
            inventory::write_record(&mut object, &record);
            Ok(object)
        })
        .await
    }

    /// Retries while object type is not registered
    async fn apply_with_retry<F>(&self, reference: &ResourceReference, render: F) -> Result<Applied>
    where
        F: Fn(Option<&Value>) -> Result<Value> + Send + Sync,
    {
        let mut retry = self.retry.start();
        loop {
            match self.apply_once(reference, &render).await {
                Err(err @ Error::Apply {
                    source: StoreError::TypeNotRegistered(_),
                    ..
                }) => match retry.next_delay() {
                    Some(delay) => {
                        log::debug!(
                            "{} (attempt {}), retrying in {:?}",
                            err,
                            retry.attempt() - 1,
                            delay
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => return Err(err),
                },
                result => return result,
            }
        }
    }

    async fn apply_once<F>(&self, reference: &ResourceReference, render: &F) -> Result<Applied>
    where
        F: Fn(Option<&Value>) -> Result<Value> + Send + Sync,
    {
        let live = self
            .store
            .get(reference)
            .await
            .map_err(|e| Error::apply(reference, e))?;
        let mut object = render(live.as_ref())?;

        let action = match live {
            None => {
                self.store
                    .create(reference, &object)
                    .await
                    .map_err(|e| Error::apply(reference, e))?;
                Action::Created
            }
            Some(live) => {
                // Update is conditioned on the version we have seen
                if let Some(version) = resource::resource_version(&live) {
                    resource::set_resource_version(&mut object, version);
                }
                self.store
                    .update(reference, &object)
                    .await
                    .map_err(|e| Error::apply(reference, e))?;
                Action::Configured
            }
        };
        log::info!("{} {}", reference, action);

        Ok(Applied {
            reference: reference.clone(),
            action,
        })
    }
}
