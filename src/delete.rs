use std::sync::Arc;

use futures::{stream, StreamExt};
use kapply_inventory::{InventoryRecord, InventorySet, ResourceReference};

use crate::{
    error::{Error, Result},
    inventory, order,
    resource::Batch,
    store::ObjectStore,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Removed {
    pub reference: ResourceReference,
    /// `false` if object was already absent
    pub existed: bool,
}

#[derive(Debug, Default)]
pub(crate) struct Removal {
    pub removed: Vec<Removed>,
    pub failed: Vec<(ResourceReference, Error)>,
    /// Not attempted because an earlier wave failed
    pub skipped: Vec<ResourceReference>,
}

/// Delete references wave by wave, instances before their definitions.
///
/// Every reference of a wave is attempted, later waves only run if it fully succeeded.
pub(crate) async fn remove_all<S: ObjectStore>(
    store: &S,
    concurrency: usize,
    references: Vec<ResourceReference>,
) -> Removal {
    let mut out = Removal::default();

    for wave in order::delete_waves(references, |r| r) {
        if !out.failed.is_empty() {
            out.skipped.extend(wave);
            continue;
        }
        let results: Vec<_> = stream::iter(wave)
            .map(|reference| async move {
                let result = store.delete(&reference).await;
                (reference, result)
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;

        for (reference, result) in results {
            match result {
                Ok(existed) => {
                    if existed {
                        log::info!("{} deleted", reference);
                    } else {
                        log::debug!("{} is already absent", reference);
                    }
                    out.removed.push(Removed { reference, existed });
                }
                Err(e) => {
                    let error = Error::delete(&reference, e);
                    log::warn!("{}", error);
                    out.failed.push((reference, error));
                }
            }
        }
    }

    out
}

/// Removes every declared resource, then the inventory object
pub struct Deleter<S> {
    store: Arc<S>,
    concurrency: usize,
}

impl<S: ObjectStore> Deleter<S> {
    pub fn new(store: Arc<S>, concurrency: usize) -> Self {
        Self { store, concurrency }
    }

    pub async fn delete(&self, batch: &Batch) -> Result<Vec<Removed>> {
        let references = batch
            .resources
            .iter()
            .map(|resource| resource.reference().clone())
            .collect();
        let mut removal = remove_all(&*self.store, self.concurrency, references).await;

        if !removal.skipped.is_empty() {
            log::warn!(
                "Keeping {} objects which others may depend on, rerun delete after fixing errors",
                removal.skipped.len()
            );
        }
        if let Some(error) = Error::aggregate(removal.failed.into_iter().map(|(_, e)| e).collect()) {
            return Err(error);
        }

        // Inventory goes last, so interrupted delete can be resumed
        if let Some(inventory) = &batch.inventory {
            let reference = inventory.reference();
            self.warn_abandoned(reference, batch).await;
            let existed = self
                .store
                .delete(reference)
                .await
                .map_err(|e| Error::delete(reference, e))?;
            if existed {
                log::info!("{} deleted", reference);
            }
            removal.removed.push(Removed {
                reference: reference.clone(),
                existed,
            });
        }

        Ok(removal.removed)
    }

    /// Prune candidates of older generations lose their last tracking record with the inventory
    async fn warn_abandoned(&self, reference: &ResourceReference, batch: &Batch) {
        let record = match self.store.get(reference).await {
            Ok(Some(live)) => match inventory::read_record(&live) {
                Ok(record) => record,
                Err(e) => {
                    log::warn!("Ignoring malformed inventory on {}: {}", reference, e);
                    return;
                }
            },
            Ok(None) => return,
            Err(e) => {
                log::warn!("Failed to read {}: {}", reference, e);
                return;
            }
        };
        for abandoned in abandoned(&record, batch).iter() {
            log::warn!("{} was not pruned and is no longer tracked, delete it manually", abandoned);
        }
    }
}

/// Objects recorded on inventory which delete of `batch` leaves behind
fn abandoned(record: &InventoryRecord, batch: &Batch) -> InventorySet {
    let mut out = record.tracked().difference(&batch.current_set());
    if let Some(inventory) = &batch.inventory {
        out.remove(inventory.reference());
    }
    out
}
