use std::sync::Arc;

use kapply_inventory::{InventoryRecord, INVENTORY_HASH_ANNOTATION};

use crate::{
    delete::{remove_all, Removed},
    error::{Error, Result},
    inventory,
    resource::Batch,
    store::ObjectStore,
};

/// Removes objects of previous generations which are no longer declared
pub struct Pruner<S> {
    store: Arc<S>,
    concurrency: usize,
}

impl<S: ObjectStore> Pruner<S> {
    pub fn new(store: Arc<S>, concurrency: usize) -> Self {
        Self { store, concurrency }
    }

    /// Deletion is best-effort: objects which failed to be deleted stay recorded
    /// as prune candidates, and the call fails after the inventory is rewritten.
    pub async fn prune(&self, batch: &Batch) -> Result<Vec<Removed>> {
        let Some(declared) = &batch.inventory else {
            log::info!("No inventory object declared, nothing to prune");
            return Ok(vec![]);
        };
        let reference = declared.reference();
        let current = batch.current_set();

        let live = self
            .store
            .get(reference)
            .await
            .map_err(|e| Error::read(reference, e))?;
        let Some(live) = live else {
            log::warn!("{} is not applied yet, nothing to prune", reference);
            return Ok(vec![]);
        };
        let record = inventory::read_record(&live).map_err(|source| Error::Inventory {
            reference: reference.clone(),
            source,
        })?;

        let mut stale = record.stale(&current);
        // Inventory object may be declared as a regular object in older generations
        stale.remove(reference);
        for item in stale.iter() {
            log::warn!("pruning {}", item);
        }

        let removal = remove_all(&*self.store, self.concurrency, stale.into_iter().collect()).await;

        let hash = declared
            .annotation(INVENTORY_HASH_ANNOTATION)
            .map(ToOwned::to_owned)
            .or(record.hash);
        let mut next = InventoryRecord::new(current, hash);
        next.previous.extend(
            removal
                .failed
                .iter()
                .map(|(reference, _)| reference.clone())
                .chain(removal.skipped.iter().cloned()),
        );

        // live object carries the resourceVersion we have read, stale one is rejected
        let mut object = live;
        inventory::write_record(&mut object, &next);
        self.store
            .update(reference, &object)
            .await
            .map_err(|e| Error::apply(reference, e))?;

        match Error::aggregate(removal.failed.into_iter().map(|(_, e)| e).collect()) {
            Some(error) => Err(error),
            None => Ok(removal.removed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::{
        tests::{crontab, fast_retry, Racing},
        Applier, RetryPolicy,
    };
    use crate::resource::tests::{config_map, inventory};
    use crate::resource::DeclaredResource;
    use crate::store::{MemoryStore, StoreError};
    use async_trait::async_trait;
    use kapply_inventory::{ResourceReference, ResourceType};
    use serde_json::Value;

    async fn config_maps<S: ObjectStore>(store: &S) -> Vec<String> {
        store
            .list(&ResourceType::new("v1", "ConfigMap"), Some("default"))
            .await
            .unwrap()
            .iter()
            .map(|object| object["metadata"]["name"].as_str().unwrap().to_owned())
            .collect()
    }

    async fn apply<S: ObjectStore>(store: &Arc<S>, resources: Vec<DeclaredResource>) -> Batch {
        let batch = Batch::split(resources).unwrap();
        Applier::new(store.clone(), 4, fast_retry())
            .apply(&batch)
            .await
            .unwrap();
        batch
    }

    #[tokio::test]
    async fn prunes_exactly_the_difference() {
        let store = Arc::new(MemoryStore::new());
        let pruner = Pruner::new(store.clone(), 4);

        let v1 = apply(
            &store,
            vec![config_map("cm1"), config_map("cm2"), inventory(&["cm1", "cm2"], "1")],
        )
        .await;
        assert!(pruner.prune(&v1).await.unwrap().is_empty());
        assert_eq!(config_maps(&*store).await, vec!["cm1", "cm2", "inventory"]);

        let v2 = apply(
            &store,
            vec![config_map("cm2"), config_map("cm3"), inventory(&["cm2", "cm3"], "2")],
        )
        .await;
        assert_eq!(config_maps(&*store).await.len(), 4);

        let pruned = pruner.prune(&v2).await.unwrap();
        assert_eq!(
            pruned,
            vec![Removed {
                reference: config_map("cm1").reference().clone(),
                existed: true,
            }]
        );
        assert_eq!(config_maps(&*store).await, vec!["cm2", "cm3", "inventory"]);

        let live = store.get(v2.inventory.as_ref().unwrap().reference()).await.unwrap().unwrap();
        let record = inventory::read_record(&live).unwrap();
        assert_eq!(record.current, v2.current_set());
        assert!(record.previous.is_empty());
        assert_eq!(record.hash.as_deref(), Some("2"));

        // nothing left to prune on rerun
        assert!(pruner.prune(&v2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn never_prunes_declared_objects() {
        let store = Arc::new(MemoryStore::new());
        let pruner = Pruner::new(store.clone(), 4);
        apply(&store, vec![config_map("cm1"), inventory(&["cm1"], "1")]).await;
        apply(&store, vec![config_map("cm2"), inventory(&["cm2"], "2")]).await;

        // cm1 is recorded as stale, but declared again
        let batch = Batch::split(vec![config_map("cm1"), config_map("cm2"), inventory(&[], "3")]).unwrap();
        assert!(pruner.prune(&batch).await.unwrap().is_empty());
        assert_eq!(config_maps(&*store).await, vec!["cm1", "cm2", "inventory"]);
    }

    #[tokio::test]
    async fn without_inventory() {
        let store = Arc::new(MemoryStore::new());
        let pruner = Pruner::new(store.clone(), 4);
        assert!(pruner.prune(&Batch::default()).await.unwrap().is_empty());

        // declared, but never applied
        let batch = Batch::split(vec![config_map("cm1"), inventory(&["cm1"], "1")]).unwrap();
        assert!(pruner.prune(&batch).await.unwrap().is_empty());
        assert!(config_maps(&*store).await.is_empty());
    }

    #[tokio::test]
    async fn malformed_live_inventory() {
        let store = Arc::new(MemoryStore::new());
        let batch = apply(&store, vec![inventory(&[], "1")]).await;
        let reference = batch.inventory.as_ref().unwrap().reference();
        let mut live = store.get(reference).await.unwrap().unwrap();
        crate::resource::set_annotation(
            &mut live,
            kapply_inventory::INVENTORY_ANNOTATION,
            "{broken".to_owned(),
        );
        store.update(reference, &live).await.unwrap();

        let err = Pruner::new(store.clone(), 1).prune(&batch).await.unwrap_err();
        assert!(matches!(err, Error::Inventory { .. }));
    }

    #[tokio::test]
    async fn stale_inventory_token_conflicts() {
        let inner = MemoryStore::new();
        for resource in [config_map("cm1"), inventory(&["cm1"], "1")] {
            inner.create(resource.reference(), resource.object()).await.unwrap();
        }
        let store = Arc::new(Racing::new(inner));

        let batch = Batch::split(vec![inventory(&[], "2")]).unwrap();
        let err = Pruner::new(store.clone(), 1).prune(&batch).await.unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
        assert!(!matches!(err, Error::Apply { source: StoreError::Conflict(_), .. }));
    }

    #[tokio::test]
    async fn objects_of_failed_apply_are_pruned() {
        let store = Arc::new(MemoryStore::new());
        let applier = Applier::new(
            store.clone(),
            4,
            RetryPolicy {
                max_attempts: 1,
                ..fast_retry()
            },
        );
        let pruner = Pruner::new(store.clone(), 4);

        applier
            .apply(&Batch::split(vec![config_map("cm1"), inventory(&["cm1"], "1")]).unwrap())
            .await
            .unwrap();
        // CronTab is never registered, cm2 is created anyway
        applier
            .apply(
                &Batch::split(vec![config_map("cm2"), crontab(), inventory(&["cm2"], "2")]).unwrap(),
            )
            .await
            .unwrap_err();
        assert_eq!(config_maps(&*store).await, vec!["cm1", "cm2", "inventory"]);

        let v3 = apply(&store, vec![config_map("cm3"), inventory(&["cm3"], "3")]).await;
        let mut pruned: Vec<_> = pruner
            .prune(&v3)
            .await
            .unwrap()
            .into_iter()
            .map(|removed| removed.reference.name)
            .collect();
        pruned.sort();
        assert_eq!(pruned, vec!["cm1", "cm2"]);
        assert_eq!(config_maps(&*store).await, vec!["cm3", "inventory"]);
    }

    /// Refuses every deletion
    struct ReadOnly(MemoryStore);

    #[async_trait]
    impl ObjectStore for ReadOnly {
        async fn get(&self, reference: &ResourceReference) -> crate::store::Result<Option<Value>> {
            self.0.get(reference).await
        }
        async fn create(&self, reference: &ResourceReference, object: &Value) -> crate::store::Result<Value> {
            self.0.create(reference, object).await
        }
        async fn update(&self, reference: &ResourceReference, object: &Value) -> crate::store::Result<Value> {
            self.0.update(reference, object).await
        }
        async fn delete(&self, reference: &ResourceReference) -> crate::store::Result<bool> {
            Err(StoreError::NotFound(reference.clone()))
        }
        async fn list(&self, ty: &ResourceType, namespace: Option<&str>) -> crate::store::Result<Vec<Value>> {
            self.0.list(ty, namespace).await
        }
    }

    #[tokio::test]
    async fn failed_deletions_stay_candidates() {
        let store = Arc::new(ReadOnly(MemoryStore::new()));
        apply(&store, vec![config_map("cm1"), inventory(&["cm1"], "1")]).await;
        let v2 = apply(&store, vec![config_map("cm2"), inventory(&["cm2"], "2")]).await;

        let err = Pruner::new(store.clone(), 4).prune(&v2).await.unwrap_err();
        assert_eq!(err.references(), vec![config_map("cm1").reference()]);

        let live = store.get(v2.inventory.as_ref().unwrap().reference()).await.unwrap().unwrap();
        let record = inventory::read_record(&live).unwrap();
        assert_eq!(record.current, v2.current_set());
        assert!(record.previous.contains(config_map("cm1").reference()));
    }
}
