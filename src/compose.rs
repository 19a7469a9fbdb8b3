use std::sync::Arc;

use crate::{
    apply::{Applier, RetryPolicy},
    config::{ConfigProvider, ProviderChain},
    connection::{ConnectionConfig, ConnectionError},
    delete::Deleter,
    prune::Pruner,
    reconciler::Reconciler,
    status::StatusReader,
    store::{KubeStore, ObjectStore},
};

pub const DEFAULT_FIELD_MANAGER: &str = "kapply";

#[derive(Clone, Debug)]
pub struct ReconcileOptions {
    pub field_manager: String,
    /// Max per-resource operations in flight
    pub concurrency: usize,
    pub retry: RetryPolicy,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            field_manager: DEFAULT_FIELD_MANAGER.to_owned(),
            concurrency: 8,
            retry: RetryPolicy::default(),
        }
    }
}

/// Wire every component around a single store
pub fn build<S: ObjectStore>(
    store: Arc<S>,
    provider: Box<dyn ConfigProvider>,
    options: &ReconcileOptions,
) -> Reconciler<S> {
    let concurrency = options.concurrency.max(1);
    Reconciler::new(
        provider,
        Applier::new(store.clone(), concurrency, options.retry.clone()),
        Pruner::new(store.clone(), concurrency),
        Deleter::new(store.clone(), concurrency),
        StatusReader::new(store, concurrency),
    )
}

/// [`build`] against the cluster described by `connection`, with default config providers
pub async fn connect(
    connection: &ConnectionConfig,
    options: &ReconcileOptions,
) -> Result<Reconciler<KubeStore>, ConnectionError> {
    let (client, namespace) = connection.client().await?;
    let store = KubeStore::new(client, namespace, Some(options.field_manager.clone()));
    Ok(build(
        Arc::new(store),
        Box::new(ProviderChain::default()),
        options,
    ))
}
