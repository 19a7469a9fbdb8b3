//! Cluster connection settings, passed explicitly into [`crate::connect`]

use std::path::PathBuf;

use kube::{
    config::{InferConfigError, KubeConfigOptions, Kubeconfig, KubeconfigError},
    Client, Config,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("failed to infer cluster config: {0}")]
    Infer(#[from] InferConfigError),
    #[error("failed to load kubeconfig: {0}")]
    Kubeconfig(#[from] KubeconfigError),
    #[error("invalid master url {url}: {source}")]
    Master {
        url: String,
        #[source]
        source: http::uri::InvalidUri,
    },
    #[error("failed to create client: {0}")]
    Client(#[from] kube::Error),
}

/// Unset fields are resolved the same way kubectl does
#[derive(Clone, Debug, Default)]
pub struct ConnectionConfig {
    pub kubeconfig: Option<PathBuf>,
    pub context: Option<String>,
    /// Overrides api server url from kubeconfig
    pub master: Option<String>,
    /// Namespace for objects which don't specify one
    pub namespace: Option<String>,
}

impl ConnectionConfig {
    pub async fn load(&self) -> Result<Config, ConnectionError> {
        let options = KubeConfigOptions {
            context: self.context.clone(),
            ..KubeConfigOptions::default()
        };
        let mut config = match (&self.kubeconfig, &self.context) {
            (Some(path), _) => Config::from_custom_kubeconfig(Kubeconfig::read_from(path)?, &options).await?,
            (None, Some(_)) => Config::from_kubeconfig(&options).await?,
            (None, None) => Config::infer().await?,
        };

        if let Some(url) = &self.master {
            config.cluster_url = url.parse().map_err(|source| ConnectionError::Master {
                url: url.clone(),
                source,
            })?;
        }
        if let Some(namespace) = &self.namespace {
            config.default_namespace = namespace.clone();
        }
        Ok(config)
    }

    pub async fn client(&self) -> Result<(Client, String), ConnectionError> {
        let config = self.load().await?;
        let namespace = config.default_namespace.clone();
        log::debug!("Connecting to {}, default namespace {}", config.cluster_url, namespace);
        Ok((Client::try_from(config)?, namespace))
    }
}
