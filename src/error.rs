use std::fmt::Write;

use kapply_inventory::ResourceReference;
use thiserror::Error;

use crate::{config::ConfigError, store::StoreError};

fn describe_all(errors: &[Error]) -> String {
    let mut out = format!("{} operations failed:", errors.len());
    for error in errors {
        let _ = write!(out, "\n- {}", error);
    }
    out
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid declared resources: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to apply {reference}: {source}")]
    Apply {
        reference: ResourceReference,
        #[source]
        source: StoreError,
    },
    #[error("failed to delete {reference}: {source}")]
    Delete {
        reference: ResourceReference,
        #[source]
        source: StoreError,
    },
    #[error("failed to read {reference}: {source}")]
    Read {
        reference: ResourceReference,
        #[source]
        source: StoreError,
    },
    #[error("{reference} was modified concurrently, retry the whole operation")]
    Conflict { reference: ResourceReference },
    #[error("malformed inventory on {reference}: {source}")]
    Inventory {
        reference: ResourceReference,
        #[source]
        source: kapply_inventory::Error,
    },
    #[error("{}", describe_all(.0))]
    Aggregate(Vec<Error>),
    #[error("deadline exceeded")]
    DeadlineExceeded,
}
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Stale concurrency tokens are reported as [`Error::Conflict`]
    pub(crate) fn apply(reference: &ResourceReference, source: StoreError) -> Self {
        match source {
            StoreError::Conflict(_) => Self::Conflict {
                reference: reference.clone(),
            },
            source => Self::Apply {
                reference: reference.clone(),
                source,
            },
        }
    }

    pub(crate) fn delete(reference: &ResourceReference, source: StoreError) -> Self {
        Self::Delete {
            reference: reference.clone(),
            source,
        }
    }

    pub(crate) fn read(reference: &ResourceReference, source: StoreError) -> Self {
        Self::Read {
            reference: reference.clone(),
            source,
        }
    }

    /// Collapse per-object failures, `None` if nothing failed
    pub(crate) fn aggregate(mut errors: Vec<Error>) -> Option<Self> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(Self::Aggregate(errors)),
        }
    }

    /// Every object this error is about
    pub fn references(&self) -> Vec<&ResourceReference> {
        match self {
            Self::Apply { reference, .. }
            | Self::Delete { reference, .. }
            | Self::Read { reference, .. }
            | Self::Conflict { reference }
            | Self::Inventory { reference, .. } => vec![reference],
            Self::Aggregate(errors) => errors.iter().flat_map(Self::references).collect(),
            Self::Config(ConfigError::MultipleInventoryObjects(references)) => {
                references.iter().collect()
            }
            Self::Config(_) | Self::DeadlineExceeded => vec![],
        }
    }
}
