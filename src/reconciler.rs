use std::{
    fmt::{self, Display},
    path::Path,
};

use tokio::time::{timeout_at, Instant};

use crate::{
    apply::{Applied, Applier},
    config::{ConfigError, ConfigProvider},
    delete::{Deleter, Removed},
    error::{Error, Result},
    prune::Pruner,
    resource::{Batch, DeclaredResource},
    status::{Status, StatusReader},
    store::ObjectStore,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Apply,
    Prune,
    Delete,
    Status,
}

impl Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Apply => write!(f, "apply"),
            Self::Prune => write!(f, "prune"),
            Self::Delete => write!(f, "delete"),
            Self::Status => write!(f, "status"),
        }
    }
}

/// Per-invocation state, nothing is kept between invocations
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    Loading,
    Executing(Operation),
    Done,
    Failed,
}

struct Progress(Phase);

impl Progress {
    fn enter(&mut self, phase: Phase) {
        log::debug!("{:?} -> {:?}", self.0, phase);
        self.0 = phase;
    }

    fn finish<T>(&mut self, result: Result<T>) -> Result<T> {
        self.enter(if result.is_ok() {
            Phase::Done
        } else {
            Phase::Failed
        });
        result
    }
}

/// Only apply records objects, prune and delete report missing inventory themselves
fn warns_untracked(operation: Operation, batch: &Batch) -> bool {
    operation == Operation::Apply && batch.inventory.is_none() && !batch.resources.is_empty()
}

#[derive(Debug)]
pub enum Report {
    Applied(Vec<Applied>),
    Pruned(Vec<Removed>),
    Deleted(Vec<Removed>),
    Status(Status),
}

/// Loads declared resources from a [`ConfigProvider`] and runs single operation on them
pub struct Reconciler<S> {
    provider: Box<dyn ConfigProvider>,
    applier: Applier<S>,
    pruner: Pruner<S>,
    deleter: Deleter<S>,
    status: StatusReader<S>,
}

impl<S: ObjectStore> Reconciler<S> {
    pub fn new(
        provider: Box<dyn ConfigProvider>,
        applier: Applier<S>,
        pruner: Pruner<S>,
        deleter: Deleter<S>,
        status: StatusReader<S>,
    ) -> Self {
        Self {
            provider,
            applier,
            pruner,
            deleter,
            status,
        }
    }

    /// Every remote operation is idempotent, so interrupting at deadline leaves resumable state
    pub async fn run(&self, operation: Operation, path: &Path, deadline: Option<Instant>) -> Result<Report> {
        match deadline {
            Some(deadline) => timeout_at(deadline, self.run_unbounded(operation, path))
                .await
                .map_err(|_| Error::DeadlineExceeded)?,
            None => self.run_unbounded(operation, path).await,
        }
    }

    async fn run_unbounded(&self, operation: Operation, path: &Path) -> Result<Report> {
        let mut progress = Progress(Phase::Idle);

        progress.enter(Phase::Loading);
        let declared = match self.load(path) {
            Ok(declared) => declared,
            Err(e) => return progress.finish(Err(e.into())),
        };
        log::info!("Loaded {} resources from {}", declared.len(), path.display());

        progress.enter(Phase::Executing(operation));
        let result = self.execute(operation, declared).await;
        progress.finish(result)
    }

    fn load(&self, path: &Path) -> Result<Vec<DeclaredResource>, ConfigError> {
        if !self.provider.is_supported(path) {
            return Err(ConfigError::Unsupported(path.to_owned()));
        }
        self.provider.get_config(path)
    }

    pub async fn execute(&self, operation: Operation, declared: Vec<DeclaredResource>) -> Result<Report> {
        let batch = Batch::split(declared)?;
        if warns_untracked(operation, &batch) {
            log::warn!("No inventory object declared, applied objects won't be tracked");
        }

        Ok(match operation {
            Operation::Apply => Report::Applied(self.applier.apply(&batch).await?),
            Operation::Prune => Report::Pruned(self.pruner.prune(&batch).await?),
            Operation::Delete => Report::Deleted(self.deleter.delete(&batch).await?),
            Operation::Status => Report::Status(self.status.status(&batch).await?),
        })
    }
}
