use std::{path::PathBuf, time::Duration};

use anyhow::Context;
use clap::{Parser, Subcommand};
use env_logger::Env;
use kapply::{
    connection::ConnectionConfig, reconciler::Operation, ReconcileOptions, Report,
    DEFAULT_FIELD_MANAGER,
};
use tokio::time::Instant;

#[derive(Parser)]
#[command(version, author = "Lach", about = "Apply, prune and delete inventory-tracked resources")]
struct Opts {
    #[command(flatten)]
    connection: ConnectionOpts,
    /// Field manager recorded on applied objects
    #[arg(long, global = true, default_value = DEFAULT_FIELD_MANAGER)]
    field_manager: String,
    /// Overall deadline in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,
    /// Max per-object operations in flight
    #[arg(long, global = true, default_value_t = 8)]
    concurrency: usize,
    #[command(subcommand)]
    sub: SubCommand,
}

#[derive(clap::Args)]
struct ConnectionOpts {
    /// Defaults to $KUBECONFIG or ~/.kube/config, in-cluster config is used if neither exists
    #[arg(long, global = true)]
    kubeconfig: Option<PathBuf>,
    #[arg(long, global = true)]
    context: Option<String>,
    /// Api server url
    #[arg(long, global = true)]
    master: Option<String>,
    /// Namespace for objects which don't specify one
    #[arg(short, long, global = true)]
    namespace: Option<String>,
}

impl From<ConnectionOpts> for ConnectionConfig {
    fn from(opts: ConnectionOpts) -> Self {
        Self {
            kubeconfig: opts.kubeconfig,
            context: opts.context,
            master: opts.master,
            namespace: opts.namespace,
        }
    }
}

#[derive(Subcommand)]
enum SubCommand {
    /// Create or update declared resources, record them on inventory object
    Apply { path: PathBuf },
    /// Delete objects recorded on inventory object which are no longer declared
    Prune { path: PathBuf },
    /// Delete every declared resource and inventory object
    Delete { path: PathBuf },
    /// Show which declared resources exist
    Status { path: PathBuf },
}

impl SubCommand {
    fn split(self) -> (Operation, PathBuf) {
        match self {
            Self::Apply { path } => (Operation::Apply, path),
            Self::Prune { path } => (Operation::Prune, path),
            Self::Delete { path } => (Operation::Delete, path),
            Self::Status { path } => (Operation::Status, path),
        }
    }
}

fn print_report(report: &Report) {
    match report {
        Report::Applied(applied) => {
            for item in applied {
                println!("{} {}", item.reference, item.action);
            }
            println!("{} resources applied", applied.len());
        }
        Report::Pruned(removed) | Report::Deleted(removed) => {
            let verb = if matches!(report, Report::Pruned(_)) {
                "pruned"
            } else {
                "deleted"
            };
            for item in removed {
                if item.existed {
                    println!("{} {}", item.reference, verb);
                } else {
                    println!("{} already absent", item.reference);
                }
            }
            println!("{} resources {}", removed.len(), verb);
        }
        Report::Status(status) => {
            for item in &status.resources {
                let state = if item.present { "present" } else { "missing" };
                println!("{} {}", item.reference, state);
            }
            println!("Resources: {}", status.total());
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let opts = Opts::parse();
    let deadline = opts
        .timeout
        .map(|secs| Instant::now() + Duration::from_secs(secs));
    let options = ReconcileOptions {
        field_manager: opts.field_manager,
        concurrency: opts.concurrency,
        ..ReconcileOptions::default()
    };
    let connection = ConnectionConfig::from(opts.connection);
    let (operation, path) = opts.sub.split();

    let reconciler = kapply::connect(&connection, &options)
        .await
        .context("failed to connect to cluster")?;

    let report = tokio::select! {
        report = reconciler.run(operation, &path, deadline) => {
            report.with_context(|| format!("{} failed", operation))?
        }
        _ = tokio::signal::ctrl_c() => {
            log::warn!("Interrupted, rerun to finish {}", operation);
            anyhow::bail!("{} cancelled", operation);
        }
    };
    print_report(&report);

    Ok(())
}
