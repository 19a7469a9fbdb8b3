pub mod apply;
pub mod config;
pub mod connection;
pub mod delete;
pub mod error;
pub mod inventory;
pub mod order;
pub mod prune;
pub mod reconciler;
pub mod resource;
pub mod status;
pub mod store;

mod compose;

pub use compose::{build, connect, ReconcileOptions, DEFAULT_FIELD_MANAGER};
pub use error::{Error, Result};
pub use reconciler::{Operation, Reconciler, Report};
