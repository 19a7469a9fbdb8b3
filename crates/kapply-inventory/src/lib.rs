//! Inventory bookkeeping for applied object generations.
//!
//! An inventory is a set of [`ResourceReference`]s persisted as two string
//! annotations on a single "inventory object". The set is stored as
//! `{"current": {"<key>": null, ...}}`, where every key identifies one live
//! object independent of its content.

mod error;
pub use error::*;
mod reference;
pub use reference::{ResourceReference, ResourceType};
mod parse;
pub use parse::parse_key;
mod set;
pub use set::InventorySet;
mod record;
pub use record::{
    decode, encode, InventoryRecord, INVENTORY_ANNOTATION, INVENTORY_HASH_ANNOTATION,
};
