//! Loro Mirror Core Library
//!
//! Keeps a plain `serde_json::Value` state tree in sync with a Loro CRDT
//! document, driven by a schema.

pub mod diff;
pub mod error;
pub mod handle;
pub mod lis;
pub mod mirror;
pub mod schema;
pub mod utils;

pub use diff::{diff_container, diff_root, Change, ChangeKey, ChangeKind, CommonListItemInfo};
pub use error::{MirrorError, Result};
pub use lis::longest_increasing_subsequence;
pub use mirror::{
    ContainerRegistry, Mirror, MirrorOptions, SetStateOptions, StateUpdate, SubscriberId,
    SyncDirection, SyncPhase, UpdateMetadata, TO_LORO_ORIGIN,
};
pub use schema::{get_default_value, validate_schema, SchemaRef, SchemaType, ValidationResult};
pub use utils::{ContainerKind, InferOptions};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
