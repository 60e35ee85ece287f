//! Loro Mirror
//!
//! A store facade over [`loro_mirror_core::Mirror`]: plain application state
//! in, a Loro CRDT document out, and back again.

pub mod config;
pub mod reducer;
pub mod store;

pub use config::{ConfigError, ConfigSource, ConfigValue, StoreConfig};
pub use loro_mirror_core::schema;
pub use reducer::{create_reducer, ActionHandler, Reducer};
pub use store::{create_store, Store, StoreError, StoreOptions};
