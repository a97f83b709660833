//! Neural Persist - per-user neural network state persistence
//!
//! Core modules:
//! - `store`: `NetworkStateStore` (remote save/load/subscribe, offline cache)
//! - `persistence`: The persisted record and user key
//! - `remote`: Injectable document database client
//! - `local`: LocalStorage-shaped offline cache
//! - `platform`: Browser/native platform abstraction
//! - `web`: JavaScript bindings (wasm32)

pub mod config;
pub mod error;
pub mod local;
pub mod persistence;
pub mod platform;
pub mod remote;
pub mod store;
#[cfg(target_arch = "wasm32")]
pub mod web;

pub use config::StoreConfig;
pub use error::{StorageError, StoreError, StoreResult};
pub use persistence::{NetworkPersistence, UserId};
pub use store::{NetworkStateStore, Subscription};

/// Storage naming constants
pub mod consts {
    /// Remote collection, one document per user
    pub const COLLECTION: &str = "neuralNetworks";
    /// LocalStorage key prefix; the user id is appended
    pub const LOCAL_KEY_PREFIX: &str = "neural_network_";
    /// Server-stamped remote field, read back as `lastSyncAt`
    pub const UPDATED_AT_FIELD: &str = "updatedAt";
}
