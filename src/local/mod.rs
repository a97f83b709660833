//! Offline cache storage
//!
//! A minimal LocalStorage-shaped key/value interface:
//! - `memory`: in-process map with optional quota
//! - `browser`: `window.localStorage` (wasm32 only)

#[cfg(target_arch = "wasm32")]
pub mod browser;
pub mod memory;

#[cfg(target_arch = "wasm32")]
pub use browser::BrowserStorage;
pub use memory::MemoryStorage;

use crate::error::StorageError;

/// String key/value storage with LocalStorage semantics
pub trait KeyValueStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removing a missing key is not an error
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}
