//! Persisted neural network record
//!
//! - `record`: the `NetworkPersistence` shape and its remote field mapping
//! - `user_id`: validated per-user key

pub mod record;
pub mod user_id;

pub use record::NetworkPersistence;
pub use user_id::UserId;
