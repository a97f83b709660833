//! The persisted record and its remote document mapping
//!
//! Remote documents are written as `{seed, neurons, updatedAt}` where
//! `updatedAt` is stamped by the server. Reads expose the timestamp as
//! `lastSyncAt`. The local cache stores the read shape as-is.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::config::StoreConfig;
use crate::remote::{DocumentSnapshot, DocumentWrite, Fields};

/// Remote field holding the seed
pub const SEED_FIELD: &str = "seed";
/// Remote field holding the neuron collection
pub const NEURONS_FIELD: &str = "neurons";

/// Neural network state for one user
///
/// `seed` and `neurons` are opaque to this crate and passed through verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkPersistence {
    /// Value used to reconstruct deterministic state
    pub seed: Value,
    /// Model state
    pub neurons: Value,
    /// Server time of the last successful remote write
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub last_sync_at: Option<DateTime<Utc>>,
}

/// Accept RFC 3339 strings; any other shape (epoch millis, a JS SDK
/// `{seconds, nanoseconds}` object) reads as unsynced instead of failing
/// the whole record
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let parsed = match &value {
        Value::Null => return Ok(None),
        Value::String(text) => DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        _ => None,
    };
    if parsed.is_none() {
        log::warn!("Ignoring unrecognised lastSyncAt: {}", value);
    }
    Ok(parsed)
}

impl NetworkPersistence {
    /// Create an unsynced record
    pub fn new(seed: impl Into<Value>, neurons: impl Into<Value>) -> Self {
        Self {
            seed: seed.into(),
            neurons: neurons.into(),
            last_sync_at: None,
        }
    }

    /// Whole-document write; `last_sync_at` is dropped and the server stamps
    /// the configured timestamp field instead
    pub fn to_document_write(&self, config: &StoreConfig) -> DocumentWrite {
        let mut fields = Fields::new();
        fields.insert(SEED_FIELD.to_string(), self.seed.clone());
        fields.insert(NEURONS_FIELD.to_string(), self.neurons.clone());
        DocumentWrite::new(fields).with_server_timestamp(&config.updated_at_field)
    }

    /// Read shape of a remote document
    pub fn from_snapshot(snapshot: &DocumentSnapshot, config: &StoreConfig) -> Self {
        let last_sync_at = match snapshot.get(&config.updated_at_field) {
            None | Some(Value::Null) => None,
            Some(_) => {
                let stamp = snapshot.timestamp(&config.updated_at_field);
                if stamp.is_none() {
                    log::warn!(
                        "Ignoring unreadable '{}' on {}",
                        config.updated_at_field,
                        snapshot.path
                    );
                }
                stamp
            }
        };

        Self {
            seed: snapshot.get(SEED_FIELD).cloned().unwrap_or(Value::Null),
            neurons: snapshot.get(NEURONS_FIELD).cloned().unwrap_or(Value::Null),
            last_sync_at,
        }
    }
}
