//! Store configuration
//!
//! Names the remote collection, the LocalStorage key prefix and the
//! server-stamped field. Defaults match the deployed web app.

use serde::{Deserialize, Serialize};

use crate::consts::{COLLECTION, LOCAL_KEY_PREFIX, UPDATED_AT_FIELD};
use crate::error::{StoreError, StoreResult};
use crate::persistence::UserId;
use crate::remote::DocumentPath;

/// Where and how records are persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StoreConfig {
    /// Remote collection holding one document per user
    pub collection: String,
    /// Prefix of the per-user LocalStorage key
    pub local_key_prefix: String,
    /// Remote field the server stamps on every write
    pub updated_at_field: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            collection: COLLECTION.to_string(),
            local_key_prefix: LOCAL_KEY_PREFIX.to_string(),
            updated_at_field: UPDATED_AT_FIELD.to_string(),
        }
    }
}

impl StoreConfig {
    /// Parse a (possibly partial) JSON config; missing fields take defaults
    pub fn from_json(json: &str) -> StoreResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configs that cannot address a record
    pub fn validate(&self) -> StoreResult<()> {
        let empty = [
            ("collection", &self.collection),
            ("localKeyPrefix", &self.local_key_prefix),
            ("updatedAtField", &self.updated_at_field),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty());

        match empty {
            Some((field, _)) => Err(StoreError::InvalidConfig {
                field,
                reason: "must not be empty",
            }),
            None => Ok(()),
        }
    }

    /// LocalStorage key for a user
    pub fn local_key(&self, user_id: &UserId) -> String {
        format!("{}{}", self.local_key_prefix, user_id)
    }

    /// Remote document path for a user
    pub fn document_path(&self, user_id: &UserId) -> DocumentPath {
        DocumentPath::new(&self.collection, user_id.as_str())
    }
}
