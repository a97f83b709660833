//! Per-user record key

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// External user identifier
///
/// Used verbatim as the remote document id and as the suffix of the
/// LocalStorage key, so it must be a single non-empty path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> StoreResult<Self> {
        let id = id.into();
        let reason = if id.trim().is_empty() {
            Some("must not be empty")
        } else if id.contains('/') {
            Some("must not contain '/'")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(StoreError::InvalidUserId { id, reason }),
            None => Ok(Self(id)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for UserId {
    type Error = StoreError;

    fn try_from(id: String) -> StoreResult<Self> {
        Self::new(id)
    }
}

impl TryFrom<&str> for UserId {
    type Error = StoreError;

    fn try_from(id: &str) -> StoreResult<Self> {
        Self::new(id)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}
