//! Remote document store abstraction
//!
//! The store client is an explicit value injected into
//! [`crate::NetworkStateStore`] rather than ambient global state.
//! Backends:
//! - `memory`: in-process document database (native runs, tests)
//! - `crate::web::JsDocumentStore`: host-page backend (wasm32)

pub mod memory;

use std::cell::Cell;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use crate::error::{StoreError, StoreResult};

pub use memory::MemoryDocumentStore;

/// Document field map
pub type Fields = serde_json::Map<String, Value>;

/// Called with the current document (or `None`) on every change
pub type SnapshotCallback = Box<dyn FnMut(Option<DocumentSnapshot>)>;
/// Called once when a listener fails; the listener is gone afterwards
pub type ErrorCallback = Box<dyn FnMut(StoreError)>;

/// Address of a single document
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentPath {
    pub collection: String,
    pub id: String,
}

impl DocumentPath {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// Whole-document replace
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentWrite {
    pub fields: Fields,
    /// Fields the backend fills with its own clock at commit time
    pub server_timestamps: Vec<String>,
}

impl DocumentWrite {
    pub fn new(fields: Fields) -> Self {
        Self {
            fields,
            server_timestamps: Vec::new(),
        }
    }

    pub fn with_server_timestamp(mut self, field: &str) -> Self {
        self.server_timestamps.push(field.to_string());
        self
    }
}

/// Document contents as read from the store
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSnapshot {
    pub path: DocumentPath,
    pub fields: Fields,
}

impl DocumentSnapshot {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Server timestamp field, if present and well-formed
    pub fn timestamp(&self, field: &str) -> Option<DateTime<Utc>> {
        let text = self.get(field)?.as_str()?;
        DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

/// Wire form of server timestamps inside documents
pub fn format_timestamp(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Map a hosted-database error code to a [`StoreError`]
///
/// `permission-denied` and `unauthenticated` are access failures; every
/// other code (or none) is treated as connectivity loss.
pub fn classify_remote_error(code: Option<&str>, message: String) -> StoreError {
    match code {
        Some("permission-denied") | Some("unauthenticated") => {
            StoreError::PermissionDenied(message)
        }
        _ => StoreError::Unavailable(message),
    }
}

/// Decode a snapshot sent as JSON text; `None` means no document
pub fn decode_snapshot(
    path: &DocumentPath,
    json: Option<&str>,
) -> StoreResult<Option<DocumentSnapshot>> {
    let Some(json) = json else {
        return Ok(None);
    };
    let fields: Fields = serde_json::from_str(json)?;
    Ok(Some(DocumentSnapshot {
        path: path.clone(),
        fields,
    }))
}

/// Handle for an active listener
///
/// `remove` detaches the listener; only the first call has any effect.
pub struct ListenerRegistration {
    detach: Cell<Option<Box<dyn FnOnce()>>>,
}

impl ListenerRegistration {
    pub fn new(detach: impl FnOnce() + 'static) -> Self {
        Self {
            detach: Cell::new(Some(Box::new(detach))),
        }
    }

    pub fn remove(&self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }

    /// Returns true until `remove` has been called
    pub fn is_attached(&self) -> bool {
        // Cell<Option<Box<_>>> can't be peeked; swap out and back
        let detach = self.detach.take();
        let attached = detach.is_some();
        self.detach.set(detach);
        attached
    }
}

impl fmt::Debug for ListenerRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistration")
            .field("attached", &self.is_attached())
            .finish()
    }
}

/// Hosted document database client
///
/// Futures are not `Send`: every backend runs on a single cooperative
/// event loop (the browser main thread, or `pollster` natively).
#[allow(async_fn_in_trait)]
pub trait DocumentStore {
    /// Replace the document at `path`, creating it if needed
    async fn set_document(&self, path: &DocumentPath, write: DocumentWrite) -> StoreResult<()>;

    /// Fetch the document at `path`; `Ok(None)` when it does not exist
    async fn get_document(&self, path: &DocumentPath) -> StoreResult<Option<DocumentSnapshot>>;

    /// Watch the document at `path`
    ///
    /// `on_snapshot` fires once with the current state, then after every
    /// change, in commit order. `on_error` fires at most once and ends the
    /// listener. Establishment failures are returned directly.
    fn listen(
        &self,
        path: &DocumentPath,
        on_snapshot: SnapshotCallback,
        on_error: ErrorCallback,
    ) -> StoreResult<ListenerRegistration>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::rc::Rc;

    #[test]
    fn test_path_display() {
        assert_eq!(
            DocumentPath::new("neuralNetworks", "u1").to_string(),
            "neuralNetworks/u1"
        );
    }

    #[test]
    fn test_timestamp_round_trip() {
        let now = Utc::now();
        let mut fields = Fields::new();
        fields.insert("updatedAt".into(), json!(format_timestamp(now)));
        fields.insert("count".into(), json!(3));
        let snap = DocumentSnapshot {
            path: DocumentPath::new("c", "d"),
            fields,
        };

        let parsed = snap.timestamp("updatedAt").unwrap();
        assert_eq!(parsed.timestamp_micros(), now.timestamp_micros());
        assert!(snap.timestamp("count").is_none());
        assert!(snap.timestamp("missing").is_none());
    }

    #[test]
    fn test_classify_remote_error() {
        let denied = classify_remote_error(Some("permission-denied"), "rules".into());
        assert_eq!(denied, StoreError::PermissionDenied("rules".into()));
        assert!(classify_remote_error(Some("unauthenticated"), "signed out".into()).is_permission_denied());

        let offline = classify_remote_error(Some("unavailable"), "offline".into());
        assert!(offline.is_retryable());
        assert!(classify_remote_error(None, "TypeError".into()).is_retryable());
    }

    #[test]
    fn test_decode_snapshot() {
        let path = DocumentPath::new("neuralNetworks", "u1");
        assert_eq!(decode_snapshot(&path, None).unwrap(), None);

        let snap = decode_snapshot(&path, Some(r#"{"seed": 42, "updatedAt": "2024-05-01T12:00:00Z"}"#))
            .unwrap()
            .unwrap();
        assert_eq!(snap.path, path);
        assert_eq!(snap.get("seed"), Some(&json!(42)));
        assert!(snap.timestamp("updatedAt").is_some());

        assert!(matches!(
            decode_snapshot(&path, Some("[1, 2]")),
            Err(StoreError::Serialization(_))
        ));
        assert!(decode_snapshot(&path, Some("{truncated")).is_err());
    }

    #[test]
    fn test_registration_removes_once() {
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let registration = ListenerRegistration::new(move || counter.set(counter.get() + 1));

        assert!(registration.is_attached());
        registration.remove();
        registration.remove();
        assert_eq!(calls.get(), 1);
        assert!(!registration.is_attached());
    }
}
