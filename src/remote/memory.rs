//! In-process document database
//!
//! Behaves like the hosted store as seen from one client: whole-document
//! writes, a strictly increasing server clock, live listeners delivered in
//! commit order, and an explicit open/close lifecycle. Connectivity loss and
//! permission revocation can be injected for exercising error paths.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::rc::Rc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::{
    DocumentPath, DocumentSnapshot, DocumentStore, DocumentWrite, ErrorCallback, Fields,
    ListenerRegistration, SnapshotCallback, format_timestamp,
};
use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone)]
enum Event {
    Snapshot(Option<DocumentSnapshot>),
    Error(StoreError),
}

struct Callbacks {
    on_snapshot: SnapshotCallback,
    on_error: ErrorCallback,
}

struct Listener {
    path: DocumentPath,
    callbacks: Rc<RefCell<Callbacks>>,
}

#[derive(Default)]
struct Inner {
    closed: bool,
    offline: bool,
    denied: HashSet<DocumentPath>,
    documents: HashMap<DocumentPath, Fields>,
    /// Ordered by registration so fan-out is deterministic
    listeners: BTreeMap<u64, Listener>,
    next_listener_id: u64,
    /// Events waiting for delivery; drained outside any borrow
    queue: VecDeque<(u64, Event)>,
    dispatching: bool,
    last_stamp_micros: Option<i64>,
}

impl Inner {
    fn check(&self, path: &DocumentPath) -> StoreResult<()> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        if self.offline {
            return Err(StoreError::Unavailable("client is offline".to_string()));
        }
        if self.denied.contains(path) {
            return Err(StoreError::PermissionDenied(format!(
                "missing or insufficient permissions for {}",
                path
            )));
        }
        Ok(())
    }

    /// Server clock: microsecond precision, strictly increasing per store
    fn next_stamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now().timestamp_micros();
        let micros = match self.last_stamp_micros {
            Some(last) if now <= last => last + 1,
            _ => now,
        };
        self.last_stamp_micros = Some(micros);
        DateTime::from_timestamp_micros(micros).unwrap_or_else(Utc::now)
    }

    fn snapshot(&self, path: &DocumentPath) -> Option<DocumentSnapshot> {
        self.documents.get(path).map(|fields| DocumentSnapshot {
            path: path.clone(),
            fields: fields.clone(),
        })
    }

    fn enqueue_for(&mut self, path: Option<&DocumentPath>, event: Event) {
        let targets: Vec<u64> = self
            .listeners
            .iter()
            .filter(|(_, l)| path.is_none_or(|p| l.path == *p))
            .map(|(id, _)| *id)
            .collect();
        for id in targets {
            self.queue.push_back((id, event.clone()));
        }
    }
}

struct DispatchGuard<'a>(&'a RefCell<Inner>);

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        // No borrow of the store is held while callbacks run
        if let Ok(mut inner) = self.0.try_borrow_mut() {
            inner.dispatching = false;
        }
    }
}

/// Shared-handle in-process store; clones talk to the same database
#[derive(Clone, Default)]
pub struct MemoryDocumentStore {
    inner: Rc<RefCell<Inner>>,
}

impl MemoryDocumentStore {
    /// Create an open, online, empty store
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        !self.inner.borrow().closed
    }

    /// Close the client; active listeners receive [`StoreError::Closed`]
    pub fn close(&self) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.closed {
                return;
            }
            inner.closed = true;
            inner.enqueue_for(None, Event::Error(StoreError::Closed));
        }
        log::info!("Memory document store closed");
        self.dispatch();
    }

    /// Reopen a closed client; documents survive, listeners do not
    pub fn reopen(&self) {
        self.inner.borrow_mut().closed = false;
        log::info!("Memory document store reopened");
    }

    /// Simulate loss or recovery of connectivity
    ///
    /// Existing listeners stay attached while offline.
    pub fn set_online(&self, online: bool) {
        self.inner.borrow_mut().offline = !online;
    }

    /// Revoke access to one document; its listeners fail
    pub fn deny_access(&self, path: &DocumentPath) {
        {
            let mut inner = self.inner.borrow_mut();
            inner.denied.insert(path.clone());
            let err = StoreError::PermissionDenied(format!("access to {} revoked", path));
            inner.enqueue_for(Some(path), Event::Error(err));
        }
        self.dispatch();
    }

    pub fn allow_access(&self, path: &DocumentPath) {
        self.inner.borrow_mut().denied.remove(path);
    }

    /// Delete a document out of band (another client, console, TTL)
    ///
    /// Returns true if the document existed.
    pub fn delete_document(&self, path: &DocumentPath) -> bool {
        let existed = {
            let mut inner = self.inner.borrow_mut();
            let existed = inner.documents.remove(path).is_some();
            if existed {
                inner.enqueue_for(Some(path), Event::Snapshot(None));
            }
            existed
        };
        self.dispatch();
        existed
    }

    pub fn document_count(&self) -> usize {
        self.inner.borrow().documents.len()
    }

    pub fn listener_count(&self) -> usize {
        self.inner.borrow().listeners.len()
    }

    /// Deliver queued events in order; re-entrant calls only enqueue
    fn dispatch(&self) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.dispatching {
                return;
            }
            inner.dispatching = true;
        }
        // Cleared on every exit, including a callback unwinding
        let _guard = DispatchGuard(&self.inner);

        loop {
            let next = {
                let mut inner = self.inner.borrow_mut();
                let Some((id, event)) = inner.queue.pop_front() else {
                    break;
                };
                let callbacks = match event {
                    // Errors are terminal
                    Event::Error(_) => inner.listeners.remove(&id).map(|l| l.callbacks),
                    Event::Snapshot(_) => inner.listeners.get(&id).map(|l| l.callbacks.clone()),
                };
                callbacks.map(|callbacks| (callbacks, event))
            };

            // Listener removed while the event was queued
            let Some((callbacks, event)) = next else {
                continue;
            };
            let mut callbacks = callbacks.borrow_mut();
            match event {
                Event::Snapshot(snapshot) => (callbacks.on_snapshot)(snapshot),
                Event::Error(err) => (callbacks.on_error)(err),
            }
        }
    }
}

impl DocumentStore for MemoryDocumentStore {
    async fn set_document(&self, path: &DocumentPath, write: DocumentWrite) -> StoreResult<()> {
        {
            let mut inner = self.inner.borrow_mut();
            inner.check(path)?;

            let mut fields = write.fields;
            if !write.server_timestamps.is_empty() {
                let stamp = format_timestamp(inner.next_stamp());
                for field in write.server_timestamps {
                    fields.insert(field, Value::String(stamp.clone()));
                }
            }

            inner.documents.insert(path.clone(), fields.clone());
            let snapshot = DocumentSnapshot {
                path: path.clone(),
                fields,
            };
            inner.enqueue_for(Some(path), Event::Snapshot(Some(snapshot)));
        }
        log::debug!("Committed {}", path);
        self.dispatch();
        Ok(())
    }

    async fn get_document(&self, path: &DocumentPath) -> StoreResult<Option<DocumentSnapshot>> {
        let inner = self.inner.borrow();
        inner.check(path)?;
        Ok(inner.snapshot(path))
    }

    fn listen(
        &self,
        path: &DocumentPath,
        on_snapshot: SnapshotCallback,
        on_error: ErrorCallback,
    ) -> StoreResult<ListenerRegistration> {
        let id = {
            let mut inner = self.inner.borrow_mut();
            inner.check(path)?;

            let id = inner.next_listener_id;
            inner.next_listener_id += 1;
            inner.listeners.insert(
                id,
                Listener {
                    path: path.clone(),
                    callbacks: Rc::new(RefCell::new(Callbacks {
                        on_snapshot,
                        on_error,
                    })),
                },
            );
            let current = inner.snapshot(path);
            inner.queue.push_back((id, Event::Snapshot(current)));
            id
        };
        log::debug!("Listener {} attached to {}", id, path);
        self.dispatch();

        let weak = Rc::downgrade(&self.inner);
        Ok(ListenerRegistration::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.borrow_mut().listeners.remove(&id);
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pollster::block_on;
    use serde_json::json;

    fn path(id: &str) -> DocumentPath {
        DocumentPath::new("neuralNetworks", id)
    }

    fn write(value: i64) -> DocumentWrite {
        let mut fields = Fields::new();
        fields.insert("seed".into(), json!(value));
        DocumentWrite::new(fields).with_server_timestamp("updatedAt")
    }

    type Log = Rc<RefCell<Vec<String>>>;

    fn recording_listener(store: &MemoryDocumentStore, id: &str, log: &Log) -> ListenerRegistration {
        let data_log = log.clone();
        let error_log = log.clone();
        store
            .listen(
                &path(id),
                Box::new(move |snap| {
                    let entry = match snap {
                        Some(s) => format!("data:{}", s.get("seed").cloned().unwrap_or_default()),
                        None => "data:none".to_string(),
                    };
                    data_log.borrow_mut().push(entry);
                }),
                Box::new(move |err| error_log.borrow_mut().push(format!("error:{}", err))),
            )
            .unwrap()
    }

    #[test]
    fn test_get_missing_is_none() {
        let store = MemoryDocumentStore::new();
        assert!(block_on(store.get_document(&path("ghost"))).unwrap().is_none());
    }

    #[test]
    fn test_set_replaces_and_stamps() {
        let store = MemoryDocumentStore::new();
        let mut fields = Fields::new();
        fields.insert("extra".into(), json!(true));
        block_on(store.set_document(&path("u"), DocumentWrite::new(fields))).unwrap();
        block_on(store.set_document(&path("u"), write(7))).unwrap();

        let snap = block_on(store.get_document(&path("u"))).unwrap().unwrap();
        assert_eq!(snap.get("seed"), Some(&json!(7)));
        assert!(snap.get("extra").is_none());
        assert!(snap.timestamp("updatedAt").is_some());
        assert_eq!(store.document_count(), 1);
    }

    #[test]
    fn test_server_clock_strictly_increases() {
        let store = MemoryDocumentStore::new();
        let mut last = None;
        for i in 0..50 {
            block_on(store.set_document(&path("u"), write(i))).unwrap();
            let snap = block_on(store.get_document(&path("u"))).unwrap().unwrap();
            let stamp = snap.timestamp("updatedAt").unwrap();
            if let Some(prev) = last {
                assert!(stamp > prev);
            }
            last = Some(stamp);
        }
    }

    #[test]
    fn test_listener_initial_then_changes() {
        let store = MemoryDocumentStore::new();
        let log: Log = Rc::default();
        let _reg = recording_listener(&store, "u", &log);

        block_on(store.set_document(&path("u"), write(1))).unwrap();
        block_on(store.set_document(&path("other"), write(9))).unwrap();
        block_on(store.set_document(&path("u"), write(2))).unwrap();
        store.delete_document(&path("u"));

        assert_eq!(
            *log.borrow(),
            vec!["data:none", "data:1", "data:2", "data:none"]
        );
    }

    #[test]
    fn test_removed_listener_gets_nothing() {
        let store = MemoryDocumentStore::new();
        let log: Log = Rc::default();
        let reg = recording_listener(&store, "u", &log);
        reg.remove();
        reg.remove();

        block_on(store.set_document(&path("u"), write(1))).unwrap();
        assert_eq!(*log.borrow(), vec!["data:none"]);
        assert_eq!(store.listener_count(), 0);
    }

    #[test]
    fn test_deny_access_terminates_listener() {
        let store = MemoryDocumentStore::new();
        let log: Log = Rc::default();
        let _reg = recording_listener(&store, "u", &log);

        store.deny_access(&path("u"));
        store.allow_access(&path("u"));
        block_on(store.set_document(&path("u"), write(1))).unwrap();

        let log = log.borrow();
        assert_eq!(log.len(), 2);
        assert!(log[1].starts_with("error:permission denied"));
        assert_eq!(store.listener_count(), 0);
    }

    #[test]
    fn test_offline_and_denied_operations_fail() {
        let store = MemoryDocumentStore::new();
        store.set_online(false);
        let err = block_on(store.set_document(&path("u"), write(1))).unwrap_err();
        assert!(err.is_retryable());
        store.set_online(true);

        store.deny_access(&path("u"));
        let err = block_on(store.get_document(&path("u"))).unwrap_err();
        assert!(err.is_permission_denied());
        assert!(
            store
                .listen(&path("u"), Box::new(|_| {}), Box::new(|_| {}))
                .is_err()
        );
    }

    #[test]
    fn test_close_fails_listeners_and_operations() {
        let store = MemoryDocumentStore::new();
        let log: Log = Rc::default();
        let _reg = recording_listener(&store, "u", &log);

        store.close();
        store.close();
        assert!(!store.is_open());
        assert_eq!(*log.borrow(), vec!["data:none", "error:remote client is closed"]);
        assert_eq!(
            block_on(store.get_document(&path("u"))).unwrap_err(),
            StoreError::Closed
        );

        store.reopen();
        assert!(block_on(store.get_document(&path("u"))).is_ok());
    }

    #[test]
    fn test_panicking_listener_does_not_stall_delivery() {
        let store = MemoryDocumentStore::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            store.listen(
                &path("broken"),
                Box::new(|_| panic!("listener bug")),
                Box::new(|_| {}),
            )
        }));
        assert!(result.is_err());

        let log: Log = Rc::default();
        let _reg = recording_listener(&store, "u", &log);
        block_on(store.set_document(&path("u"), write(3))).unwrap();
        assert_eq!(*log.borrow(), vec!["data:none", "data:3"]);
    }

    #[test]
    fn test_reentrant_write_from_listener() {
        let store = MemoryDocumentStore::new();
        let seen: Rc<RefCell<Vec<Option<Value>>>> = Rc::default();

        let writer = store.clone();
        let sink = seen.clone();
        let _reg = store
            .listen(
                &path("u"),
                Box::new(move |snap| {
                    let seed = snap.and_then(|s| s.get("seed").cloned());
                    sink.borrow_mut().push(seed.clone());
                    // Echo once: the first real write triggers a follow-up
                    if seed == Some(json!(1)) {
                        block_on(writer.set_document(&path("u"), write(2))).unwrap();
                    }
                }),
                Box::new(|_| {}),
            )
            .unwrap();

        block_on(store.set_document(&path("u"), write(1))).unwrap();
        assert_eq!(*seen.borrow(), vec![None, Some(json!(1)), Some(json!(2))]);
    }
}
