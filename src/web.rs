//! JavaScript bindings (WASM only)
//!
//! The host page owns the hosted database SDK and hands this module an
//! adapter object:
//!
//! ```js
//! {
//!   setDocument(collection, id, fieldsJson, serverTimestampFields) -> Promise
//!   getDocument(collection, id) -> Promise<string | null>
//!   listenDocument(collection, id, onSnapshot, onError) -> unsubscribe()
//! }
//! ```
//!
//! Snapshots travel as JSON text with server timestamps as ISO-8601
//! strings. Errors with `code: "permission-denied"` (or `"unauthenticated"`)
//! map to [`StoreError::PermissionDenied`]; anything else is treated as
//! connectivity loss.

use std::rc::Rc;

use js_sys::{Array, Function, JSON, Promise, Reflect};
use serde::Serialize;
use serde::de::DeserializeOwned;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{JsFuture, future_to_promise};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::local::BrowserStorage;
use crate::persistence::{NetworkPersistence, UserId};
use crate::remote::{
    DocumentPath, DocumentSnapshot, DocumentStore, DocumentWrite, ErrorCallback,
    ListenerRegistration, SnapshotCallback, classify_remote_error, decode_snapshot,
};
use crate::store::{NetworkStateStore, Subscription};

#[wasm_bindgen]
extern "C" {
    /// Host-page adapter over the hosted document database
    pub type RemoteBackend;

    #[wasm_bindgen(method, catch, js_name = setDocument)]
    fn set_document(
        this: &RemoteBackend,
        collection: &str,
        id: &str,
        fields_json: &str,
        server_timestamps: &Array,
    ) -> Result<Promise, JsValue>;

    #[wasm_bindgen(method, catch, js_name = getDocument)]
    fn get_document(this: &RemoteBackend, collection: &str, id: &str) -> Result<Promise, JsValue>;

    #[wasm_bindgen(method, catch, js_name = listenDocument)]
    fn listen_document(
        this: &RemoteBackend,
        collection: &str,
        id: &str,
        on_snapshot: &Closure<dyn FnMut(JsValue)>,
        on_error: &Closure<dyn FnMut(JsValue)>,
    ) -> Result<Function, JsValue>;
}

fn js_string_prop(value: &JsValue, name: &str) -> Option<String> {
    if !value.is_object() {
        return None;
    }
    Reflect::get(value, &JsValue::from_str(name))
        .ok()
        .and_then(|v| v.as_string())
}

/// Classify a rejection from the host adapter
fn remote_error(err: JsValue) -> StoreError {
    let message = js_string_prop(&err, "message")
        .or_else(|| err.as_string())
        .unwrap_or_else(|| format!("{:?}", err));
    classify_remote_error(js_string_prop(&err, "code").as_deref(), message)
}

fn parse_snapshot(path: &DocumentPath, value: JsValue) -> StoreResult<Option<DocumentSnapshot>> {
    if value.is_null() || value.is_undefined() {
        return decode_snapshot(path, None);
    }
    let json = value
        .as_string()
        .ok_or_else(|| StoreError::Serialization("snapshot is not a JSON string".to_string()))?;
    decode_snapshot(path, Some(&json))
}

/// [`DocumentStore`] backed by the host-page adapter
#[derive(Clone)]
pub struct JsDocumentStore {
    backend: RemoteBackend,
}

impl JsDocumentStore {
    pub fn new(backend: RemoteBackend) -> Self {
        Self { backend }
    }
}

impl DocumentStore for JsDocumentStore {
    async fn set_document(&self, path: &DocumentPath, write: DocumentWrite) -> StoreResult<()> {
        let fields = serde_json::to_string(&write.fields)?;
        let stamps: Array = write
            .server_timestamps
            .iter()
            .map(|field| JsValue::from_str(field))
            .collect();

        let promise = self
            .backend
            .set_document(&path.collection, &path.id, &fields, &stamps)
            .map_err(remote_error)?;
        JsFuture::from(promise).await.map_err(remote_error)?;
        Ok(())
    }

    async fn get_document(&self, path: &DocumentPath) -> StoreResult<Option<DocumentSnapshot>> {
        let promise = self
            .backend
            .get_document(&path.collection, &path.id)
            .map_err(remote_error)?;
        let value = JsFuture::from(promise).await.map_err(remote_error)?;
        parse_snapshot(path, value)
    }

    fn listen(
        &self,
        path: &DocumentPath,
        mut on_snapshot: SnapshotCallback,
        mut on_error: ErrorCallback,
    ) -> StoreResult<ListenerRegistration> {
        let snapshot_path = path.clone();
        let on_snapshot_js = Closure::<dyn FnMut(JsValue)>::new(move |value: JsValue| {
            match parse_snapshot(&snapshot_path, value) {
                Ok(snapshot) => on_snapshot(snapshot),
                Err(err) => log::warn!("Skipping unreadable snapshot of {}: {}", snapshot_path, err),
            }
        });
        let on_error_js =
            Closure::<dyn FnMut(JsValue)>::new(move |err: JsValue| on_error(remote_error(err)));

        let unsubscribe = self
            .backend
            .listen_document(&path.collection, &path.id, &on_snapshot_js, &on_error_js)
            .map_err(remote_error)?;

        let detach_path = path.clone();
        Ok(ListenerRegistration::new(move || {
            if let Err(err) = unsubscribe.call0(&JsValue::NULL) {
                log::warn!("Unsubscribe from {} threw: {:?}", detach_path, err);
            }
            // The adapter no longer holds the callbacks
            drop(on_snapshot_js);
            drop(on_error_js);
        }))
    }
}

/// JS `Error` carrying a stable `code` for UI handling
fn to_js(err: StoreError) -> JsValue {
    let code = match &err {
        StoreError::InvalidUserId { .. } | StoreError::InvalidConfig { .. } => "invalid-argument",
        StoreError::Unavailable(_) => "unavailable",
        StoreError::PermissionDenied(_) => "permission-denied",
        StoreError::Closed => "closed",
        StoreError::Storage(_) => "storage",
        StoreError::Serialization(_) => "serialization",
    };
    let js_err = js_sys::Error::new(&err.to_string());
    if let Err(thrown) = Reflect::set(&js_err, &JsValue::from_str("code"), &JsValue::from_str(code)) {
        log::warn!("Could not tag error with code '{}': {:?}", code, thrown);
    }
    js_err.into()
}

fn from_js<T: DeserializeOwned>(value: &JsValue) -> Result<T, JsValue> {
    let json = JSON::stringify(value)?
        .as_string()
        .ok_or_else(|| to_js(StoreError::Serialization("value is not JSON".to_string())))?;
    serde_json::from_str(&json).map_err(|e| to_js(e.into()))
}

fn to_js_value<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    let json = serde_json::to_string(value).map_err(|e| to_js(e.into()))?;
    JSON::parse(&json)
}

/// `NetworkStateStore` for JavaScript callers, cached in `localStorage`
#[wasm_bindgen]
pub struct WebNetworkStore {
    inner: Rc<NetworkStateStore<JsDocumentStore, BrowserStorage>>,
}

#[wasm_bindgen]
impl WebNetworkStore {
    /// `config` is optional JSON, e.g. `{"collection": "neuralNetworks"}`
    #[wasm_bindgen(constructor)]
    pub fn new(backend: RemoteBackend, config: Option<String>) -> Result<WebNetworkStore, JsValue> {
        let config = match config {
            Some(json) => StoreConfig::from_json(&json).map_err(to_js)?,
            None => StoreConfig::default(),
        };
        let local = BrowserStorage::local().map_err(|e| to_js(e.into()))?;
        let store = NetworkStateStore::with_config(JsDocumentStore::new(backend), local, config)
            .map_err(to_js)?;
        Ok(Self {
            inner: Rc::new(store),
        })
    }

    /// Resolves once the remote record has been replaced
    pub fn save(&self, user_id: String, record: JsValue) -> Promise {
        let store = self.inner.clone();
        future_to_promise(async move {
            let user_id = UserId::new(user_id).map_err(to_js)?;
            let record: NetworkPersistence = from_js(&record)?;
            store.save(&user_id, &record).await.map_err(to_js)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    /// Resolves to `{seed, neurons, lastSyncAt}` or `null`
    pub fn load(&self, user_id: String) -> Promise {
        let store = self.inner.clone();
        future_to_promise(async move {
            let user_id = UserId::new(user_id).map_err(to_js)?;
            match store.load(&user_id).await.map_err(to_js)? {
                Some(record) => to_js_value(&record),
                None => Ok(JsValue::NULL),
            }
        })
    }

    pub fn subscribe(
        &self,
        user_id: String,
        on_data: Function,
        on_error: Option<Function>,
    ) -> Result<WebSubscription, JsValue> {
        let user_id = UserId::new(user_id).map_err(to_js)?;
        let deliver = move |record: Option<NetworkPersistence>| {
            let value = match record.as_ref().map(to_js_value).transpose() {
                Ok(value) => value.unwrap_or(JsValue::NULL),
                Err(err) => {
                    log::error!("Could not convert record for onData: {:?}", err);
                    return;
                }
            };
            if let Err(err) = on_data.call1(&JsValue::NULL, &value) {
                log::error!("onData threw: {:?}", err);
            }
        };

        let subscription = match on_error {
            Some(on_error) => self.inner.subscribe_with_errors(&user_id, deliver, move |err| {
                if let Err(thrown) = on_error.call1(&JsValue::NULL, &to_js(err)) {
                    log::error!("onError threw: {:?}", thrown);
                }
            }),
            None => self.inner.subscribe(&user_id, deliver),
        }
        .map_err(to_js)?;

        Ok(WebSubscription {
            inner: subscription,
        })
    }

    #[wasm_bindgen(js_name = saveLocal)]
    pub fn save_local(&self, user_id: String, record: JsValue) -> Result<(), JsValue> {
        let user_id = UserId::new(user_id).map_err(to_js)?;
        let record: NetworkPersistence = from_js(&record)?;
        self.inner.save_local(&user_id, &record).map_err(to_js)
    }

    /// Cached record or `null`
    #[wasm_bindgen(js_name = loadLocal)]
    pub fn load_local(&self, user_id: String) -> Result<JsValue, JsValue> {
        let user_id = UserId::new(user_id).map_err(to_js)?;
        match self.inner.load_local(&user_id) {
            Some(record) => to_js_value(&record),
            None => Ok(JsValue::NULL),
        }
    }

    #[wasm_bindgen(js_name = clearLocal)]
    pub fn clear_local(&self, user_id: String) -> Result<(), JsValue> {
        let user_id = UserId::new(user_id).map_err(to_js)?;
        self.inner.clear_local(&user_id).map_err(to_js)
    }
}

/// Handle returned by `WebNetworkStore.subscribe`
#[wasm_bindgen]
pub struct WebSubscription {
    inner: Subscription,
}

#[wasm_bindgen]
impl WebSubscription {
    /// Safe to call more than once
    pub fn unsubscribe(&self) {
        self.inner.unsubscribe();
    }

    #[wasm_bindgen(getter, js_name = isActive)]
    pub fn is_active(&self) -> bool {
        self.inner.is_active()
    }
}

#[wasm_bindgen(start)]
pub fn start() {
    crate::platform::init_logging(log::Level::Info);
    log::info!("neural-persist ready");
}
