//! Per-user network state store
//!
//! Two independent paths share one record shape:
//! - remote: `save`, `load`, `subscribe` against a [`DocumentStore`]
//! - local: `save_local`, `load_local`, `clear_local` against a [`KeyValueStorage`]
//!
//! Nothing here reconciles the two copies; callers decide which one wins.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::local::KeyValueStorage;
use crate::persistence::{NetworkPersistence, UserId};
use crate::remote::{DocumentSnapshot, DocumentStore, ErrorCallback, ListenerRegistration};

/// Reads, writes and watches one [`NetworkPersistence`] record per user
pub struct NetworkStateStore<D, S> {
    remote: D,
    local: S,
    config: StoreConfig,
}

impl<D: DocumentStore, S: KeyValueStorage> NetworkStateStore<D, S> {
    /// Store using the default collection and key names
    pub fn new(remote: D, local: S) -> Self {
        Self {
            remote,
            local,
            config: StoreConfig::default(),
        }
    }

    pub fn with_config(remote: D, local: S, config: StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        Ok(Self {
            remote,
            local,
            config,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn remote(&self) -> &D {
        &self.remote
    }

    pub fn local(&self) -> &S {
        &self.local
    }

    /// Replace the user's remote record
    ///
    /// `data.last_sync_at` is ignored; the server stamps the write. Failures
    /// propagate without retry.
    pub async fn save(&self, user_id: &UserId, data: &NetworkPersistence) -> StoreResult<()> {
        let path = self.config.document_path(user_id);
        let write = data.to_document_write(&self.config);
        self.remote.set_document(&path, write).await?;
        log::info!("Saved neural network for {}", user_id);
        Ok(())
    }

    /// Fetch the user's remote record; `Ok(None)` if it was never saved
    pub async fn load(&self, user_id: &UserId) -> StoreResult<Option<NetworkPersistence>> {
        let path = self.config.document_path(user_id);
        let snapshot = self.remote.get_document(&path).await?;
        log::debug!(
            "Loaded {} ({})",
            path,
            if snapshot.is_some() { "found" } else { "absent" }
        );
        Ok(snapshot.map(|s| NetworkPersistence::from_snapshot(&s, &self.config)))
    }

    /// Watch the user's remote record
    ///
    /// `on_data` fires immediately with the current record (or `None`), then
    /// after every remote change. Channel errors are logged and end the
    /// subscription.
    pub fn subscribe(
        &self,
        user_id: &UserId,
        on_data: impl FnMut(Option<NetworkPersistence>) + 'static,
    ) -> StoreResult<Subscription> {
        self.listen(user_id, Box::new(on_data), None)
    }

    /// Like [`Self::subscribe`], also reporting the terminal channel error
    /// to `on_error`
    pub fn subscribe_with_errors(
        &self,
        user_id: &UserId,
        on_data: impl FnMut(Option<NetworkPersistence>) + 'static,
        on_error: impl FnMut(StoreError) + 'static,
    ) -> StoreResult<Subscription> {
        self.listen(user_id, Box::new(on_data), Some(Box::new(on_error)))
    }

    fn listen(
        &self,
        user_id: &UserId,
        mut on_data: Box<dyn FnMut(Option<NetworkPersistence>)>,
        mut on_error: Option<ErrorCallback>,
    ) -> StoreResult<Subscription> {
        let path = self.config.document_path(user_id);
        let active = Rc::new(Cell::new(true));

        let data_active = active.clone();
        let config = self.config.clone();
        let on_snapshot = Box::new(move |snapshot: Option<DocumentSnapshot>| {
            if !data_active.get() {
                return;
            }
            on_data(snapshot.map(|s| NetworkPersistence::from_snapshot(&s, &config)));
        });

        let error_active = active.clone();
        let error_path = path.clone();
        let on_channel_error = Box::new(move |err: StoreError| {
            if !error_active.replace(false) {
                return;
            }
            log::error!("Subscription to {} failed: {}", error_path, err);
            if let Some(on_error) = on_error.as_mut() {
                on_error(err);
            }
        });

        let registration = self
            .remote
            .listen(&path, on_snapshot, on_channel_error)
            .inspect_err(|err| log::warn!("Could not subscribe to {}: {}", path, err))?;
        log::debug!("Subscribed to {}", path);

        Ok(Subscription {
            user_id: user_id.clone(),
            active,
            registration,
        })
    }

    /// Cache the record under `neural_network_{user}`
    ///
    /// Storage failures (e.g. quota) propagate.
    pub fn save_local(&self, user_id: &UserId, data: &NetworkPersistence) -> StoreResult<()> {
        let key = self.config.local_key(user_id);
        let json = serde_json::to_string(data)?;
        self.local.set_item(&key, &json)?;
        log::info!("Cached neural network locally ({} bytes)", json.len());
        Ok(())
    }

    /// Read the cached record
    ///
    /// Missing, unreadable and corrupt entries all read as `None`.
    pub fn load_local(&self, user_id: &UserId) -> Option<NetworkPersistence> {
        let key = self.config.local_key(user_id);
        let json = match self.local.get_item(&key) {
            Ok(Some(json)) => json,
            Ok(None) => return None,
            Err(err) => {
                log::warn!("Could not read local cache '{}': {}", key, err);
                return None;
            }
        };

        match serde_json::from_str(&json) {
            Ok(record) => Some(record),
            Err(err) => {
                log::warn!("Ignoring corrupt local cache '{}': {}", key, err);
                None
            }
        }
    }

    /// Remove the cached record; clearing a missing entry is fine
    pub fn clear_local(&self, user_id: &UserId) -> StoreResult<()> {
        self.local.remove_item(&self.config.local_key(user_id))?;
        log::info!("Cleared local cache for {}", user_id);
        Ok(())
    }
}

/// Live subscription token
///
/// Active until [`Subscription::unsubscribe`], drop, or a channel error.
/// Terminated subscriptions never deliver data again.
#[must_use = "dropping a Subscription ends it"]
pub struct Subscription {
    user_id: UserId,
    active: Rc<Cell<bool>>,
    registration: ListenerRegistration,
}

impl Subscription {
    /// End the subscription; repeated calls are no-ops
    pub fn unsubscribe(&self) {
        if self.active.replace(false) {
            log::debug!("Unsubscribed {}", self.user_id);
        }
        self.registration.remove();
    }

    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("user_id", &self.user_id)
            .field("active", &self.is_active())
            .finish()
    }
}
