//! Neural Persist entry point
//!
//! In the browser the library's `start` hook does the setup and JavaScript
//! drives `WebNetworkStore`. Natively this runs a walkthrough against the
//! in-process backends.

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    neural_persist::platform::init_logging(log::Level::Info);
    log::info!("Neural Persist (native) starting...");
    log::info!("Native mode uses in-process backends - build for wasm32 for the web version");

    if let Err(err) = pollster::block_on(demo::run()) {
        log::error!("Walkthrough failed: {}", err);
        std::process::exit(1);
    }
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // WASM entry point is the library's start hook, this is just to satisfy the compiler
}

#[cfg(not(target_arch = "wasm32"))]
mod demo {
    use std::cell::Cell;
    use std::rc::Rc;

    use neural_persist::local::{KeyValueStorage, MemoryStorage};
    use neural_persist::remote::MemoryDocumentStore;
    use neural_persist::{NetworkPersistence, NetworkStateStore, StoreResult, UserId};
    use serde_json::json;

    pub async fn run() -> StoreResult<()> {
        let store = NetworkStateStore::new(MemoryDocumentStore::new(), MemoryStorage::new());

        // Remote round trip
        let user = UserId::new("user-1")?;
        let updates = Rc::new(Cell::new(0u32));
        let counter = updates.clone();
        let subscription = store.subscribe(&user, move |record| {
            counter.set(counter.get() + 1);
            match record {
                Some(r) => log::info!("Update: seed={} lastSyncAt={:?}", r.seed, r.last_sync_at),
                None => log::info!("Update: no record yet"),
            }
        })?;

        store
            .save(&user, &NetworkPersistence::new(42, json!([1, 2, 3])))
            .await?;
        if let Some(record) = store.load(&user).await? {
            log::info!("Loaded: seed={} neurons={}", record.seed, record.neurons);
        }
        subscription.unsubscribe();
        subscription.unsubscribe();
        log::info!("Subscription delivered {} updates", updates.get());

        let ghost = UserId::new("user-ghost")?;
        log::info!("Ghost user record present: {}", store.load(&ghost).await?.is_some());

        // Offline cache
        let offline = UserId::new("user-2")?;
        let cached = NetworkPersistence::new("abc", json!([]));
        store.save_local(&offline, &cached)?;
        log::info!(
            "Local round trip identical: {}",
            store.load_local(&offline).as_ref() == Some(&cached)
        );

        store.local().set_item("neural_network_user-3", "{corrupt")?;
        log::info!(
            "Corrupt cache reads as absent: {}",
            store.load_local(&UserId::new("user-3")?).is_none()
        );

        store.clear_local(&offline)?;
        store.clear_local(&offline)?;
        log::info!("Cleared cache present: {}", store.load_local(&offline).is_some());

        store.remote().close();
        println!("\n✓ Walkthrough complete");
        Ok(())
    }
}
