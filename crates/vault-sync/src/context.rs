//! # Sync Context
//!
//! Everything a background task needs, bundled so it can be cloned into
//! each spawned task.

use std::sync::Arc;
use tokio::sync::Mutex;

use crate::cache::CacheStorage;
use crate::callbacks::{NoopCallbacks, SyncCallbacks};
use crate::config::SyncConfig;
use crate::crypto::{CryptoProvider, SessionProvider};
use crate::store::StoreHandle;
use crate::transport::VaultApi;

#[derive(Clone)]
pub struct SyncContext {
    pub store: StoreHandle,
    pub config: Arc<SyncConfig>,
    pub api: Arc<dyn VaultApi>,
    pub crypto: Arc<dyn CryptoProvider>,
    pub session: Arc<dyn SessionProvider>,
    pub cache: Arc<dyn CacheStorage>,
    pub callbacks: Arc<dyn SyncCallbacks>,

    /// Serializes cache reads and writes.
    pub cache_lock: Arc<Mutex<()>>,
}

impl SyncContext {
    pub fn new(
        store: StoreHandle,
        config: SyncConfig,
        api: Arc<dyn VaultApi>,
        crypto: Arc<dyn CryptoProvider>,
        session: Arc<dyn SessionProvider>,
        cache: Arc<dyn CacheStorage>,
    ) -> Self {
        SyncContext {
            store,
            config: Arc::new(config),
            api,
            crypto,
            session,
            cache,
            callbacks: Arc::new(NoopCallbacks),
            cache_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn with_callbacks(mut self, callbacks: Arc<dyn SyncCallbacks>) -> Self {
        self.callbacks = callbacks;
        self
    }
}
