//! # Sync Runtime
//!
//! Wires the background tasks together: boot, then keep the supervisor,
//! cache writer and hydrator running until shutdown.

use std::sync::Arc;
use tracing::info;

use vault_core::ReplicaState;
use vault_db::{Database, DbConfig};

use crate::cache::{CacheStorage, CacheWriter, CacheWriterHandle, MemoryCacheStorage, SqliteCacheStorage};
use crate::callbacks::SyncCallbacks;
use crate::config::SyncConfig;
use crate::context::SyncContext;
use crate::crypto::{CryptoProvider, SessionProvider};
use crate::error::{SyncError, SyncResult};
use crate::hydrate::{boot, Hydrator, HydratorHandle};
use crate::store::StoreHandle;
use crate::supervisor::{Supervisor, SupervisorHandle, SupervisorStatus};
use crate::transport::{HttpTransport, VaultApi};

// =============================================================================
// Sync Runtime
// =============================================================================

/// Running background tasks.
pub struct SyncRuntime {
    ctx: SyncContext,
    supervisor: SupervisorHandle,
    cache_writer: CacheWriterHandle,
    hydrator: HydratorHandle,
    hydrated: bool,
}

impl SyncRuntime {
    /// Spawns every task, then boots the replica.
    pub async fn start(ctx: SyncContext) -> SyncResult<Self> {
        info!("Starting sync runtime");

        let supervisor = Supervisor::spawn(ctx.clone());
        let cache_writer = CacheWriter::spawn(ctx.clone());
        let hydrator = Hydrator::spawn(ctx.clone());

        let hydrated = match boot(&ctx).await {
            Ok(hydrated) => hydrated,
            Err(err) => {
                supervisor.shutdown().await;
                cache_writer.shutdown().await;
                hydrator.shutdown().await;
                return Err(err);
            }
        };

        Ok(SyncRuntime {
            ctx,
            supervisor,
            cache_writer,
            hydrated,
            hydrator,
        })
    }

    pub fn store(&self) -> &StoreHandle {
        &self.ctx.store
    }

    /// Whether boot restored the replica from the cache.
    pub fn hydrated_from_cache(&self) -> bool {
        self.hydrated
    }

    pub async fn status(&self) -> SupervisorStatus {
        self.supervisor.status().await
    }

    /// Forces every open channel to poll now.
    pub fn wake(&self) {
        self.supervisor.wake();
    }

    /// Stops every task.
    pub async fn shutdown(self) {
        info!("Shutting down sync runtime");
        self.hydrator.shutdown().await;
        self.supervisor.shutdown().await;
        self.cache_writer.shutdown().await;
        info!("Sync runtime stopped");
    }
}

/// Opens the cache storage configured in `config`.
///
/// Without a database path the cache lives in memory only.
pub async fn open_cache_storage(config: &SyncConfig) -> SyncResult<Arc<dyn CacheStorage>> {
    match &config.cache.database_path {
        Some(path) => {
            let db = Database::new(DbConfig::new(path)).await?;
            Ok(Arc::new(SqliteCacheStorage::new(&db)))
        }
        None => Ok(Arc::new(MemoryCacheStorage::new())),
    }
}

// =============================================================================
// Builder Pattern
// =============================================================================

/// Builder for a [`SyncContext`].
pub struct SyncContextBuilder {
    config: SyncConfig,
    state: ReplicaState,
    api: Option<Arc<dyn VaultApi>>,
    crypto: Option<Arc<dyn CryptoProvider>>,
    session: Option<Arc<dyn SessionProvider>>,
    cache: Option<Arc<dyn CacheStorage>>,
    callbacks: Option<Arc<dyn SyncCallbacks>>,
}

impl SyncContextBuilder {
    pub fn new(config: SyncConfig) -> Self {
        SyncContextBuilder {
            config,
            state: ReplicaState::default(),
            api: None,
            crypto: None,
            session: None,
            cache: None,
            callbacks: None,
        }
    }

    pub fn with_state(mut self, state: ReplicaState) -> Self {
        self.state = state;
        self
    }

    /// Sets the API. Defaults to [`HttpTransport`].
    pub fn with_api(mut self, api: Arc<dyn VaultApi>) -> Self {
        self.api = Some(api);
        self
    }

    pub fn with_crypto(mut self, crypto: Arc<dyn CryptoProvider>) -> Self {
        self.crypto = Some(crypto);
        self
    }

    pub fn with_session(mut self, session: Arc<dyn SessionProvider>) -> Self {
        self.session = Some(session);
        self
    }

    /// Sets the cache storage. Defaults to memory.
    pub fn with_cache(mut self, cache: Arc<dyn CacheStorage>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_callbacks(mut self, callbacks: Arc<dyn SyncCallbacks>) -> Self {
        self.callbacks = Some(callbacks);
        self
    }

    pub fn build(self) -> SyncResult<SyncContext> {
        self.config.validate()?;

        let crypto = self
            .crypto
            .ok_or_else(|| SyncError::InvalidConfig("Crypto provider required".into()))?;
        let session = self
            .session
            .ok_or_else(|| SyncError::InvalidConfig("Session provider required".into()))?;

        let api = match self.api {
            Some(api) => api,
            None => Arc::new(HttpTransport::new(&self.config.api, session.clone())?),
        };
        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(MemoryCacheStorage::new()));

        let ctx = SyncContext::new(
            StoreHandle::new(self.state),
            self.config,
            api,
            crypto,
            session,
            cache,
        );

        Ok(match self.callbacks {
            Some(callbacks) => ctx.with_callbacks(callbacks),
            None => ctx,
        })
    }
}
