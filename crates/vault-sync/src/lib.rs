//! # vault-sync: Replica Synchronization Runtime
//!
//! This crate runs every asynchronous task around the pure replica held
//! by `vault-core`: the dispatch handle, one event channel per share, the
//! polling supervisor, the encrypted cache writer and the hydrator.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Runtime Architecture                        │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                  StoreHandle (single dispatch)                   │  │
//! │  │                                                                  │  │
//! │  │  ReplicaState behind one lock, actions broadcast in reduce order │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │ Action                                  │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │  Supervisor    │  │  CacheWriter   │  │  Hydrator              │    │
//! │  │                │  │                │  │                        │    │
//! │  │ Start/Stop     │  │ CacheRequest   │  │ StateSync (latest wins)│    │
//! │  │ EventPolling   │  │ CacheCancel    │  │ decrypt ─► sanitize ─► │    │
//! │  │ one channel    │  │ seal + store   │  │ StateHydrate           │    │
//! │  │ per share      │  │                │  │                        │    │
//! │  └───────┬────────┘  └────────────────┘  └────────────────────────┘    │
//! │          ▼                                                              │
//! │  ┌────────────────┐       ┌────────────────┐                           │
//! │  │ ShareChannel   │──────►│ VaultApi       │  HttpTransport (reqwest)  │
//! │  │ (long polling) │       │                │                           │
//! │  └────────────────┘       └────────────────┘                           │
//! │                                                                         │
//! │  CAPABILITIES (supplied by the embedding application):                 │
//! │  • CryptoProvider  - opens items/shares, seals the cache               │
//! │  • SessionProvider - credentials and lock token                        │
//! │  • SyncCallbacks   - side effects before remote deletions/updates      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`store`] - Dispatch handle around the replica
//! - [`channel`] - Per-share event channel
//! - [`supervisor`] - Owner of the active channels
//! - [`cache`] - Encrypted cache types, storage and writer
//! - [`hydrate`] - Cache hydration and boot sequence
//! - [`runtime`] - Wiring of every task
//! - [`transport`] - Remote API seam and its HTTP implementation
//! - [`protocol`] - Wire types
//! - [`crypto`] - Crypto and session capabilities
//! - [`callbacks`] - Application hooks
//! - [`config`] - Runtime configuration
//! - [`error`] - Sync error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use vault_sync::{SyncConfig, SyncContextBuilder, SyncRuntime};
//!
//! let config = SyncConfig::load_or_default(None);
//! let cache = vault_sync::open_cache_storage(&config).await?;
//!
//! let ctx = SyncContextBuilder::new(config)
//!     .with_crypto(crypto)
//!     .with_session(session)
//!     .with_cache(cache)
//!     .build()?;
//!
//! let runtime = SyncRuntime::start(ctx).await?;
//! runtime.wake();
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cache;
pub mod callbacks;
pub mod channel;
pub mod config;
pub mod context;
pub mod crypto;
pub mod error;
pub mod hydrate;
pub mod protocol;
pub mod runtime;
pub mod store;
pub mod supervisor;
pub mod transport;

// =============================================================================
// Re-exports
// =============================================================================

pub use cache::{
    CacheMetadata, CacheStorage, CacheWriter, EncryptedCache, MemoryCacheStorage,
    SqliteCacheStorage,
};
pub use callbacks::{NoopCallbacks, SyncCallbacks};
pub use channel::{spawn_share_channel, ChannelHandle};
pub use config::SyncConfig;
pub use context::SyncContext;
pub use crypto::{CryptoProvider, CryptoSnapshot, SessionCredentials, SessionProvider};
pub use error::{SyncError, SyncResult, SHARE_DISABLED_CODE};
pub use hydrate::{boot, hydrate_from_cache, FailurePolicy, HydrateOptions, Hydrator};
pub use runtime::{open_cache_storage, SyncContextBuilder, SyncRuntime};
pub use store::StoreHandle;
pub use supervisor::{Supervisor, SupervisorHandle, SupervisorStatus};
pub use transport::{HttpTransport, VaultApi};
