//! # vault-db: Encrypted Cache Persistence
//!
//! Stores the encrypted replica snapshot in SQLite so the replica can be
//! restored at startup without a network round-trip.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Cache Data Flow                                  │
//! │                                                                         │
//! │  vault-sync (cache writer, hydrator)                                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     vault-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repository   │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │◄───│  (cache.rs)   │    │  (embedded)  │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite file in the platform data directory                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use vault_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("vault-cache.db")).await?;
//! db.cache().write("user-1", &ciphertext, "{}").await?;
//! let blob = db.cache().read("user-1").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use repository::cache::{CacheRepository, CachedBlob};
