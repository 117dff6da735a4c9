//! # Repository Module
//!
//! Repositories wrap every SQL statement behind a typed API.
//!
//! ```text
//! CacheRepository
//! ├── read(slot)                      ──► Option<CachedBlob>
//! ├── write(slot, ciphertext, meta)   ──► CachedBlob (upsert)
//! └── clear(slot)                     ──► bool
//! ```

pub mod cache;
