//! # Crypto & Session Capabilities
//!
//! The runtime never touches key material itself. Decrypting items and
//! shares, sealing the cache, and providing session credentials are
//! delegated to two capabilities supplied by the embedding application.

use serde::{Deserialize, Serialize};

use vault_core::{ItemRevision, Share};

use crate::error::SyncResult;
use crate::protocol::{EncryptedItem, EncryptedShare};

/// Opaque key-cache state of the crypto layer, persisted next to the
/// replica so a later hydration can skip key derivation.
///
/// Always serializes as an object, so an empty key cache (`null`) is still
/// a present snapshot once read back.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CryptoSnapshot {
    #[serde(default)]
    pub keys: serde_json::Value,
}

impl CryptoSnapshot {
    pub fn new(keys: serde_json::Value) -> Self {
        CryptoSnapshot { keys }
    }
}

/// Decrypts server payloads and seals the cache.
pub trait CryptoProvider: Send + Sync {
    /// Opens one encrypted item revision of `share_id`.
    fn open_item(&self, share_id: &str, item: &EncryptedItem) -> SyncResult<ItemRevision>;

    /// Opens a share, stamping it with `event_id` as its watermark.
    fn open_share(&self, share: &EncryptedShare, event_id: &str) -> SyncResult<Share>;

    /// Seals a serialized cache with the session lock token.
    fn encrypt_cache(&self, plaintext: &[u8], lock_token: Option<&str>) -> SyncResult<Vec<u8>>;

    /// Opens a sealed cache.
    fn decrypt_cache(&self, ciphertext: &[u8], lock_token: Option<&str>) -> SyncResult<Vec<u8>>;

    /// Current key-cache state, if any.
    fn snapshot(&self) -> Option<CryptoSnapshot>;

    /// Restores key-cache state. `None` means keys must be derived again.
    fn hydrate(&self, snapshot: Option<&CryptoSnapshot>) -> SyncResult<()>;
}

/// Authenticated session identifiers sent with every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCredentials {
    pub uid: String,
    pub access_token: String,
}

/// Session state owned by the embedding application.
pub trait SessionProvider: Send + Sync {
    fn credentials(&self) -> Option<SessionCredentials>;

    /// Extra secret mixed into the cache key while a session lock is set.
    fn lock_token(&self) -> Option<String>;

    fn is_locked(&self) -> bool {
        false
    }
}
