//! # Sync Error Types
//!
//! Error types for the replica runtime.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Transport     │  │     Protocol            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Http           │  │  SerializationFailed    │ │
//! │  │  InvalidUrl     │  │  Timeout        │  │  DeserializationFailed  │ │
//! │  │  ConfigLoad/Save│  │  Api {code}     │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Crypto/Session │  │     Cache       │  │      Internal           │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Crypto         │  │  CacheMissing   │  │  ShuttingDown           │ │
//! │  │  SessionLocked  │  │  CacheCorrupted │  │  ChannelError           │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// API error code returned when a share was disabled or access revoked.
pub const SHARE_DISABLED_CODE: i64 = 300004;

/// Sync error type covering every failure of the runtime layer.
///
/// Only [`SyncError::is_share_disabled`] errors are terminal for an event
/// channel. Everything else is retried on the next tick.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Invalid API base URL.
    #[error("Invalid API URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// Request could not be sent or the response could not be read.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Request did not complete in time.
    #[error("Request timeout after {0} seconds")]
    Timeout(u64),

    /// Server answered with an error body.
    #[error("API error {code} (HTTP {status}): {message}")]
    Api {
        status: u16,
        code: i64,
        message: String,
    },

    // =========================================================================
    // Protocol Errors
    // =========================================================================
    /// Failed to serialize a payload.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// Failed to deserialize a payload.
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    // =========================================================================
    // Crypto & Session Errors
    // =========================================================================
    /// Encryption or decryption failed.
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// The session is locked; no key material available.
    #[error("Session is locked")]
    SessionLocked,

    // =========================================================================
    // Cache Errors
    // =========================================================================
    /// No cache blob stored yet.
    #[error("No cached state available")]
    CacheMissing,

    /// Cache blob exists but cannot be used.
    #[error("Cached state is corrupted: {0}")]
    CacheCorrupted(String),

    /// Cache storage failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal runtime error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Runtime is shutting down.
    #[error("Sync runtime is shutting down")]
    ShuttingDown,

    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<vault_db::DbError> for SyncError {
    fn from(err: vault_db::DbError) -> Self {
        SyncError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            SyncError::DeserializationFailed(err.to_string())
        } else {
            SyncError::SerializationFailed(err.to_string())
        }
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SyncError::DeserializationFailed(err.to_string())
        } else {
            SyncError::Http(err.to_string())
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl SyncError {
    /// Returns true if the next poll may succeed where this one failed.
    ///
    /// ## Retryable Errors
    /// - Network failures and timeouts
    /// - Server errors (5xx) and rate limiting (429)
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Http(_) | SyncError::Timeout(_) => true,
            SyncError::Api { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Returns true if the share was disabled server-side.
    pub fn is_share_disabled(&self) -> bool {
        matches!(self, SyncError::Api { code, .. } if *code == SHARE_DISABLED_CODE)
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }

    /// Returns true if the cache blob cannot be turned back into a replica.
    pub fn is_cache_error(&self) -> bool {
        matches!(
            self,
            SyncError::CacheMissing
                | SyncError::CacheCorrupted(_)
                | SyncError::Crypto(_)
                | SyncError::SessionLocked
                | SyncError::DeserializationFailed(_)
        )
    }
}
