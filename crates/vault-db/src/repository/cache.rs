//! # Cache Repository
//!
//! Stores the encrypted replica snapshot, one row per slot.
//!
//! ## Write Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  CacheRequest ──► snapshot ──► encrypt ──► write(slot, blob, meta)     │
//! │                                                  │                      │
//! │                                                  ▼                      │
//! │                       INSERT ... ON CONFLICT(slot) DO UPDATE            │
//! │                       (the previous blob is replaced atomically)        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;

/// One persisted cache blob.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct CachedBlob {
    pub slot: String,

    /// Encrypted replica. Opaque to this crate.
    pub ciphertext: Vec<u8>,

    /// JSON metadata needed to decrypt `ciphertext`.
    pub metadata: String,

    pub updated_at: DateTime<Utc>,
}

/// Repository for the encrypted cache.
#[derive(Debug, Clone)]
pub struct CacheRepository {
    pool: SqlitePool,
}

impl CacheRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CacheRepository { pool }
    }

    /// Reads the blob stored for `slot`, if any.
    pub async fn read(&self, slot: &str) -> DbResult<Option<CachedBlob>> {
        let blob = sqlx::query_as::<_, CachedBlob>(
            r#"
            SELECT slot, ciphertext, metadata, updated_at
            FROM cache_snapshot
            WHERE slot = ?1
            "#,
        )
        .bind(slot)
        .fetch_optional(&self.pool)
        .await?;

        Ok(blob)
    }

    /// Replaces the blob stored for `slot`.
    pub async fn write(&self, slot: &str, ciphertext: &[u8], metadata: &str) -> DbResult<CachedBlob> {
        let now = Utc::now();

        debug!(slot = %slot, bytes = ciphertext.len(), "Writing cache blob");

        sqlx::query(
            r#"
            INSERT INTO cache_snapshot (slot, ciphertext, metadata, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(slot) DO UPDATE SET
                ciphertext = excluded.ciphertext,
                metadata = excluded.metadata,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(slot)
        .bind(ciphertext)
        .bind(metadata)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(CachedBlob {
            slot: slot.to_string(),
            ciphertext: ciphertext.to_vec(),
            metadata: metadata.to_string(),
            updated_at: now,
        })
    }

    /// Deletes the blob stored for `slot`. Returns true if one existed.
    pub async fn clear(&self, slot: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM cache_snapshot WHERE slot = ?1")
            .bind(slot)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
