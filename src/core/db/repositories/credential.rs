//! Credential store for the dual-token scheme
//!
//! Maps namespaced refresh credentials to encoded identity tokens with a
//! per-entry time-to-live. The PostgreSQL store is shared by every instance of
//! the service; the in-memory store is for tests and single-node development.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use sqlx::PgPool;
use tokio::time::Instant;

/// Credential store error types
#[derive(Debug, thiserror::Error)]
pub enum CredentialStoreError {
    #[error("TTL out of range: {0:?}")]
    InvalidTtl(Duration),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

/// Key-value store with per-key expiration
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Store `value` under `key`, replacing any previous entry
    async fn put(&self, key: &str, value: &str, ttl: Duration)
    -> Result<(), CredentialStoreError>;

    /// Fetch a live entry; expired entries read as absent
    async fn get(&self, key: &str) -> Result<Option<String>, CredentialStoreError>;

    /// Remove an entry, returning whether a live one existed
    async fn delete(&self, key: &str) -> Result<bool, CredentialStoreError>;

    /// Drop every expired entry, returning how many were removed
    async fn purge_expired(&self) -> Result<u64, CredentialStoreError>;
}

// ============================================================================
// PostgreSQL
// ============================================================================

/// Credential store backed by the `credential_store` table
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    /// Create a new credential store
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn put(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), CredentialStoreError> {
        let ttl_delta =
            chrono::Duration::from_std(ttl).map_err(|_| CredentialStoreError::InvalidTtl(ttl))?;
        let expires_at = Utc::now()
            .checked_add_signed(ttl_delta)
            .ok_or(CredentialStoreError::InvalidTtl(ttl))?;

        sqlx::query(
            r#"
            INSERT INTO credential_store (key, value, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (key)
            DO UPDATE SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CredentialStoreError> {
        let value = sqlx::query_scalar::<_, String>(
            r#"
            SELECT value
            FROM credential_store
            WHERE key = $1 AND expires_at > NOW()
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(value)
    }

    async fn delete(&self, key: &str) -> Result<bool, CredentialStoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM credential_store
            WHERE key = $1 AND expires_at > NOW()
            "#,
        )
        .bind(key)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn purge_expired(&self) -> Result<u64, CredentialStoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM credential_store
            WHERE expires_at <= NOW()
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

// ============================================================================
// In-memory
// ============================================================================

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-process credential store.
///
/// Entries live in this process only, so it must not back a horizontally
/// scaled deployment.
#[derive(Clone, Default)]
pub struct MemoryCredentialStore {
    entries: Arc<DashMap<String, Entry>>,
}

impl MemoryCredentialStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries, live or not yet purged
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn put(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), CredentialStoreError> {
        let expires_at = Instant::now()
            .checked_add(ttl)
            .ok_or(CredentialStoreError::InvalidTtl(ttl))?;

        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CredentialStoreError> {
        let now = Instant::now();

        {
            let Some(entry) = self.entries.get(key) else {
                return Ok(None);
            };
            if entry.expires_at > now {
                return Ok(Some(entry.value.clone()));
            }
        }

        self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        Ok(None)
    }

    async fn delete(&self, key: &str) -> Result<bool, CredentialStoreError> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, entry)| entry.expires_at > now))
    }

    async fn purge_expired(&self) -> Result<u64, CredentialStoreError> {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        Ok(before.saturating_sub(self.entries.len()) as u64)
    }
}
