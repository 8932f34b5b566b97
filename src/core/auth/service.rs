//! Session service
//!
//! Issues sessions after a successful login and serves the refresh exchange.
//! A session is a signed identity token plus an opaque refresh credential; the
//! credential store maps the latter to the former.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::core::auth::config::AuthConfig;
use crate::core::auth::credential::{REFRESH_CREDENTIAL_LEN, generate_refresh_credential};
use crate::core::auth::jwt::{self, JwtError, JwtHeader, JwtPayload, UID_CLAIM, UserId};
use crate::core::db::repositories::{CredentialStore, CredentialStoreError};

/// Namespace for refresh credentials in a shared store
pub const CREDENTIAL_KEY_PREFIX: &str = "dual_token_";

/// Session service error types
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session issue failed: {0}")]
    Issue(#[from] JwtError),

    #[error("Credential store failure: {0}")]
    Store(#[from] CredentialStoreError),
}

/// A freshly issued session
#[derive(Debug, Clone)]
pub struct IssuedSession {
    /// Signed identity token
    pub identity_token: String,
    /// Opaque refresh credential
    pub refresh_credential: String,
    /// Identity token expiration (Unix timestamp)
    pub expires_at: i64,
    /// Refresh cookie max-age in seconds
    pub refresh_max_age: i64,
}

/// Credential store key for a refresh credential
pub fn credential_key(refresh_credential: &str) -> String {
    format!("{CREDENTIAL_KEY_PREFIX}{refresh_credential}")
}

/// Issues, exchanges and invalidates sessions
#[derive(Clone)]
pub struct SessionService {
    config: Arc<AuthConfig>,
    store: Arc<dyn CredentialStore>,
}

impl SessionService {
    /// Create a new session service
    pub fn new(config: Arc<AuthConfig>, store: Arc<dyn CredentialStore>) -> Self {
        Self { config, store }
    }

    /// Build the identity token payload for `user_id` at `now`
    fn payload_for(&self, user_id: UserId, now: i64) -> JwtPayload {
        let lifetime = i64::try_from(self.config.access_lifetime().as_secs()).unwrap_or(i64::MAX);

        JwtPayload {
            id: Uuid::new_v4().to_string(),
            issuer: self.config.issuer.clone(),
            audience: self.config.audience.clone(),
            subject: user_id.to_string(),
            issued_at: now,
            not_before: now,
            expiration: now.saturating_add(lifetime),
            ..Default::default()
        }
        .with_claim(UID_CLAIM, user_id)
    }

    /// Issue a session for an authenticated user.
    ///
    /// Nothing is stored if the token cannot be encoded.
    pub async fn issue(&self, user_id: UserId) -> Result<IssuedSession, SessionError> {
        let payload = self.payload_for(user_id, Utc::now().timestamp());
        let identity_token = jwt::encode(&JwtHeader::default(), &payload, &self.config.secret)?;

        let refresh_credential = generate_refresh_credential(REFRESH_CREDENTIAL_LEN);
        self.store
            .put(
                &credential_key(&refresh_credential),
                &identity_token,
                self.config.refresh_ttl,
            )
            .await
            .inspect_err(|e| {
                tracing::error!(user_id, error = %e, "Failed to store refresh credential")
            })?;

        tracing::debug!(user_id, jti = %payload.id, "Session issued");

        Ok(IssuedSession {
            identity_token,
            refresh_credential,
            expires_at: payload.expiration,
            refresh_max_age: self.config.refresh_max_age_secs(),
        })
    }

    /// Exchange a refresh credential for its identity token.
    ///
    /// Returns the stored token verbatim, or `None` when the credential is
    /// unknown or its entry has expired. Never re-signs.
    pub async fn exchange(&self, refresh_credential: &str) -> Result<Option<String>, SessionError> {
        if refresh_credential.is_empty() {
            return Ok(None);
        }

        let token = self
            .store
            .get(&credential_key(refresh_credential))
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Failed to read refresh credential"))?;

        Ok(token)
    }

    /// Invalidate a refresh credential before its TTL elapses.
    ///
    /// Returns whether a live entry was removed. Identity tokens already handed
    /// out stay valid until their own expiration.
    pub async fn invalidate(&self, refresh_credential: &str) -> Result<bool, SessionError> {
        if refresh_credential.is_empty() {
            return Ok(false);
        }

        let removed = self
            .store
            .delete(&credential_key(refresh_credential))
            .await?;
        Ok(removed)
    }

    /// Drop expired credential store entries
    pub async fn purge_expired(&self) -> Result<u64, SessionError> {
        Ok(self.store.purge_expired().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::repositories::MemoryCredentialStore;
    use async_trait::async_trait;
    use std::time::Duration;

    const SECRET: &str = "test_secret_key_for_testing_only";

    fn create_test_service() -> (SessionService, MemoryCredentialStore) {
        let store = MemoryCredentialStore::new();
        let service = SessionService::new(
            Arc::new(AuthConfig::new(SECRET)),
            Arc::new(store.clone()),
        );
        (service, store)
    }

    /// Store whose every call fails
    struct FailingStore;

    #[async_trait]
    impl CredentialStore for FailingStore {
        async fn put(&self, _: &str, _: &str, ttl: Duration) -> Result<(), CredentialStoreError> {
            Err(CredentialStoreError::InvalidTtl(ttl))
        }

        async fn get(&self, _: &str) -> Result<Option<String>, CredentialStoreError> {
            Err(CredentialStoreError::InvalidTtl(Duration::ZERO))
        }

        async fn delete(&self, _: &str) -> Result<bool, CredentialStoreError> {
            Err(CredentialStoreError::InvalidTtl(Duration::ZERO))
        }

        async fn purge_expired(&self) -> Result<u64, CredentialStoreError> {
            Ok(0)
        }
    }

    #[test]
    fn test_credential_key_is_namespaced() {
        assert_eq!(credential_key("abc"), "dual_token_abc");
    }

    #[test]
    fn test_payload_for() {
        let (service, _) = create_test_service();
        let payload = service.payload_for(42, 1_700_000_000);

        assert_eq!(payload.issuer, "blog");
        assert_eq!(payload.subject, "42");
        assert_eq!(payload.issued_at, 1_700_000_000);
        assert_eq!(payload.not_before, 1_700_000_000);
        assert_eq!(payload.expiration, 1_700_000_000 + 8 * 24 * 60 * 60);
        assert_eq!(payload.user_id(), Ok(Some(42)));
        assert!(Uuid::parse_str(&payload.id).is_ok());
    }

    #[tokio::test]
    async fn test_issue_stores_token_under_credential() {
        let (service, store) = create_test_service();

        let session = service.issue(42).await.unwrap();

        assert_eq!(session.refresh_credential.len(), REFRESH_CREDENTIAL_LEN);
        assert_eq!(session.refresh_max_age, 604_800);
        assert_eq!(
            store
                .get(&credential_key(&session.refresh_credential))
                .await
                .unwrap(),
            Some(session.identity_token.clone())
        );
    }

    #[tokio::test]
    async fn test_issued_token_carries_uid() {
        let (service, _) = create_test_service();

        let session = service.issue(7).await.unwrap();
        let (header, payload) = jwt::decode(&session.identity_token, SECRET).unwrap();

        assert_eq!(header, JwtHeader::default());
        assert_eq!(payload.user_id(), Ok(Some(7)));
        assert_eq!(payload.expiration, session.expires_at);
    }

    #[tokio::test]
    async fn test_sessions_are_distinct() {
        let (service, store) = create_test_service();

        let first = service.issue(1).await.unwrap();
        let second = service.issue(1).await.unwrap();

        assert_ne!(first.refresh_credential, second.refresh_credential);
        assert_ne!(first.identity_token, second.identity_token);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_exchange_returns_token_verbatim() {
        let (service, _) = create_test_service();
        let session = service.issue(42).await.unwrap();

        let first = service.exchange(&session.refresh_credential).await.unwrap();
        let second = service.exchange(&session.refresh_credential).await.unwrap();

        assert_eq!(first, Some(session.identity_token.clone()));
        assert_eq!(second, first);
    }

    #[tokio::test]
    async fn test_exchange_unknown_or_empty_credential() {
        let (service, _) = create_test_service();

        assert_eq!(service.exchange("unknown").await.unwrap(), None);
        assert_eq!(service.exchange("").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_invalidate() {
        let (service, _) = create_test_service();
        let session = service.issue(42).await.unwrap();

        assert!(service.invalidate(&session.refresh_credential).await.unwrap());
        assert_eq!(
            service.exchange(&session.refresh_credential).await.unwrap(),
            None
        );
        assert!(!service.invalidate(&session.refresh_credential).await.unwrap());
        assert!(!service.invalidate("").await.unwrap());
    }

    #[tokio::test]
    async fn test_issue_propagates_store_failure() {
        let service = SessionService::new(
            Arc::new(AuthConfig::new(SECRET)),
            Arc::new(FailingStore),
        );

        let result = service.issue(42).await;
        assert!(matches!(result, Err(SessionError::Store(_))));
    }

    #[tokio::test]
    async fn test_exchange_propagates_store_failure() {
        let service = SessionService::new(
            Arc::new(AuthConfig::new(SECRET)),
            Arc::new(FailingStore),
        );

        let result = service.exchange("abc").await;
        assert!(matches!(result, Err(SessionError::Store(_))));
    }

    #[test]
    fn test_session_error_from_jwt_error() {
        let err: SessionError = JwtError::Encoding("boom".to_string()).into();
        assert!(matches!(err, SessionError::Issue(_)));
        assert_eq!(
            err.to_string(),
            "Session issue failed: Token encoding failed: boom"
        );
    }
}
