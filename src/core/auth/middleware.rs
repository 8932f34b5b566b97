//! Request authentication middleware
//!
//! Every protected route sits behind [`gate`]. It reads the identity token from
//! the configured header, verifies it and either attaches an [`Identity`] to the
//! request or answers `403 auth failed` without running the handler.
//!
//! All verification failures collapse into the same response so clients cannot
//! tell a forged token from an expired or malformed one.

use std::sync::Arc;

use axum::{
    Router,
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, StatusCode, header, request::Parts},
    middleware::{self, Next},
    response::{IntoResponse, Response},
};
use chrono::Utc;

use crate::core::auth::config::AuthConfig;
use crate::core::auth::jwt::{self, ALGORITHM, JwtError, JwtPayload, UserId};

/// Body of every rejected request
pub const AUTH_FAILED: &str = "auth failed";

/// Verifies identity tokens with the shared secret
#[derive(Clone)]
pub struct Authenticator {
    config: Arc<AuthConfig>,
}

impl Authenticator {
    /// Create a new authenticator
    pub fn new(config: Arc<AuthConfig>) -> Self {
        Self { config }
    }

    /// Verify a token against the current wall clock
    pub fn verify(&self, token: &str) -> Result<JwtPayload, JwtError> {
        self.verify_at(token, Utc::now().timestamp())
    }

    /// Verify signature, algorithm and time bounds at `now` (Unix seconds)
    pub fn verify_at(&self, token: &str, now: i64) -> Result<JwtPayload, JwtError> {
        let (header, payload) = jwt::decode(token, &self.config.secret)?;

        if header.algorithm != ALGORITHM {
            return Err(JwtError::UnsupportedAlgorithm(header.algorithm));
        }
        payload.check_time_bounds(now)?;

        Ok(payload)
    }

    /// Resolve a token to a user id.
    ///
    /// `Ok(None)` means "no identity": the token failed verification, carries
    /// no `uid`, or carries a non-positive one. Only a `uid` of the wrong shape
    /// is reported as an error.
    pub fn authenticate(&self, token: &str) -> Result<Option<UserId>, JwtError> {
        self.authenticate_at(token, Utc::now().timestamp())
    }

    /// [`Authenticator::authenticate`] at a fixed time
    pub fn authenticate_at(&self, token: &str, now: i64) -> Result<Option<UserId>, JwtError> {
        let payload = match self.verify_at(token, now) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::debug!(error = %e, "Rejected identity token");
                return Ok(None);
            }
        };

        Ok(payload.user_id()?.filter(|id| *id > 0))
    }

    /// Identity token presented with a request, if any
    pub fn token_from_headers<'a>(&self, headers: &'a HeaderMap) -> Option<&'a str> {
        if let Some(token) = headers
            .get(self.config.token_header.as_str())
            .and_then(|v| v.to_str().ok())
            .filter(|t| !t.is_empty())
        {
            return Some(token);
        }

        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .filter(|t| !t.is_empty())
    }

    /// Resolve the identity of a request from its headers
    pub fn authenticate_headers(&self, headers: &HeaderMap) -> Result<Option<UserId>, JwtError> {
        match self.token_from_headers(headers) {
            Some(token) => self.authenticate(token),
            None => Ok(None),
        }
    }
}

/// The authenticated user of the current request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity(pub UserId);

impl Identity {
    /// Authenticated user id
    pub fn user_id(&self) -> UserId {
        self.0
    }

    /// Whether this identity owns a resource
    pub fn owns(&self, owner_id: UserId) -> bool {
        self.0 == owner_id
    }

    /// Fail with [`Forbidden`] unless this identity owns the resource
    pub fn ensure_owner(&self, owner_id: UserId) -> Result<(), Forbidden> {
        if self.owns(owner_id) {
            Ok(())
        } else {
            Err(Forbidden)
        }
    }
}

/// Rejection for requests without an authenticated identity or ownership
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("auth failed")]
pub struct Forbidden;

impl IntoResponse for Forbidden {
    fn into_response(self) -> Response {
        (StatusCode::FORBIDDEN, AUTH_FAILED).into_response()
    }
}

/// Extracts the identity attached by [`gate`]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = Forbidden;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Identity>().copied().ok_or(Forbidden)
    }
}

/// Authentication gate for protected routes
pub async fn gate(
    State(authenticator): State<Authenticator>,
    mut request: Request,
    next: Next,
) -> Response {
    match authenticator.authenticate_headers(request.headers()) {
        Ok(Some(user_id)) => {
            request.extensions_mut().insert(Identity(user_id));
            next.run(request).await
        }
        Ok(None) => Forbidden.into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Identity token carries a malformed claim");
            Forbidden.into_response()
        }
    }
}

/// Put every route of `router` behind [`gate`]
pub fn protect<S>(router: Router<S>, authenticator: Authenticator) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.route_layer(middleware::from_fn_with_state(authenticator, gate))
}
