//! Authentication module
//!
//! This module provides the dual-token scheme:
//! - Signed identity tokens (HS256, JWT wire format)
//! - Opaque refresh credentials backed by a TTL credential store
//! - Request authentication middleware for protected routes
//! - REST API endpoints for login, refresh and logout

pub mod api;
pub mod config;
pub mod credential;
pub mod jwt;
pub mod middleware;
pub mod service;

pub use api::{AuthApiState, auth_api_router};
pub use config::{AuthConfig, AuthConfigError};
pub use jwt::{JwtError, JwtHeader, JwtPayload, UserId};
pub use middleware::{Authenticator, Forbidden, Identity, gate, protect};
pub use service::{IssuedSession, SessionError, SessionService};
