//! Authentication configuration
//!
//! Holds the shared signing secret and the lifetimes of both halves of the
//! dual-token scheme. The refresh TTL is the single source of truth: the
//! identity token lifetime is always `refresh_ttl + access_grace`, so a signed
//! token never expires before the store entry that hands it out.

use std::time::Duration;

/// Default refresh credential lifetime (7 days)
const REFRESH_TOKEN_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Default extra lifetime of the identity token past the refresh window (24 hours)
const ACCESS_TOKEN_GRACE_SECS: u64 = 24 * 60 * 60;

/// Default header carrying the identity token
pub const DEFAULT_TOKEN_HEADER: &str = "auth_token";

/// Cookie carrying the refresh credential
pub const REFRESH_COOKIE: &str = "refresh_token";

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum AuthConfigError {
    #[error("JWT_SECRET environment variable not set")]
    MissingSecret,

    #[error("JWT_SECRET must not be empty")]
    EmptySecret,

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

/// Authentication configuration
#[derive(Clone)]
pub struct AuthConfig {
    /// Shared HMAC secret
    pub secret: String,
    /// Token issuer (`iss`)
    pub issuer: String,
    /// Token audience (`aud`)
    pub audience: String,
    /// Lifetime of a credential store entry
    pub refresh_ttl: Duration,
    /// How long the identity token outlives the refresh window
    pub access_grace: Duration,
    /// Request header read by the authenticator
    pub token_header: String,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("access_grace", &self.access_grace)
            .field("token_header", &self.token_header)
            .finish()
    }
}

impl AuthConfig {
    /// Create a configuration with default lifetimes
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            issuer: "blog".to_string(),
            audience: "blog".to_string(),
            refresh_ttl: Duration::from_secs(REFRESH_TOKEN_TTL_SECS),
            access_grace: Duration::from_secs(ACCESS_TOKEN_GRACE_SECS),
            token_header: DEFAULT_TOKEN_HEADER.to_string(),
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AuthConfigError> {
        let secret = std::env::var("JWT_SECRET").map_err(|_| AuthConfigError::MissingSecret)?;
        if secret.is_empty() {
            return Err(AuthConfigError::EmptySecret);
        }

        let mut config = Self::new(secret);

        if let Ok(issuer) = std::env::var("JWT_ISSUER") {
            config.issuer = issuer;
        }
        if let Ok(audience) = std::env::var("JWT_AUDIENCE") {
            config.audience = audience;
        }
        if let Some(secs) = env_secs("REFRESH_TOKEN_TTL_SECS")? {
            config.refresh_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = env_secs("ACCESS_TOKEN_GRACE_SECS")? {
            config.access_grace = Duration::from_secs(secs);
        }
        if let Ok(header) = std::env::var("AUTH_TOKEN_HEADER") {
            config.token_header = header.to_ascii_lowercase();
        }

        Ok(config)
    }

    /// Set issuer
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    /// Set audience
    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = audience.into();
        self
    }

    /// Set refresh credential lifetime
    pub fn refresh_ttl(mut self, ttl: Duration) -> Self {
        self.refresh_ttl = ttl;
        self
    }

    /// Set how long identity tokens outlive the refresh window
    pub fn access_grace(mut self, grace: Duration) -> Self {
        self.access_grace = grace;
        self
    }

    /// Set the header the authenticator reads
    pub fn token_header(mut self, header: impl Into<String>) -> Self {
        self.token_header = header.into().to_ascii_lowercase();
        self
    }

    /// Identity token lifetime, derived from the refresh TTL
    pub fn access_lifetime(&self) -> Duration {
        self.refresh_ttl.saturating_add(self.access_grace)
    }

    /// Refresh cookie max-age in seconds
    pub fn refresh_max_age_secs(&self) -> i64 {
        i64::try_from(self.refresh_ttl.as_secs()).unwrap_or(i64::MAX)
    }
}

fn env_secs(name: &'static str) -> Result<Option<u64>, AuthConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| AuthConfigError::InvalidValue { name, value }),
        Err(_) => Ok(None),
    }
}
