//! Auth API endpoints
//!
//! Provides the HTTP surface of the dual-token scheme:
//! - POST /register/submit - Register a new user
//! - POST /login/submit - Check credentials, issue a session
//! - POST /token - Exchange the refresh credential for the identity token
//! - POST /logout - Invalidate the refresh credential
//! - GET /whoami - Authenticated user id (behind the gate)

use axum::{
    Form, Json, Router,
    extract::{State, rejection::FormRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::auth::config::REFRESH_COOKIE;
use crate::core::auth::jwt::UserId;
use crate::core::auth::middleware::{Authenticator, Identity, protect};
use crate::core::auth::service::{SessionError, SessionService};
use crate::core::db::repositories::{UserDirectory, UserRepositoryError};

/// Auth API state
#[derive(Clone)]
pub struct AuthApiState {
    pub sessions: SessionService,
    pub users: Arc<dyn UserDirectory>,
    pub authenticator: Authenticator,
}

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub code: String,
}

impl ApiError {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
        }
    }
}

/// Convert SessionError to API response
impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        let code = match &self {
            SessionError::Issue(_) => "TOKEN_ERROR",
            SessionError::Store(_) => "STORE_ERROR",
        };

        let body = ApiError::new(self.to_string(), code);

        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

/// Login and registration form
#[derive(Debug, Default, Deserialize)]
pub struct CredentialsForm {
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub pass: String,
}

/// Refresh exchange and logout form
#[derive(Debug, Default, Deserialize)]
pub struct RefreshForm {
    #[serde(default)]
    pub refresh_token: String,
}

/// Login response body
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub code: u8,
    pub msg: String,
    pub uid: UserId,
    pub token: String,
}

/// Registration response body
#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub code: u8,
    pub msg: String,
}

/// Login failures, each with a stable numeric code
#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error("must indicate user name")]
    MissingUser,

    #[error("must indicate password")]
    MissingPassword,

    #[error("user not exist")]
    UnknownUser,

    #[error("incorrect password")]
    WrongPassword,

    #[error("generate token failed")]
    Session(#[from] SessionError),

    #[error("user lookup failed")]
    Directory(#[source] UserRepositoryError),
}

impl From<UserRepositoryError> for LoginError {
    fn from(err: UserRepositoryError) -> Self {
        match err {
            UserRepositoryError::NotFound => LoginError::UnknownUser,
            UserRepositoryError::InvalidPassword => LoginError::WrongPassword,
            other => LoginError::Directory(other),
        }
    }
}

impl LoginError {
    /// Numeric code reported in the response body
    pub fn code(&self) -> u8 {
        match self {
            LoginError::MissingUser => 1,
            LoginError::MissingPassword => 2,
            LoginError::UnknownUser => 3,
            LoginError::WrongPassword => 4,
            LoginError::Session(_) | LoginError::Directory(_) => 5,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            LoginError::MissingUser | LoginError::MissingPassword => StatusCode::BAD_REQUEST,
            LoginError::UnknownUser | LoginError::WrongPassword => StatusCode::FORBIDDEN,
            LoginError::Session(_) | LoginError::Directory(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for LoginError {
    fn into_response(self) -> Response {
        let body = LoginResponse {
            code: self.code(),
            msg: self.to_string(),
            uid: 0,
            token: String::new(),
        };

        (self.status(), Json(body)).into_response()
    }
}

/// Registration failures
#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    #[error("must indicate user name")]
    MissingUser,

    #[error("must indicate password")]
    MissingPassword,

    #[error("user already exist")]
    UsernameTaken,

    #[error("create user failed")]
    Directory(#[source] UserRepositoryError),
}

impl From<UserRepositoryError> for RegisterError {
    fn from(err: UserRepositoryError) -> Self {
        match err {
            UserRepositoryError::UsernameAlreadyExists => RegisterError::UsernameTaken,
            other => RegisterError::Directory(other),
        }
    }
}

impl RegisterError {
    /// Numeric code reported in the response body
    pub fn code(&self) -> u8 {
        match self {
            RegisterError::MissingUser => 1,
            RegisterError::MissingPassword => 2,
            RegisterError::UsernameTaken => 3,
            RegisterError::Directory(_) => 4,
        }
    }
}

impl IntoResponse for RegisterError {
    fn into_response(self) -> Response {
        let status = match &self {
            RegisterError::MissingUser | RegisterError::MissingPassword => StatusCode::BAD_REQUEST,
            RegisterError::UsernameTaken => StatusCode::CONFLICT,
            RegisterError::Directory(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = RegisterResponse {
            code: self.code(),
            msg: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

/// Response for logout
#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub message: String,
}

/// Response for `GET /whoami`
#[derive(Debug, Serialize, Deserialize)]
pub struct WhoAmIResponse {
    pub uid: UserId,
}

/// Cookie carrying a refresh credential
pub fn refresh_cookie(credential: String, max_age_secs: i64) -> Cookie<'static> {
    Cookie::build((REFRESH_COOKIE, credential))
        .path("/")
        .http_only(true)
        .max_age(time::Duration::seconds(max_age_secs))
        .build()
}

/// Refresh credential from the form field, falling back to the cookie
fn presented_credential(
    jar: &CookieJar,
    form: Result<Form<RefreshForm>, FormRejection>,
) -> String {
    let from_form = form.map(|Form(f)| f.refresh_token).unwrap_or_default();
    if !from_form.is_empty() {
        return from_form;
    }

    jar.get(REFRESH_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .unwrap_or_default()
}

/// Create the auth API router
pub fn auth_api_router(state: AuthApiState) -> Router {
    let authenticator = state.authenticator.clone();
    let state = Arc::new(state);

    let protected = protect(
        Router::new().route("/whoami", get(whoami_handler)),
        authenticator,
    );

    Router::new()
        .route("/register/submit", post(register_handler))
        .route("/login/submit", post(login_handler))
        .route("/token", post(token_handler))
        .route("/logout", post(logout_handler))
        .merge(protected)
        .with_state(state)
}

/// POST /register/submit
/// Register a new user
async fn register_handler(
    State(state): State<Arc<AuthApiState>>,
    form: Result<Form<CredentialsForm>, FormRejection>,
) -> Result<Json<RegisterResponse>, RegisterError> {
    let form = form.map(|Form(f)| f).unwrap_or_default();

    if form.user.is_empty() {
        return Err(RegisterError::MissingUser);
    }
    if form.pass.is_empty() {
        return Err(RegisterError::MissingPassword);
    }

    let uid = state
        .users
        .create(&form.user, &form.pass)
        .await
        .inspect_err(|e| tracing::info!("Registration failed for user {}: {}", form.user, e))?;

    tracing::info!(uid, "User registered successfully: {}", form.user);

    Ok(Json(RegisterResponse {
        code: 0,
        msg: "success".to_string(),
    }))
}

/// POST /login/submit
/// Check credentials and issue a session
async fn login_handler(
    State(state): State<Arc<AuthApiState>>,
    jar: CookieJar,
    form: Result<Form<CredentialsForm>, FormRejection>,
) -> Result<(CookieJar, Json<LoginResponse>), LoginError> {
    let form = form.map(|Form(f)| f).unwrap_or_default();

    if form.user.is_empty() {
        return Err(LoginError::MissingUser);
    }
    if form.pass.is_empty() {
        return Err(LoginError::MissingPassword);
    }

    let uid = state
        .users
        .authenticate(&form.user, &form.pass)
        .await
        .inspect_err(|e| tracing::info!("Login failed for user {}: {}", form.user, e))?;

    let session = state.sessions.issue(uid).await?;

    tracing::info!(uid, "User logged in successfully: {}", form.user);

    let jar = jar.add(refresh_cookie(
        session.refresh_credential,
        session.refresh_max_age,
    ));
    let body = LoginResponse {
        code: 0,
        msg: "success".to_string(),
        uid,
        token: session.identity_token,
    };

    Ok((jar, Json(body)))
}

/// POST /token
/// Identity token for the presented refresh credential, empty when unknown
async fn token_handler(
    State(state): State<Arc<AuthApiState>>,
    jar: CookieJar,
    form: Result<Form<RefreshForm>, FormRejection>,
) -> Result<String, SessionError> {
    let credential = presented_credential(&jar, form);

    let token = state.sessions.exchange(&credential).await?;
    if token.is_none() {
        tracing::debug!("Refresh credential unknown or expired");
    }

    Ok(token.unwrap_or_default())
}

/// POST /logout
/// Invalidate the refresh credential and clear its cookie
async fn logout_handler(
    State(state): State<Arc<AuthApiState>>,
    jar: CookieJar,
    form: Result<Form<RefreshForm>, FormRejection>,
) -> Result<(CookieJar, Json<LogoutResponse>), SessionError> {
    let credential = presented_credential(&jar, form);

    let removed = state.sessions.invalidate(&credential).await?;
    tracing::info!(removed, "Logout request");

    let jar = jar.remove(Cookie::build(REFRESH_COOKIE).path("/"));
    let body = LogoutResponse {
        message: "Logged out successfully".to_string(),
    };

    Ok((jar, Json(body)))
}

/// GET /whoami
/// Authenticated user id
async fn whoami_handler(identity: Identity) -> Json<WhoAmIResponse> {
    Json(WhoAmIResponse {
        uid: identity.user_id(),
    })
}
