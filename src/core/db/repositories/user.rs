//! User repository for primary authentication
//!
//! Registers users and resolves a user name and password to a user id.
//! Passwords are stored as bcrypt hashes; everything else about user records is
//! managed elsewhere.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use sqlx::PgPool;

use crate::core::auth::jwt::UserId;

/// Cost factor for bcrypt hashing (12 is recommended for production)
pub const BCRYPT_COST: u32 = 12;

/// User repository error types
#[derive(Debug, thiserror::Error)]
pub enum UserRepositoryError {
    #[error("User not found")]
    NotFound,

    #[error("Invalid password")]
    InvalidPassword,

    #[error("Username already exists")]
    UsernameAlreadyExists,

    #[error("Password hashing failed: {0}")]
    HashingError(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

/// Registers users and checks login credentials
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Register a user with a plain text password (will be hashed)
    async fn create(&self, name: &str, password: &str) -> Result<UserId, UserRepositoryError>;

    /// Resolve `name`/`password` to a user id
    async fn authenticate(&self, name: &str, password: &str)
    -> Result<UserId, UserRepositoryError>;
}

/// Hash a password using bcrypt with automatic salt generation
pub fn hash_password(password: &str, cost: u32) -> Result<String, UserRepositoryError> {
    bcrypt::hash(password, cost).map_err(|e| UserRepositoryError::HashingError(e.to_string()))
}

/// Verify a password against a bcrypt hash
pub fn verify_password(password: &str, hash: &str) -> Result<bool, UserRepositoryError> {
    bcrypt::verify(password, hash).map_err(|e| UserRepositoryError::HashingError(e.to_string()))
}

fn check_password(id: UserId, password: &str, hash: &str) -> Result<UserId, UserRepositoryError> {
    if verify_password(password, hash)? {
        Ok(id)
    } else {
        Err(UserRepositoryError::InvalidPassword)
    }
}

// ============================================================================
// PostgreSQL
// ============================================================================

/// User repository backed by the `users` table
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Create a new user repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for UserRepository {
    async fn create(&self, name: &str, password: &str) -> Result<UserId, UserRepositoryError> {
        let password_hash = hash_password(password, BCRYPT_COST)?;

        let id = sqlx::query_scalar::<_, UserId>(
            r#"
            INSERT INTO users (name, password_hash)
            VALUES ($1, $2)
            ON CONFLICT (name) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(name)
        .bind(&password_hash)
        .fetch_optional(&self.pool)
        .await?;

        id.ok_or(UserRepositoryError::UsernameAlreadyExists)
    }

    async fn authenticate(
        &self,
        name: &str,
        password: &str,
    ) -> Result<UserId, UserRepositoryError> {
        let row = sqlx::query_as::<_, (UserId, String)>(
            r#"
            SELECT id, password_hash
            FROM users
            WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        let (id, password_hash) = row.ok_or(UserRepositoryError::NotFound)?;
        check_password(id, password, &password_hash)
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// In-process user directory for tests and local development
#[derive(Clone)]
pub struct MemoryUserDirectory {
    users: Arc<DashMap<String, (UserId, String)>>,
    next_id: Arc<AtomicI64>,
    cost: u32,
}

impl Default for MemoryUserDirectory {
    fn default() -> Self {
        Self::with_cost(BCRYPT_COST)
    }
}

impl MemoryUserDirectory {
    /// Create an empty directory hashing with `cost`
    pub fn with_cost(cost: u32) -> Self {
        Self {
            users: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicI64::new(1)),
            cost,
        }
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn create(&self, name: &str, password: &str) -> Result<UserId, UserRepositoryError> {
        if self.users.contains_key(name) {
            return Err(UserRepositoryError::UsernameAlreadyExists);
        }
        let password_hash = hash_password(password, self.cost)?;

        match self.users.entry(name.to_string()) {
            Entry::Occupied(_) => Err(UserRepositoryError::UsernameAlreadyExists),
            Entry::Vacant(slot) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                slot.insert((id, password_hash));
                Ok(id)
            }
        }
    }

    async fn authenticate(
        &self,
        name: &str,
        password: &str,
    ) -> Result<UserId, UserRepositoryError> {
        let (id, password_hash) = self
            .users
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or(UserRepositoryError::NotFound)?;

        check_password(id, password, &password_hash)
    }
}
