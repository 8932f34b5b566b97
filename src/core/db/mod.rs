//! Persistence for the authentication core
//!
//! Connection pooling plus the credential store and user repositories.

pub mod pool;
pub mod repositories;

pub use pool::{DbConfig, DbError, create_pool};
pub use repositories::{
    CredentialStore, CredentialStoreError, MemoryCredentialStore, MemoryUserDirectory,
    PgCredentialStore, UserDirectory, UserRepository, UserRepositoryError,
};
