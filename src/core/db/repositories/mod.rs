//! Database repositories
//!
//! Repositories encapsulate data access for the authentication core. Each one
//! is a trait with a PostgreSQL implementation and an in-memory one.

pub mod credential;
pub mod user;

pub use credential::{
    CredentialStore, CredentialStoreError, MemoryCredentialStore, PgCredentialStore,
};
pub use user::{MemoryUserDirectory, UserDirectory, UserRepository, UserRepositoryError};
