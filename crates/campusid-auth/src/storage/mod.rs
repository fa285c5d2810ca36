//! Storage traits for authorization data.
//!
//! This module defines the interfaces the flows depend on:
//!
//! - the ephemeral keyed flow store (pending state and codes)
//! - the client registry
//! - the directory-backed identity/claims gatherer
//! - SSO session records
//!
//! # Implementations
//!
//! Storage implementations are provided in separate crates:
//!
//! - `campusid-store-memory` - in-memory backend for tests and single-node
//!   deployments

pub mod client;
pub mod directory;
pub mod flow;
pub mod session;

pub use client::ClientRegistry;
pub use directory::IdentityDirectory;
pub use flow::FlowStore;
pub use session::{SsoSession, SsoSessionStore};

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The backend failed.
    #[error("Backend error: {0}")]
    Backend(String),

    /// A create-only write hit an existing key.
    #[error("Key already exists")]
    AlreadyExists,

    /// Serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input data.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<StorageError> for crate::error::AuthError {
    fn from(err: StorageError) -> Self {
        crate::error::AuthError::storage(err.to_string())
    }
}
