//! Directory-backed identity claims gatherer.

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::StorageError;
use crate::scopes::ScopeSet;
use crate::types::{LoginCompletion, ResolvedIdentity};

/// Gathers identity claims from the external directory.
///
/// Called at token-exchange and userinfo time to turn granted scopes into
/// OIDC claims. The directory decides which claims each scope unlocks;
/// this subsystem just merges the result into the ID token and the
/// userinfo response.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    /// Returns the claims unlocked by `scopes` for `identity`.
    ///
    /// The `sub` claim is always written by the caller; implementations
    /// should not include it.
    async fn claims_for_scopes(
        &self,
        identity: &ResolvedIdentity,
        scopes: &ScopeSet,
    ) -> Result<Map<String, Value>, StorageError>;

    /// Returns whether the account behind `identity` is still active.
    ///
    /// Accounts can be locked or queued for removal between login and
    /// exchange; the exchange handler re-checks before issuing tokens.
    async fn is_account_active(&self, identity: &ResolvedIdentity) -> Result<bool, StorageError>;

    /// Consumes the completion the login frontend recorded for a pending
    /// authorization. Returns `None` when login has not finished, and
    /// never returns the same completion twice.
    async fn take_login_completion(
        &self,
        pending_key: &str,
    ) -> Result<Option<LoginCompletion>, StorageError>;
}
