//! Fixture identity directory.
//!
//! Accounts are registered with per-scope claim maps; the login frontend
//! is simulated by recording completions keyed by pending request key.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use campusid_auth::scopes::ScopeSet;
use campusid_auth::storage::StorageError;
use campusid_auth::storage::directory::IdentityDirectory;
use campusid_auth::types::{LoginCompletion, ResolvedIdentity};

/// A directory account backing the fixture.
#[derive(Debug, Clone, Default)]
pub struct DirectoryAccount {
    /// Claims unlocked per scope name.
    pub claims_by_scope: HashMap<String, Map<String, Value>>,

    /// Whether the account is active.
    pub active: bool,
}

/// In-memory identity directory.
#[derive(Default)]
pub struct InMemoryDirectory {
    accounts: RwLock<HashMap<String, DirectoryAccount>>,
    completions: RwLock<HashMap<String, LoginCompletion>>,
}

impl InMemoryDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces an account by subject.
    pub async fn upsert_account(&self, subject: &str, account: DirectoryAccount) {
        self.accounts
            .write()
            .await
            .insert(subject.to_string(), account);
    }

    /// Records a login completion for a pending request key, as the
    /// external login frontend would.
    pub async fn record_completion(&self, pending_key: &str, completion: LoginCompletion) {
        self.completions
            .write()
            .await
            .insert(pending_key.to_string(), completion);
    }
}

#[async_trait]
impl IdentityDirectory for InMemoryDirectory {
    async fn claims_for_scopes(
        &self,
        identity: &ResolvedIdentity,
        scopes: &ScopeSet,
    ) -> Result<Map<String, Value>, StorageError> {
        let accounts = self.accounts.read().await;
        let Some(account) = accounts.get(&identity.subject) else {
            return Ok(Map::new());
        };
        let mut merged = Map::new();
        for scope in scopes.iter() {
            if let Some(claims) = account.claims_by_scope.get(scope) {
                for (key, value) in claims {
                    merged.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(merged)
    }

    async fn is_account_active(&self, identity: &ResolvedIdentity) -> Result<bool, StorageError> {
        Ok(self
            .accounts
            .read()
            .await
            .get(&identity.subject)
            .map(|a| a.active)
            .unwrap_or(false))
    }

    async fn take_login_completion(
        &self,
        pending_key: &str,
    ) -> Result<Option<LoginCompletion>, StorageError> {
        Ok(self.completions.write().await.remove(pending_key))
    }
}

#[cfg(test)]
mod tests {
    use campusid_auth::types::AuthMethod;
    use serde_json::json;
    use time::OffsetDateTime;

    use super::*;

    fn identity(subject: &str) -> ResolvedIdentity {
        ResolvedIdentity {
            subject: subject.to_string(),
            directory_ref: format!("uid={subject},ou=people,dc=campus"),
            organisation: "north-campus".to_string(),
            method: AuthMethod::Password,
            auth_time: OffsetDateTime::now_utc(),
        }
    }

    fn account() -> DirectoryAccount {
        let mut claims_by_scope = HashMap::new();
        claims_by_scope.insert(
            "profile".to_string(),
            Map::from_iter([("name".to_string(), json!("Jordan Doe"))]),
        );
        claims_by_scope.insert(
            "email".to_string(),
            Map::from_iter([("email".to_string(), json!("jdoe@campus.example"))]),
        );
        DirectoryAccount {
            claims_by_scope,
            active: true,
        }
    }

    #[tokio::test]
    async fn test_claims_follow_scopes() {
        let directory = InMemoryDirectory::new();
        directory.upsert_account("u-1", account()).await;

        let claims = directory
            .claims_for_scopes(&identity("u-1"), &ScopeSet::parse("openid profile"))
            .await
            .unwrap();
        assert_eq!(claims["name"], "Jordan Doe");
        assert!(!claims.contains_key("email"));
    }

    #[tokio::test]
    async fn test_unknown_account_is_inactive_with_no_claims() {
        let directory = InMemoryDirectory::new();
        assert!(!directory.is_account_active(&identity("ghost")).await.unwrap());
        let claims = directory
            .claims_for_scopes(&identity("ghost"), &ScopeSet::parse("openid profile"))
            .await
            .unwrap();
        assert!(claims.is_empty());
    }

    #[tokio::test]
    async fn test_completion_taken_once() {
        let directory = InMemoryDirectory::new();
        directory
            .record_completion(
                "key-1",
                LoginCompletion {
                    subject: "u-1".to_string(),
                    directory_ref: "uid=u1,ou=people,dc=campus".to_string(),
                    organisation: "north-campus".to_string(),
                    method: AuthMethod::Password,
                    auth_time: OffsetDateTime::now_utc(),
                    locked: false,
                    marked_for_removal: false,
                },
            )
            .await;

        assert!(directory.take_login_completion("key-1").await.unwrap().is_some());
        assert!(directory.take_login_completion("key-1").await.unwrap().is_none());
    }
}
