//! Scope parsing and negotiation.
//!
//! A requested scope string is reduced to the effective set in two
//! intersections: first against what the client registration allows, then
//! against the global allow-list of the grant family. Login and machine
//! scopes are disjoint families; `openid` is mandatory for login grants
//! and implicitly allowed for every login client.

use crate::config::ScopeConfig;
use crate::error::{AuthError, AuthResult};
use crate::types::Client;

/// An ordered, de-duplicated scope set.
///
/// Preserves request order so the `scope` response parameter echoes the
/// client's own ordering.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScopeSet {
    scopes: Vec<String>,
}

impl ScopeSet {
    /// Parses a space-delimited scope string. Empty input parses to the
    /// empty set; duplicates collapse to their first occurrence.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let mut scopes = Vec::new();
        for scope in raw.split_whitespace() {
            if !scopes.iter().any(|s| s == scope) {
                scopes.push(scope.to_string());
            }
        }
        Self { scopes }
    }

    /// Returns whether the set contains `scope`.
    #[must_use]
    pub fn contains(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }

    /// Returns whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Returns the number of scopes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    /// Returns whether every scope in `self` is also in `other`.
    #[must_use]
    pub fn is_subset_of(&self, other: &ScopeSet) -> bool {
        self.scopes.iter().all(|s| other.contains(s))
    }

    /// Keeps only the scopes for which `keep` returns true.
    #[must_use]
    pub fn retain(&self, keep: impl Fn(&str) -> bool) -> Self {
        Self {
            scopes: self
                .scopes
                .iter()
                .filter(|s| keep(s))
                .cloned()
                .collect(),
        }
    }

    /// Iterates the scopes in request order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.scopes.iter().map(String::as_str)
    }

    /// Joins the set back into a space-delimited string.
    #[must_use]
    pub fn to_scope_string(&self) -> String {
        self.scopes.join(" ")
    }
}

impl std::fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_scope_string())
    }
}

impl From<Vec<String>> for ScopeSet {
    fn from(scopes: Vec<String>) -> Self {
        Self::parse(&scopes.join(" "))
    }
}

/// The grant family a negotiation runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantFamily {
    /// Interactive authorization-code flow. Requires `openid`.
    Login,
    /// Client-credentials flow.
    Machine,
}

/// The outcome of a negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiatedScopes {
    /// The effective scope set.
    pub granted: ScopeSet,

    /// Whether `granted` differs from what was requested. Must surface to
    /// the client per RFC 6749 §3.3.
    pub reduced: bool,
}

/// Reduces requested scope strings to effective sets.
#[derive(Debug, Clone)]
pub struct ScopeNegotiator {
    login: ScopeSet,
    machine: ScopeSet,
}

impl ScopeNegotiator {
    /// Builds a negotiator from the configured global allow-lists.
    #[must_use]
    pub fn new(config: &ScopeConfig) -> Self {
        Self {
            login: ScopeSet::from(config.login.clone()),
            machine: ScopeSet::from(config.machine.clone()),
        }
    }

    /// Returns the global allow-list of a grant family.
    #[must_use]
    pub fn global_scopes(&self, family: GrantFamily) -> &ScopeSet {
        match family {
            GrantFamily::Login => &self.login,
            GrantFamily::Machine => &self.machine,
        }
    }

    /// Negotiates a requested scope string for a client.
    ///
    /// Unknown and unpermitted scopes are dropped silently; the `reduced`
    /// flag reports that the grant shrank. A login grant without `openid`
    /// is rejected outright.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidScope` when a login grant omits `openid`.
    pub fn negotiate(
        &self,
        requested: &str,
        client: &Client,
        family: GrantFamily,
    ) -> AuthResult<NegotiatedScopes> {
        let requested = ScopeSet::parse(requested);

        if family == GrantFamily::Login && !requested.contains("openid") {
            return Err(AuthError::invalid_scope(
                "the openid scope is required for login grants",
            ));
        }

        let global = self.global_scopes(family);
        let granted = requested.retain(|scope| {
            let client_allows = client.allowed_scopes.iter().any(|s| s == scope)
                || (family == GrantFamily::Login && scope == "openid");
            client_allows && global.contains(scope)
        });

        let reduced = granted != requested;
        Ok(NegotiatedScopes { granted, reduced })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AuthType, AuthenticationRecord, Client, ClientKind};
    use uuid::Uuid;

    fn client(allowed: &[&str], kind: ClientKind) -> Client {
        Client {
            client_id: "demo-client".to_string(),
            name: "Demo".to_string(),
            kind,
            redirect_uris: vec!["https://app.example/cb".to_string()],
            allowed_scopes: allowed.iter().map(|s| s.to_string()).collect(),
            firewall: None,
            enabled: true,
            auth_records: vec![AuthenticationRecord {
                id: Uuid::new_v4(),
                auth_type: AuthType::Password,
                secret_hash: Some("$argon2id$stub".to_string()),
                public_key_pem: None,
                jwks: None,
                pinned_kid: None,
                pinned_alg: None,
                not_before: None,
                expires: None,
            }],
        }
    }

    fn negotiator() -> ScopeNegotiator {
        ScopeNegotiator::new(&crate::config::ScopeConfig::default())
    }

    #[test]
    fn test_parse_dedupes_and_keeps_order() {
        let set = ScopeSet::parse("profile openid profile email");
        assert_eq!(set.to_scope_string(), "profile openid email");
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_unchanged_request_not_reduced() {
        let client = client(&["profile"], ClientKind::Login);
        let outcome = negotiator()
            .negotiate("openid profile", &client, GrantFamily::Login)
            .unwrap();
        assert_eq!(outcome.granted.to_scope_string(), "openid profile");
        assert!(!outcome.reduced);
    }

    #[test]
    fn test_unknown_scope_dropped_and_reported() {
        let client = client(&["profile"], ClientKind::Login);
        let outcome = negotiator()
            .negotiate("openid profile unknown_scope", &client, GrantFamily::Login)
            .unwrap();
        assert_eq!(outcome.granted.to_scope_string(), "openid profile");
        assert!(outcome.reduced);
    }

    #[test]
    fn test_missing_openid_rejected_for_login() {
        let client = client(&["profile"], ClientKind::Login);
        let err = negotiator()
            .negotiate("profile", &client, GrantFamily::Login)
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_scope");
    }

    #[test]
    fn test_machine_family_allows_empty_result() {
        let client = client(&["directory:read"], ClientKind::Token);
        let outcome = negotiator()
            .negotiate("devices:manage", &client, GrantFamily::Machine)
            .unwrap();
        assert!(outcome.granted.is_empty());
        assert!(outcome.reduced);
    }

    #[test]
    fn test_machine_scopes_do_not_leak_into_login() {
        let client = client(&["directory:read", "profile"], ClientKind::Login);
        let outcome = negotiator()
            .negotiate("openid profile directory:read", &client, GrantFamily::Login)
            .unwrap();
        assert_eq!(outcome.granted.to_scope_string(), "openid profile");
        assert!(outcome.reduced);
    }

    #[test]
    fn test_subset_law() {
        let client = client(&["profile", "email"], ClientKind::Login);
        let negotiator = negotiator();
        let requested = "openid profile email organisation bogus";
        let outcome = negotiator
            .negotiate(requested, &client, GrantFamily::Login)
            .unwrap();

        let requested_set = ScopeSet::parse(requested);
        assert!(outcome.granted.is_subset_of(&requested_set));
        for scope in outcome.granted.iter() {
            assert!(
                scope == "openid" || client.allowed_scopes.iter().any(|s| s == scope)
            );
            assert!(negotiator.global_scopes(GrantFamily::Login).contains(scope));
        }
    }
}
