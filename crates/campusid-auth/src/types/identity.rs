//! Identity types consumed from the login frontend and the directory.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// How the interactive login authenticated the user.
///
/// Feeds the `amr` claim of the ID token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// Directory password (optionally followed by an MFA challenge).
    Password,
    /// An upstream federated identity provider.
    Federated,
}

impl AuthMethod {
    /// Returns the `amr` claim value for this method.
    #[must_use]
    pub fn amr_value(&self) -> &'static str {
        match self {
            Self::Password => "pwd",
            Self::Federated => "fed",
        }
    }

    /// Parses an `amr` claim value back into a method.
    #[must_use]
    pub fn from_amr_value(value: &str) -> Option<Self> {
        match value {
            "pwd" => Some(Self::Password),
            "fed" => Some(Self::Federated),
            _ => None,
        }
    }
}

/// The completion contract of the external login/MFA frontend.
///
/// Everything the flow needs from interactive login; how credentials were
/// collected and verified is not this subsystem's concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginCompletion {
    /// Stable subject identifier (`sub` claim).
    pub subject: String,

    /// Directory reference of the account (DN or equivalent).
    pub directory_ref: String,

    /// Organisation the account belongs to.
    pub organisation: String,

    /// How the user authenticated.
    pub method: AuthMethod,

    /// When authentication happened (`auth_time` claim).
    #[serde(with = "time::serde::rfc3339")]
    pub auth_time: OffsetDateTime,

    /// The account is administratively locked.
    pub locked: bool,

    /// The account is queued for deletion.
    pub marked_for_removal: bool,
}

/// An identity accepted into the authorization flow.
///
/// Derived from a [`LoginCompletion`] or a reused SSO session; locked and
/// removal-marked accounts never become a `ResolvedIdentity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedIdentity {
    /// Stable subject identifier.
    pub subject: String,

    /// Directory reference of the account.
    pub directory_ref: String,

    /// Organisation the account belongs to.
    pub organisation: String,

    /// How the user authenticated.
    pub method: AuthMethod,

    /// When authentication happened.
    #[serde(with = "time::serde::rfc3339")]
    pub auth_time: OffsetDateTime,
}

impl ResolvedIdentity {
    /// Builds a resolved identity from an accepted login completion.
    #[must_use]
    pub fn from_completion(completion: &LoginCompletion) -> Self {
        Self {
            subject: completion.subject.clone(),
            directory_ref: completion.directory_ref.clone(),
            organisation: completion.organisation.clone(),
            method: completion.method,
            auth_time: completion.auth_time,
        }
    }
}
