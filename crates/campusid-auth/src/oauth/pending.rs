//! Pending authorization state.
//!
//! A [`PendingAuthorization`] is the single record coordinating the
//! multi-redirect login flow. It is created at stage 1 under a fresh
//! random key, mutated as the login frontend reports progress, snapshotted
//! under the authorization code at stage 2, and destroyed at first
//! redemption. Every mutation validates the [`FlowStage`] transition
//! against the recorded stage; requests arriving out of order are rejected
//! instead of trusted.
//!
//! # Security
//!
//! - Keys and codes are cryptographically random (256 bits)
//! - Pending state and codes expire after a short TTL
//! - Codes are single-use (deleted on first redemption attempt)

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{AuthError, AuthResult};
use crate::types::ResolvedIdentity;

/// Where a pending authorization stands in the flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStage {
    /// Stage 1 validation passed; waiting for the login frontend.
    Requested,
    /// The login frontend has picked the request up.
    Authenticating,
    /// Credentials verified; an MFA challenge is outstanding.
    MfaPending,
    /// A code was minted; waiting for redemption.
    CodeIssued,
    /// The code was redeemed. Terminal.
    Exchanged,
}

impl FlowStage {
    /// Returns whether this stage may move to `next`.
    ///
    /// The MFA detour is optional; both `Authenticating → CodeIssued` and
    /// `Authenticating → MfaPending → CodeIssued` are legal.
    #[must_use]
    pub fn can_transition_to(&self, next: FlowStage) -> bool {
        matches!(
            (self, next),
            (Self::Requested, FlowStage::Authenticating)
                | (Self::Authenticating, FlowStage::MfaPending)
                | (Self::Authenticating, FlowStage::CodeIssued)
                | (Self::MfaPending, FlowStage::CodeIssued)
                | (Self::CodeIssued, FlowStage::Exchanged)
        )
    }

    /// Returns the wire name of this stage.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Authenticating => "authenticating",
            Self::MfaPending => "mfa_pending",
            Self::CodeIssued => "code_issued",
            Self::Exchanged => "exchanged",
        }
    }
}

impl std::fmt::Display for FlowStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The coordination record of one authorization-code flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingAuthorization {
    /// Correlation id, carried through every log line of the flow.
    pub request_id: Uuid,

    /// Client that initiated the request.
    pub client_id: String,

    /// Redirect URI recorded at stage 1. The exchange-time value must be
    /// byte-identical.
    pub redirect_uri: String,

    /// Scopes as requested (space-separated).
    pub requested_scopes: String,

    /// Scopes after negotiation (space-separated).
    pub effective_scopes: String,

    /// Whether negotiation reduced the request. Controls the `scope`
    /// parameter on the success redirect.
    pub scopes_reduced: bool,

    /// State parameter from the authorization request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// OpenID Connect nonce for ID token binding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,

    /// Current flow stage.
    pub stage: FlowStage,

    /// Identity resolved by login or session reuse. `None` until then.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<ResolvedIdentity>,

    /// Whether the identity came from an existing SSO session.
    pub had_session: bool,

    /// When the pending authorization was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl PendingAuthorization {
    /// Generates a 256-bit random key, base64url-encoded without padding
    /// (43 characters). Used for both pending-state keys and
    /// authorization codes.
    #[must_use]
    pub fn generate_key() -> String {
        let mut bytes = [0u8; 32];
        rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Moves the record to `next`, validating the transition.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidRequest` if the recorded stage does not
    /// allow the transition; a stale or replayed continuation request
    /// surfaces here.
    pub fn advance_to(&mut self, next: FlowStage) -> AuthResult<()> {
        if !self.stage.can_transition_to(next) {
            return Err(AuthError::invalid_request(format!(
                "flow is in stage '{}', cannot move to '{next}'",
                self.stage
            )));
        }
        self.stage = next;
        Ok(())
    }

    /// Records the resolved identity and moves to `CodeIssued`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidRequest` on an illegal transition.
    pub fn finalize(
        &mut self,
        identity: ResolvedIdentity,
        had_session: bool,
    ) -> AuthResult<()> {
        self.advance_to(FlowStage::CodeIssued)?;
        self.identity = Some(identity);
        self.had_session = had_session;
        Ok(())
    }
}
