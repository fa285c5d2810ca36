//! Client registry trait.

use async_trait::async_trait;

use super::StorageError;
use crate::types::{Client, ClientKind};

/// Read access to the client registry.
///
/// Registrations are managed out of band; the authorization flows only
/// look clients up. The registry is keyed by (client_id, kind) so a login
/// client can never be addressed as a token client or vice versa.
#[async_trait]
pub trait ClientRegistry: Send + Sync {
    /// Finds a client by id and kind.
    ///
    /// Returns `None` for unknown ids and for ids registered under a
    /// different kind. Disabled clients are returned; rejecting them is
    /// the caller's decision (and audit responsibility).
    async fn find_client(
        &self,
        client_id: &str,
        kind: ClientKind,
    ) -> Result<Option<Client>, StorageError>;
}
