//! In-memory client registry.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use campusid_auth::storage::StorageError;
use campusid_auth::storage::client::ClientRegistry;
use campusid_auth::types::{Client, ClientKind};

/// Client registrations held in memory.
#[derive(Default)]
pub struct InMemoryClientRegistry {
    clients: RwLock<HashMap<String, Client>>,
}

impl InMemoryClientRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces a client.
    pub async fn upsert(&self, client: Client) {
        self.clients
            .write()
            .await
            .insert(client.client_id.clone(), client);
    }

    /// Removes a client. Idempotent.
    pub async fn remove(&self, client_id: &str) {
        self.clients.write().await.remove(client_id);
    }
}

#[async_trait]
impl ClientRegistry for InMemoryClientRegistry {
    async fn find_client(
        &self,
        client_id: &str,
        kind: ClientKind,
    ) -> Result<Option<Client>, StorageError> {
        Ok(self
            .clients
            .read()
            .await
            .get(client_id)
            .filter(|c| c.kind == kind)
            .cloned())
    }
}
