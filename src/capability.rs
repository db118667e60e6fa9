//! The capability object other plugins obtain from the host registry.

use std::sync::Arc;

use crate::client::{VaultClient, DEFAULT_CONTEXT_LENGTH};
use crate::error::VaultResult;
use crate::models::{Note, SearchResult};

/// Name the capability is exported under.
pub const CAPABILITY_NAME: &str = "vault-bridge";

/// Upper bound on [`VaultCapability::search`] limits.
pub const MAX_SEARCH_LIMIT: usize = 20;

/// Vault access for other components, delegating to the plugin's client.
#[derive(Clone)]
pub struct VaultCapability {
    client: Arc<VaultClient>,
}

impl VaultCapability {
    pub fn new(client: Arc<VaultClient>) -> Self {
        Self { client }
    }

    /// Search, keeping at most `limit` hits. `limit` is clamped to
    /// `1..=MAX_SEARCH_LIMIT`.
    pub async fn search(&self, query: &str, limit: usize) -> VaultResult<Vec<SearchResult>> {
        let mut hits = self.client.search(query, DEFAULT_CONTEXT_LENGTH).await?;
        hits.truncate(limit.clamp(1, MAX_SEARCH_LIMIT));
        Ok(hits)
    }

    pub async fn read(&self, path: &str) -> VaultResult<Note> {
        self.client.read(path).await
    }

    pub async fn write(&self, path: &str, content: &str) -> VaultResult<()> {
        self.client.write(path, content).await
    }

    pub async fn append(&self, path: &str, content: &str) -> VaultResult<()> {
        self.client.append(path, content).await
    }

    pub async fn list(&self, folder: &str) -> VaultResult<Vec<String>> {
        self.client.list(folder).await
    }

    /// Ping the server now and report whether it answered.
    pub async fn check_connection(&self) -> bool {
        self.client.ping().await
    }

    /// Last known connectivity, without a request.
    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }
}
