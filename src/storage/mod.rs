//! Engine storage.

mod api;
pub use api::StorageApi;
mod memory;
pub use memory::InMemoryStorage;

use crate::vault::EncryptedSeed;
use async_trait::async_trait;
use std::sync::Arc;

/// Engine storage interface.
#[derive(Debug, Clone)]
pub struct EngineStorage {
    inner: Arc<dyn StorageApi>,
}

impl EngineStorage {
    /// Creates [`EngineStorage`] over any backend.
    pub fn new(inner: Arc<dyn StorageApi>) -> Self {
        Self { inner }
    }

    /// Creates [`EngineStorage`] with an in-memory backend. Used for testing
    /// only.
    pub fn in_memory() -> Self {
        Self { inner: Arc::new(InMemoryStorage::default()) }
    }
}

#[async_trait]
impl StorageApi for EngineStorage {
    async fn has_seed(&self, owner: &str) -> api::Result<bool> {
        self.inner.has_seed(owner).await
    }

    async fn read_seed(&self, owner: &str) -> api::Result<Option<EncryptedSeed>> {
        self.inner.read_seed(owner).await
    }

    async fn write_seed(&self, owner: &str, seed: &EncryptedSeed) -> api::Result<()> {
        self.inner.write_seed(owner, seed).await
    }

    async fn delegation_recorded(&self, owner: &str, chain_id: u64) -> api::Result<bool> {
        self.inner.delegation_recorded(owner, chain_id).await
    }

    async fn record_delegation(&self, owner: &str, chain_id: u64) -> api::Result<()> {
        self.inner.record_delegation(owner, chain_id).await
    }

    async fn account_deployed(&self, owner: &str, chain_id: u64) -> api::Result<bool> {
        self.inner.account_deployed(owner, chain_id).await
    }

    async fn record_account_deployed(&self, owner: &str, chain_id: u64) -> api::Result<()> {
        self.inner.record_account_deployed(owner, chain_id).await
    }
}
