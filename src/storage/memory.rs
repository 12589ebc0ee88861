//! Engine storage implementation in-memory. For testing only.

use super::api::{Result, StorageApi};
use crate::vault::EncryptedSeed;
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};

/// [`StorageApi`] implementation in-memory. Used for testing.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    seeds: DashMap<String, EncryptedSeed>,
    delegations: DashSet<(String, u64)>,
    deployments: DashSet<(String, u64)>,
}

#[async_trait]
impl StorageApi for InMemoryStorage {
    async fn has_seed(&self, owner: &str) -> Result<bool> {
        Ok(self.seeds.contains_key(owner))
    }

    async fn read_seed(&self, owner: &str) -> Result<Option<EncryptedSeed>> {
        Ok(self.seeds.get(owner).map(|seed| (*seed).clone()))
    }

    async fn write_seed(&self, owner: &str, seed: &EncryptedSeed) -> Result<()> {
        self.seeds.insert(owner.to_string(), seed.clone());
        Ok(())
    }

    async fn delegation_recorded(&self, owner: &str, chain_id: u64) -> Result<bool> {
        Ok(self.delegations.contains(&(owner.to_string(), chain_id)))
    }

    async fn record_delegation(&self, owner: &str, chain_id: u64) -> Result<()> {
        self.delegations.insert((owner.to_string(), chain_id));
        Ok(())
    }

    async fn account_deployed(&self, owner: &str, chain_id: u64) -> Result<bool> {
        Ok(self.deployments.contains(&(owner.to_string(), chain_id)))
    }

    async fn record_account_deployed(&self, owner: &str, chain_id: u64) -> Result<()> {
        self.deployments.insert((owner.to_string(), chain_id));
        Ok(())
    }
}
