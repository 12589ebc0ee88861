//! Engine storage api.

use crate::{error::StorageError, vault::EncryptedSeed};
use async_trait::async_trait;
use std::fmt::Debug;

/// Type alias for `Result<T, StorageError>`.
pub type Result<T> = core::result::Result<T, StorageError>;

/// Storage API.
///
/// Everything persisted by the engine is non-secret or vault-encrypted; seed
/// plaintext never crosses this boundary.
#[async_trait]
pub trait StorageApi: Debug + Send + Sync {
    /// Whether the owner has a seed record.
    async fn has_seed(&self, owner: &str) -> Result<bool>;

    /// Reads the owner's encrypted seed record.
    async fn read_seed(&self, owner: &str) -> Result<Option<EncryptedSeed>>;

    /// Writes the owner's encrypted seed record, replacing any previous one
    /// as a whole.
    async fn write_seed(&self, owner: &str, seed: &EncryptedSeed) -> Result<()>;

    /// Whether an EIP-7702 delegation was recorded for (owner, chain).
    ///
    /// The record is a hint: callers re-verify on-chain bytecode when the
    /// answer would gate an authorization.
    async fn delegation_recorded(&self, owner: &str, chain_id: u64) -> Result<bool>;

    /// Records that an EIP-7702 delegation was attached for (owner, chain).
    async fn record_delegation(&self, owner: &str, chain_id: u64) -> Result<()>;

    /// Whether the owner's smart account is known to be deployed on a chain.
    async fn account_deployed(&self, owner: &str, chain_id: u64) -> Result<bool>;

    /// Records that the owner's smart account deployed on a chain.
    async fn record_account_deployed(&self, owner: &str, chain_id: u64) -> Result<()>;
}
