//! Substrate gateway collaborator.
//!
//! Non-EVM chains are served by an external gateway that owns connection
//! pooling, SS58 addressing and extrinsic construction. The engine hands it
//! the decrypted phrase for exactly the duration of one call and treats
//! everything behind this trait as an assumed-correct collaborator.

use crate::error::DependencyError;
use alloy::primitives::U256;
use async_trait::async_trait;
use std::fmt::Debug;

/// A completed Substrate transfer.
#[derive(Debug, Clone)]
pub struct SubstrateTransfer {
    /// Hash of the submitted extrinsic.
    pub extrinsic_hash: String,
    /// SS58 address the transfer was sent from.
    pub from: String,
}

/// The non-EVM account path at its interface boundary.
#[async_trait]
pub trait SubstrateGateway: Debug + Send + Sync {
    /// Derives the SS58 address for a seed phrase on `chain`.
    async fn derive_address(&self, chain: &str, phrase: &str) -> Result<String, DependencyError>;

    /// Free balance of `address` on `chain`, in base units.
    async fn free_balance(&self, chain: &str, address: &str) -> Result<U256, DependencyError>;

    /// Submits a balance transfer, returning the extrinsic hash.
    async fn transfer(
        &self,
        chain: &str,
        phrase: &str,
        to: &str,
        amount: U256,
    ) -> Result<SubstrateTransfer, DependencyError>;
}
