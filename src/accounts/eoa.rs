//! Externally-owned accounts.

use super::{SendOutcome, derive_signer};
use crate::{
    chains::ChainDescriptor,
    constants::GAS_ESTIMATE_BUFFER,
    error::EngineError,
    provider::{ChainRpc, IERC20},
};
use alloy::{
    consensus::{SignableTransaction, TxEip1559, TxEnvelope},
    network::TxSigner,
    primitives::{Address, Bytes, U256},
    rpc::types::TransactionRequest,
    signers::local::PrivateKeySigner,
    sol_types::SolCall,
};
use std::sync::Arc;
use tracing::{debug, instrument};

/// A plain key-pair-controlled account submitting transactions directly.
pub struct EoaAccount {
    signer: PrivateKeySigner,
    chain_id: u64,
    rpc: Arc<dyn ChainRpc>,
}

impl std::fmt::Debug for EoaAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EoaAccount")
            .field("signer", &self.signer)
            .field("chain_id", &self.chain_id)
            .finish_non_exhaustive()
    }
}

impl EoaAccount {
    /// Derives the account at `index` from a seed phrase.
    pub fn derive(
        phrase: &str,
        descriptor: &ChainDescriptor,
        rpc: Arc<dyn ChainRpc>,
        index: u32,
    ) -> Result<Self, EngineError> {
        let signer = derive_signer(phrase, index)?;
        Ok(Self { signer, chain_id: descriptor.chain_id, rpc })
    }

    /// The account address.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Native balance of the account.
    pub async fn native_balance(&self) -> Result<U256, EngineError> {
        Ok(self.rpc.native_balance(self.address()).await?)
    }

    /// Sends native value directly.
    pub async fn send_native(&self, to: Address, amount: U256) -> Result<SendOutcome, EngineError> {
        self.submit(to, amount, Bytes::new()).await
    }

    /// Sends an ERC-20 transfer directly.
    pub async fn send_token(
        &self,
        token: Address,
        to: Address,
        amount: U256,
    ) -> Result<SendOutcome, EngineError> {
        let input: Bytes = IERC20::transferCall { to, amount }.abi_encode().into();
        self.submit(token, U256::ZERO, input).await
    }

    #[instrument(skip(self, input), fields(from = %self.address(), chain_id = self.chain_id))]
    async fn submit(
        &self,
        to: Address,
        value: U256,
        input: Bytes,
    ) -> Result<SendOutcome, EngineError> {
        let from = self.address();
        let (nonce, fees) = tokio::try_join!(
            self.rpc.transaction_count(from),
            self.rpc.fee_estimate()
        )?;
        let gas_limit = self
            .rpc
            .estimate_gas(
                TransactionRequest::default()
                    .from(from)
                    .to(to)
                    .value(value)
                    .input(input.clone().into()),
            )
            .await?
            + GAS_ESTIMATE_BUFFER;

        let mut tx = TxEip1559 {
            chain_id: self.chain_id,
            nonce,
            gas_limit,
            max_fee_per_gas: fees.max_fee_per_gas,
            max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
            to: to.into(),
            value,
            input,
            ..Default::default()
        };
        let signature = self
            .signer
            .sign_transaction(&mut tx)
            .await
            .map_err(|err| eyre::eyre!("transaction signing failed: {err}"))?;
        let envelope = TxEnvelope::Eip1559(tx.into_signed(signature));

        let hash = self.rpc.broadcast(envelope).await?;
        debug!(%hash, "broadcast eoa transaction");
        Ok(SendOutcome::transaction(hash))
    }
}
