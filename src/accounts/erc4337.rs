//! ERC-4337 smart accounts.
//!
//! The account address is counterfactual: computed by the factory before any
//! deployment. The first user operation carries the deployment data; every
//! operation flows through the chain's bundler, optionally sponsored by a
//! paymaster.

use super::{IAccountExecute, SendOutcome, derive_signer};
use crate::{
    bundler::{BundlerApi, UserOperation},
    chains::ChainDescriptor,
    error::{ChainError, EngineError},
    provider::{ChainRpc, IAccountFactory, IERC20},
};
use alloy::{
    primitives::{Address, Bytes, U256},
    signers::{Signer, local::PrivateKeySigner},
    sol_types::SolCall,
};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Execution-phase gas limit attached to user operations.
///
/// Bundlers re-simulate before inclusion; these only need to be generous
/// enough to pass their prechecks for a plain transfer.
const CALL_GAS_LIMIT: u64 = 250_000;

/// Verification-phase gas limit for an already-deployed account.
const VERIFICATION_GAS_LIMIT: u64 = 400_000;

/// Verification-phase gas limit when the operation also deploys the account.
const VERIFICATION_GAS_LIMIT_DEPLOY: u64 = 900_000;

/// Bundler overhead gas.
const PRE_VERIFICATION_GAS: u64 = 100_000;

/// An ERC-4337 smart account routed through a bundler.
pub struct SmartAccount {
    owner: PrivateKeySigner,
    address: Address,
    chain_id: u64,
    entry_point: Address,
    factory: Address,
    sponsored: bool,
    deployed_hint: bool,
    rpc: Arc<dyn ChainRpc>,
    bundler: Arc<dyn BundlerApi>,
}

impl std::fmt::Debug for SmartAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmartAccount")
            .field("address", &self.address)
            .field("owner", &self.owner.address())
            .field("chain_id", &self.chain_id)
            .field("sponsored", &self.sponsored)
            .finish_non_exhaustive()
    }
}

impl SmartAccount {
    /// Derives the smart account owned by the signer at `index`.
    ///
    /// `deployed_hint` is the persisted deployment status; it is only ever
    /// trusted in the "deployed" direction, since it is recorded after an
    /// observed successful deployment.
    pub async fn derive(
        phrase: &str,
        descriptor: &ChainDescriptor,
        rpc: Arc<dyn ChainRpc>,
        bundler: Arc<dyn BundlerApi>,
        index: u32,
        deployed_hint: bool,
    ) -> Result<Self, EngineError> {
        let misconfigured = |field: &str| ChainError::Misconfigured {
            chain: descriptor.chain_key.clone(),
            reason: format!("erc4337 account requires {field}"),
        };
        let entry_point = descriptor.entry_point.ok_or_else(|| misconfigured("entry_point"))?;
        let factory = descriptor.account_factory.ok_or_else(|| misconfigured("account_factory"))?;

        let owner = derive_signer(phrase, index)?;
        let address =
            rpc.counterfactual_address(factory, owner.address(), U256::ZERO).await?;
        Ok(Self {
            owner,
            address,
            chain_id: descriptor.chain_id,
            entry_point,
            factory,
            sponsored: descriptor.paymaster_endpoint.is_some(),
            deployed_hint,
            rpc,
            bundler,
        })
    }

    /// The counterfactual account address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Whether operations go through a paymaster.
    pub fn is_sponsored(&self) -> bool {
        self.sponsored
    }

    /// Whether the account contract exists on-chain.
    pub async fn is_deployed(&self) -> Result<bool, EngineError> {
        if self.deployed_hint {
            return Ok(true);
        }
        Ok(!self.rpc.get_code(self.address).await?.is_empty())
    }

    /// Native balance of the account.
    pub async fn native_balance(&self) -> Result<U256, EngineError> {
        Ok(self.rpc.native_balance(self.address).await?)
    }

    /// Sends native value through the bundler.
    pub async fn send_native(&self, to: Address, amount: U256) -> Result<SendOutcome, EngineError> {
        let call_data =
            IAccountExecute::executeCall { dest: to, value: amount, func: Bytes::new() }
                .abi_encode()
                .into();
        self.submit(call_data).await
    }

    /// Sends an ERC-20 transfer through the bundler.
    pub async fn send_token(
        &self,
        token: Address,
        to: Address,
        amount: U256,
    ) -> Result<SendOutcome, EngineError> {
        let transfer = IERC20::transferCall { to, amount }.abi_encode();
        let call_data = IAccountExecute::executeCall {
            dest: token,
            value: U256::ZERO,
            func: transfer.into(),
        }
        .abi_encode()
        .into();
        self.submit(call_data).await
    }

    #[instrument(skip(self, call_data), fields(sender = %self.address, chain_id = self.chain_id))]
    async fn submit(&self, call_data: Bytes) -> Result<SendOutcome, EngineError> {
        let deployed = self.is_deployed().await?;
        let (factory, factory_data) = if deployed {
            (None, None)
        } else {
            let init = IAccountFactory::createAccountCall {
                owner: self.owner.address(),
                salt: U256::ZERO,
            }
            .abi_encode();
            (Some(self.factory), Some(Bytes::from(init)))
        };

        let (nonce, fees) = tokio::try_join!(
            self.rpc.entry_point_nonce(self.entry_point, self.address),
            self.rpc.fee_estimate()
        )?;
        let mut op = UserOperation {
            sender: self.address,
            nonce,
            factory,
            factory_data,
            call_data,
            call_gas_limit: U256::from(CALL_GAS_LIMIT),
            verification_gas_limit: U256::from(if deployed {
                VERIFICATION_GAS_LIMIT
            } else {
                VERIFICATION_GAS_LIMIT_DEPLOY
            }),
            pre_verification_gas: U256::from(PRE_VERIFICATION_GAS),
            max_fee_per_gas: U256::from(fees.max_fee_per_gas),
            max_priority_fee_per_gas: U256::from(fees.max_priority_fee_per_gas),
            ..Default::default()
        };

        if self.sponsored {
            let sponsorship =
                self.bundler.sponsor_user_operation(&op, self.entry_point).await?;
            op.paymaster = Some(sponsorship.paymaster);
            op.paymaster_data = Some(sponsorship.paymaster_data);
            op.paymaster_verification_gas_limit =
                Some(sponsorship.paymaster_verification_gas_limit);
            op.paymaster_post_op_gas_limit = Some(sponsorship.paymaster_post_op_gas_limit);
        }

        let hash = op.hash(self.entry_point, self.chain_id);
        let signature = self
            .owner
            .sign_message(hash.as_slice())
            .await
            .map_err(|err| eyre::eyre!("user operation signing failed: {err}"))?;
        op.signature = signature.as_bytes().into();

        let op_hash = self.bundler.send_user_operation(&op, self.entry_point).await?;
        debug!(%op_hash, deployed, "submitted user operation");

        let receipt = self.bundler.poll_receipt(op_hash).await;
        let transaction = receipt.and_then(|receipt| receipt.transaction_hash);
        let mut outcome = SendOutcome::user_operation(op_hash, transaction);
        outcome.deployment_attached = !deployed;
        Ok(outcome)
    }
}
