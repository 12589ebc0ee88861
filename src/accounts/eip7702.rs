//! EIP-7702 delegated accounts.
//!
//! The account keeps its EOA address but executes through a delegated
//! implementation contract. The first send for an (owner, chain) pair
//! attaches a signed authorization designating the implementation;
//! subsequent sends omit it. The persisted "delegation recorded" flag is a
//! hint only: when it claims a delegation exists, the on-chain designator is
//! re-checked before an authorization is skipped.

use super::{IAccountExecute, SendOutcome, derive_signer};
use crate::{
    bundler::{BundlerApi, UserOperation},
    chains::ChainDescriptor,
    constants::GAS_ESTIMATE_BUFFER,
    error::{AccountError, ChainError, EngineError},
    provider::{ChainRpc, IERC20, is_delegation_designator},
};
use alloy::{
    consensus::{SignableTransaction, TxEip1559, TxEip7702, TxEnvelope},
    eips::eip7702::{Authorization, SignedAuthorization},
    network::TxSigner,
    primitives::{Address, Bytes, U256},
    rpc::types::TransactionRequest,
    signers::{Signer, local::PrivateKeySigner},
    sol_types::SolCall,
};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Execution-phase gas limit for sponsored delegated sends.
const CALL_GAS_LIMIT: u64 = 250_000;

/// Verification-phase gas limit for sponsored delegated sends.
const VERIFICATION_GAS_LIMIT: u64 = 500_000;

/// Bundler overhead gas.
const PRE_VERIFICATION_GAS: u64 = 100_000;

/// An EIP-7702 delegated EOA.
pub struct DelegatedAccount {
    signer: PrivateKeySigner,
    chain_id: u64,
    delegation: Address,
    entry_point: Option<Address>,
    sponsored: bool,
    delegation_hint: bool,
    rpc: Arc<dyn ChainRpc>,
    bundler: Option<Arc<dyn BundlerApi>>,
}

impl std::fmt::Debug for DelegatedAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelegatedAccount")
            .field("address", &self.signer.address())
            .field("chain_id", &self.chain_id)
            .field("delegation", &self.delegation)
            .field("sponsored", &self.sponsored)
            .finish_non_exhaustive()
    }
}

impl DelegatedAccount {
    /// Derives the delegated account at `index`.
    ///
    /// Refuses to construct when the delegation target has no bytecode on
    /// this network: signing an authorization for a non-existent
    /// implementation is unrecoverable.
    pub async fn derive(
        phrase: &str,
        descriptor: &ChainDescriptor,
        rpc: Arc<dyn ChainRpc>,
        bundler: Option<Arc<dyn BundlerApi>>,
        index: u32,
        delegation_hint: bool,
        sponsored: bool,
    ) -> Result<Self, EngineError> {
        let delegation = descriptor.delegation_contract.ok_or_else(|| {
            ChainError::Misconfigured {
                chain: descriptor.chain_key.clone(),
                reason: "eip7702 account requires delegation_contract".into(),
            }
        })?;
        if sponsored && (bundler.is_none() || descriptor.entry_point.is_none()) {
            return Err(ChainError::Misconfigured {
                chain: descriptor.chain_key.clone(),
                reason: "sponsored eip7702 requires bundler_endpoint and entry_point".into(),
            }
            .into());
        }

        let target_code = rpc.get_code(delegation).await?;
        if target_code.is_empty() {
            return Err(AccountError::DelegationTargetMissing {
                target: delegation,
                chain_id: descriptor.chain_id,
            }
            .into());
        }

        let signer = derive_signer(phrase, index)?;
        Ok(Self {
            signer,
            chain_id: descriptor.chain_id,
            delegation,
            entry_point: descriptor.entry_point,
            sponsored,
            delegation_hint,
            rpc,
            bundler,
        })
    }

    /// The account address (unchanged by delegation).
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Whether sends go through a bundler/paymaster.
    pub fn is_sponsored(&self) -> bool {
        self.sponsored
    }

    /// Native balance of the account.
    pub async fn native_balance(&self) -> Result<U256, EngineError> {
        Ok(self.rpc.native_balance(self.address()).await?)
    }

    /// Whether the next send must attach a delegation authorization.
    ///
    /// A missing record means this is the first send. A present record may
    /// be stale, so the on-chain designator decides.
    pub async fn needs_authorization(&self) -> Result<bool, EngineError> {
        if !self.delegation_hint {
            return Ok(true);
        }
        let code = self.rpc.get_code(self.address()).await?;
        if is_delegation_designator(&code) {
            Ok(false)
        } else {
            warn!(
                address = %self.address(),
                chain_id = self.chain_id,
                "delegation recorded but no designator on-chain; re-attaching authorization"
            );
            Ok(true)
        }
    }

    /// Sends native value.
    pub async fn send_native(&self, to: Address, amount: U256) -> Result<SendOutcome, EngineError> {
        if self.sponsored {
            let call_data =
                IAccountExecute::executeCall { dest: to, value: amount, func: Bytes::new() }
                    .abi_encode()
                    .into();
            self.submit_sponsored(call_data).await
        } else {
            self.submit_direct(to, amount, Bytes::new()).await
        }
    }

    /// Sends an ERC-20 transfer.
    pub async fn send_token(
        &self,
        token: Address,
        to: Address,
        amount: U256,
    ) -> Result<SendOutcome, EngineError> {
        let transfer = IERC20::transferCall { to, amount }.abi_encode();
        if self.sponsored {
            let call_data = IAccountExecute::executeCall {
                dest: token,
                value: U256::ZERO,
                func: transfer.into(),
            }
            .abi_encode()
            .into();
            self.submit_sponsored(call_data).await
        } else {
            self.submit_direct(token, U256::ZERO, transfer.into()).await
        }
    }

    /// Signs a delegation authorization and verifies it recovers to the
    /// account address before anything is submitted.
    async fn build_authorization(
        &self,
        auth_nonce: u64,
    ) -> Result<SignedAuthorization, EngineError> {
        let authorization = Authorization {
            chain_id: U256::from(self.chain_id),
            address: self.delegation,
            nonce: auth_nonce,
        };
        let signature = self
            .signer
            .sign_hash(&authorization.signature_hash())
            .await
            .map_err(|err| eyre::eyre!("authorization signing failed: {err}"))?;

        let recovered =
            signature.recover_address_from_prehash(&authorization.signature_hash()).ok();
        if recovered != Some(self.address()) {
            return Err(AccountError::AuthoritySignerMismatch {
                expected: self.address(),
                recovered,
            }
            .into());
        }
        Ok(authorization.into_signed(signature))
    }

    #[instrument(skip(self, input), fields(from = %self.address(), chain_id = self.chain_id))]
    async fn submit_direct(
        &self,
        to: Address,
        value: U256,
        input: Bytes,
    ) -> Result<SendOutcome, EngineError> {
        let from = self.address();
        let nonce = self.rpc.transaction_count(from).await?;
        let fees = self.rpc.fee_estimate().await?;
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

        let attach = self.needs_authorization().await?;
        let envelope = if attach {
            // Self-submitted type-4: the authorization nonce is validated
            // after the transaction nonce is consumed.
            let authorization = self.build_authorization(nonce + 1).await?;
            let mut tx = TxEip7702 {
                chain_id: self.chain_id,
                nonce,
                gas_limit,
                max_fee_per_gas: fees.max_fee_per_gas,
                max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
                to,
                value,
                input,
                authorization_list: vec![authorization],
                ..Default::default()
            };
            let signature = self
                .signer
                .sign_transaction(&mut tx)
                .await
                .map_err(|err| eyre::eyre!("transaction signing failed: {err}"))?;
            TxEnvelope::Eip7702(tx.into_signed(signature))
        } else {
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
            TxEnvelope::Eip1559(tx.into_signed(signature))
        };

        let hash = self.rpc.broadcast(envelope).await?;
        if attach {
            info!(%hash, address = %from, "delegation authorization attached");
        }
        let mut outcome = SendOutcome::transaction(hash);
        outcome.delegation_attached = attach;
        Ok(outcome)
    }

    #[instrument(skip(self, call_data), fields(sender = %self.address(), chain_id = self.chain_id))]
    async fn submit_sponsored(&self, call_data: Bytes) -> Result<SendOutcome, EngineError> {
        let (Some(bundler), Some(entry_point)) = (self.bundler.as_ref(), self.entry_point)
        else {
            return Err(ChainError::Misconfigured {
                chain: self.chain_id.to_string(),
                reason: "sponsored eip7702 requires bundler_endpoint and entry_point".into(),
            }
            .into());
        };

        let sender = self.address();
        let attach = self.needs_authorization().await?;
        let authorization = if attach {
            // The bundler submits the wrapping transaction, so the
            // authorization uses the account's own nonce unshifted.
            let auth_nonce = self.rpc.transaction_count(sender).await?;
            Some(self.build_authorization(auth_nonce).await?)
        } else {
            None
        };

        let nonce = self.rpc.entry_point_nonce(entry_point, sender).await?;
        let fees = self.rpc.fee_estimate().await?;
        let mut op = UserOperation {
            sender,
            nonce,
            call_data,
            call_gas_limit: U256::from(CALL_GAS_LIMIT),
            verification_gas_limit: U256::from(VERIFICATION_GAS_LIMIT),
            pre_verification_gas: U256::from(PRE_VERIFICATION_GAS),
            max_fee_per_gas: U256::from(fees.max_fee_per_gas),
            max_priority_fee_per_gas: U256::from(fees.max_priority_fee_per_gas),
            eip7702_auth: authorization,
            ..Default::default()
        };

        let sponsorship = bundler.sponsor_user_operation(&op, entry_point).await?;
        op.paymaster = Some(sponsorship.paymaster);
        op.paymaster_data = Some(sponsorship.paymaster_data);
        op.paymaster_verification_gas_limit = Some(sponsorship.paymaster_verification_gas_limit);
        op.paymaster_post_op_gas_limit = Some(sponsorship.paymaster_post_op_gas_limit);

        let hash = op.hash(entry_point, self.chain_id);
        let signature = self
            .signer
            .sign_message(hash.as_slice())
            .await
            .map_err(|err| eyre::eyre!("user operation signing failed: {err}"))?;
        op.signature = signature.as_bytes().into();

        let op_hash = bundler.send_user_operation(&op, entry_point).await?;
        debug!(%op_hash, attach, "submitted sponsored delegated operation");

        let receipt = bundler.poll_receipt(op_hash).await;
        let transaction = receipt.and_then(|receipt| receipt.transaction_hash);
        let mut outcome = SendOutcome::user_operation(op_hash, transaction);
        outcome.delegation_attached = attach;
        Ok(outcome)
    }
}
