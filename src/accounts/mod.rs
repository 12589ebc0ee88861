//! Account models and factories.
//!
//! The set of account models is fixed by protocol: a plain EOA, an ERC-4337
//! smart account, or an EIP-7702 delegated EOA. [`Account`] is the closed sum
//! over the three, exposing the uniform capability surface the orchestrator
//! dispatches through. Factories derive deterministically from the custodied
//! seed; signer material lives only for the request that derived it.

use crate::{
    constants::EVM_DERIVATION_PATH,
    error::{AccountError, EngineError},
};
use alloy::{
    primitives::{Address, B256, U256},
    signers::{
        k256::ecdsa::SigningKey,
        local::{
            PrivateKeySigner,
            coins_bip39::{English, Mnemonic},
        },
    },
};
use serde::{Deserialize, Serialize};

alloy::sol! {
    /// Minimal execution surface shared by smart accounts and delegation
    /// implementations.
    interface IAccountExecute {
        function execute(address dest, uint256 value, bytes calldata func) external;
    }
}

mod resolver;
pub use resolver::{AccountResolver, Route, SendOverrides};

mod eoa;
pub use eoa::EoaAccount;

mod erc4337;
pub use erc4337::SmartAccount;

mod eip7702;
pub use eip7702::DelegatedAccount;

/// The account abstractions the engine can route a send through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountModel {
    /// Externally-owned account submitting transactions directly.
    Eoa,
    /// ERC-4337 smart account routed through a bundler.
    Erc4337,
    /// EIP-7702 delegated EOA.
    Eip7702,
}

impl std::fmt::Display for AccountModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Eoa => f.write_str("eoa"),
            Self::Erc4337 => f.write_str("erc4337"),
            Self::Eip7702 => f.write_str("eip7702"),
        }
    }
}

/// Derives the signer at `index` from a mnemonic phrase.
///
/// Standard BIP-44 hierarchical derivation: the same phrase and index always
/// yield the same key.
pub fn derive_signer(phrase: &str, index: u32) -> Result<PrivateKeySigner, AccountError> {
    let mnemonic = Mnemonic::<English>::new_from_phrase(phrase)
        .map_err(|err| AccountError::Derivation(err.to_string()))?;
    let path = format!("{EVM_DERIVATION_PATH}{index}");
    let key = mnemonic
        .derive_key(path.as_str(), None)
        .map_err(|err| AccountError::Derivation(err.to_string()))?;
    let key: &SigningKey = key.as_ref();
    Ok(PrivateKeySigner::from_signing_key(key.clone()))
}

/// What a dispatched send produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashKind {
    /// A directly broadcast transaction hash.
    Transaction,
    /// An ERC-4337 user operation hash.
    UserOperation,
}

/// Result of one dispatched transfer.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    /// Transaction hash, or user operation hash for bundler paths.
    pub hash: B256,
    /// What kind of hash this is.
    pub kind: HashKind,
    /// The confirmed transaction hash for a user operation, when receipt
    /// polling observed inclusion before giving up.
    pub transaction: Option<B256>,
    /// Whether an EIP-7702 authorization was attached to this send.
    pub delegation_attached: bool,
    /// Whether smart-account deployment data was attached to this send.
    pub deployment_attached: bool,
}

impl SendOutcome {
    /// A directly broadcast transaction.
    pub fn transaction(hash: B256) -> Self {
        Self {
            hash,
            kind: HashKind::Transaction,
            transaction: None,
            delegation_attached: false,
            deployment_attached: false,
        }
    }

    /// A submitted user operation.
    pub fn user_operation(op_hash: B256, transaction: Option<B256>) -> Self {
        Self {
            hash: op_hash,
            kind: HashKind::UserOperation,
            transaction,
            delegation_attached: false,
            deployment_attached: false,
        }
    }
}

/// A derived account: the closed set of account abstractions.
///
/// Ephemeral and scoped to one request; holds signer material and is never
/// persisted.
#[derive(Debug)]
pub enum Account {
    /// Plain externally-owned account.
    Eoa(EoaAccount),
    /// ERC-4337 smart account.
    Smart(SmartAccount),
    /// EIP-7702 delegated EOA.
    Delegated(DelegatedAccount),
}

impl Account {
    /// The account's on-chain address.
    pub fn address(&self) -> Address {
        match self {
            Self::Eoa(account) => account.address(),
            Self::Smart(account) => account.address(),
            Self::Delegated(account) => account.address(),
        }
    }

    /// The model this account was derived for.
    pub fn model(&self) -> AccountModel {
        match self {
            Self::Eoa(_) => AccountModel::Eoa,
            Self::Smart(_) => AccountModel::Erc4337,
            Self::Delegated(_) => AccountModel::Eip7702,
        }
    }

    /// Native balance of the account.
    pub async fn native_balance(&self) -> Result<U256, EngineError> {
        match self {
            Self::Eoa(account) => account.native_balance().await,
            Self::Smart(account) => account.native_balance().await,
            Self::Delegated(account) => account.native_balance().await,
        }
    }

    /// Sends native value.
    pub async fn send_native(&self, to: Address, amount: U256) -> Result<SendOutcome, EngineError> {
        match self {
            Self::Eoa(account) => account.send_native(to, amount).await,
            Self::Smart(account) => account.send_native(to, amount).await,
            Self::Delegated(account) => account.send_native(to, amount).await,
        }
    }

    /// Sends an ERC-20 token transfer.
    pub async fn send_token(
        &self,
        token: Address,
        to: Address,
        amount: U256,
    ) -> Result<SendOutcome, EngineError> {
        match self {
            Self::Eoa(account) => account.send_token(token, to, amount).await,
            Self::Smart(account) => account.send_token(token, to, amount).await,
            Self::Delegated(account) => account.send_token(token, to, amount).await,
        }
    }
}
