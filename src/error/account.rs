use alloy::primitives::Address;
use thiserror::Error;

/// Errors raised during account resolution and derivation.
#[derive(Debug, Error)]
pub enum AccountError {
    /// An EOA or EIP-7702 send was requested on an ERC-4337 alias chain.
    #[error(
        "chain {chain} only routes smart-account operations; use the ERC-4337 endpoint instead"
    )]
    AliasRequiresErc4337 {
        /// The alias chain key as requested.
        chain: String,
    },
    /// The EIP-7702 delegation target has no bytecode on this network.
    ///
    /// Signing an authorization for a non-existent target is unrecoverable,
    /// so derivation refuses to proceed.
    #[error("delegation target {target} has no code on chain {chain_id}")]
    DelegationTargetMissing {
        /// Configured delegation contract.
        target: Address,
        /// Chain the check ran against.
        chain_id: u64,
    },
    /// The recovered signer of an EIP-7702 authorization does not match the
    /// account it was derived for.
    ///
    /// Indicates a derivation-index or key-material bug; never submitted.
    #[error("authorization signer mismatch: expected {expected}, recovered {recovered:?}")]
    AuthoritySignerMismatch {
        /// The account address the authorization was built for.
        expected: Address,
        /// The address actually recovered from the signature, if any.
        recovered: Option<Address>,
    },
    /// Hierarchical derivation from the seed phrase failed.
    #[error("signer derivation failed: {0}")]
    Derivation(String),
}
