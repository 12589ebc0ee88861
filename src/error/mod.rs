//! Engine error types.
//!
//! Lower layers raise the typed errors in this module; the orchestrator is
//! the single place that re-wraps them with user-facing text, preserving the
//! original cause. [`EngineError::kind`] maps every error onto the failure
//! taxonomy surfaced to callers.

use alloy::transports::TransportErrorKind;
use thiserror::Error;

mod account;
pub use account::AccountError;

mod asset;
pub use asset::{BalanceError, DecimalsAttempt, DecimalsError};

mod chain;
pub use chain::ChainError;

mod dependency;
pub use dependency::{Dependency, DependencyError};

mod ratelimit;
pub use ratelimit::RateLimitError;

mod storage;
pub use storage::StorageError;

mod validation;
pub use validation::ValidationError;

mod vault;
pub use vault::VaultError;

/// The overarching error type returned by the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Errors from the seed vault.
    #[error(transparent)]
    Vault(#[from] VaultError),
    /// Errors from the chain capability registry.
    #[error(transparent)]
    Chain(#[from] ChainError),
    /// Errors from account resolution and factories.
    #[error(transparent)]
    Account(#[from] AccountError),
    /// Errors from request validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Errors from decimals resolution.
    #[error(transparent)]
    Decimals(#[from] DecimalsError),
    /// Errors from balance reconciliation.
    #[error(transparent)]
    Balance(#[from] BalanceError),
    /// Errors from the gasless rate limiter.
    #[error(transparent)]
    RateLimit(#[from] RateLimitError),
    /// Errors from the storage collaborator.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Errors from an external dependency (indexer, bundler, gateway).
    #[error(transparent)]
    Dependency(#[from] DependencyError),
    /// An error occurred talking to a chain RPC.
    #[error(transparent)]
    Rpc(#[from] alloy::transports::RpcError<TransportErrorKind>),
    /// An internal error occurred.
    #[error(transparent)]
    Internal(#[from] eyre::Error),
}

impl EngineError {
    /// Classifies the error into one of the failure taxonomy buckets.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Vault(err) => match err {
                VaultError::Tampered => FailureKind::Tamper,
                VaultError::MissingKey | VaultError::InvalidKeyLength { .. } => {
                    FailureKind::Configuration
                }
                VaultError::Cipher | VaultError::KeyEncoding(_) => FailureKind::Configuration,
            },
            Self::Chain(_) => FailureKind::Configuration,
            Self::Account(err) => match err {
                AccountError::AliasRequiresErc4337 { .. } => FailureKind::Validation,
                AccountError::DelegationTargetMissing { .. }
                | AccountError::AuthoritySignerMismatch { .. } => FailureKind::ProtocolMismatch,
                AccountError::Derivation(_) => FailureKind::Configuration,
            },
            Self::Validation(_) => FailureKind::Validation,
            Self::Decimals(err) => match err {
                DecimalsError::HintOutOfRange { .. } => FailureKind::Validation,
                DecimalsError::Unresolvable { .. } => FailureKind::UnavailableDependency,
            },
            Self::Balance(_) => FailureKind::InsufficientFunds,
            Self::RateLimit(_) => FailureKind::RateLimited,
            Self::Storage(_) | Self::Dependency(_) | Self::Rpc(_) => {
                FailureKind::UnavailableDependency
            }
            Self::Internal(_) => FailureKind::Unknown,
        }
    }

    /// Whether a caller may reasonably retry the failed request as-is.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind(),
            FailureKind::UnavailableDependency | FailureKind::RateLimited
        )
    }
}

/// Failure taxonomy surfaced to callers.
///
/// Buckets are never collapsed into one generic error: each carries a
/// different retry contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Missing or invalid configuration; never retried.
    Configuration,
    /// Malformed request input; retry after fixing the input.
    Validation,
    /// Both balance sources agree the transfer is unaffordable.
    InsufficientFunds,
    /// A collaborator (RPC, bundler, indexer, storage) was unreachable;
    /// transient, caller may retry.
    UnavailableDependency,
    /// Stored seed material failed authentication; fatal for that record.
    Tamper,
    /// A derivation or configuration bug (signer mismatch, codeless
    /// delegation target); fatal, non-retryable.
    ProtocolMismatch,
    /// The sponsored-path rate limit was hit; retry after the window resets.
    RateLimited,
    /// Unclassified failure; surfaced with dependency context attached.
    Unknown,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Configuration => "configuration",
            Self::Validation => "validation",
            Self::InsufficientFunds => "insufficient funds",
            Self::UnavailableDependency => "unavailable dependency",
            Self::Tamper => "tamper",
            Self::ProtocolMismatch => "protocol mismatch",
            Self::RateLimited => "rate limited",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}
