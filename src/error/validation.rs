use thiserror::Error;

/// Errors raised by request validation, before any external call is made.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The amount string is not a positive, finite decimal.
    #[error("invalid amount {input:?}: {reason}")]
    InvalidAmount {
        /// The amount as supplied by the caller.
        input: String,
        /// Why it was rejected.
        reason: String,
    },
    /// The recipient address could not be parsed for the target chain.
    #[error("invalid recipient address {input:?}")]
    InvalidRecipient {
        /// The recipient as supplied by the caller.
        input: String,
    },
    /// A token transfer was requested on a chain without token support.
    #[error("token transfers are not supported on chain {chain}")]
    TokenUnsupported {
        /// The chain the request named.
        chain: String,
    },
}
