use thiserror::Error;

/// Errors raised by the chain capability registry.
#[derive(Debug, Error)]
pub enum ChainError {
    /// The chain key is not present in the registry.
    ///
    /// Unknown keys are rejected outright; a default descriptor would
    /// misroute funds.
    #[error("unsupported chain {0}")]
    Unsupported(String),
    /// A chain entry is internally inconsistent.
    #[error("misconfigured chain {chain}: {reason}")]
    Misconfigured {
        /// The offending chain key.
        chain: String,
        /// What is wrong with the entry.
        reason: String,
    },
}
