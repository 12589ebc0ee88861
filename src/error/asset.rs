use alloy::primitives::{Address, U256};
use thiserror::Error;

/// One failed attempt at resolving token decimals.
#[derive(Debug, Clone)]
pub struct DecimalsAttempt {
    /// The source that was tried.
    pub source: &'static str,
    /// Why it did not produce a usable value.
    pub reason: String,
}

/// Errors raised by the decimals resolver.
#[derive(Debug, Error)]
pub enum DecimalsError {
    /// The caller-supplied decimals hint is outside the accepted range.
    #[error("token decimals hint {got} is out of range (0..={max})")]
    HintOutOfRange {
        /// The hint as supplied.
        got: u32,
        /// Highest accepted precision.
        max: u8,
    },
    /// Every resolution source failed.
    ///
    /// A default is never substituted for an address-bearing token: a wrong
    /// guess directly causes an under- or over-transfer.
    #[error("cannot determine decimals for token {token}: {}", format_attempts(attempts))]
    Unresolvable {
        /// The token whose precision could not be determined.
        token: Address,
        /// Every attempted source with its failure.
        attempts: Vec<DecimalsAttempt>,
    },
}

fn format_attempts(attempts: &[DecimalsAttempt]) -> String {
    attempts
        .iter()
        .map(|a| format!("{} failed ({})", a.source, a.reason))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors raised by the balance reconciler.
#[derive(Debug, Error)]
pub enum BalanceError {
    /// Both balance sources agree the transfer is unaffordable.
    #[error(
        "insufficient funds: requested {requested}, indexer reports {indexer}, chain reports {on_chain}"
    )]
    Insufficient {
        /// The requested amount in base units.
        requested: U256,
        /// The indexer-reported balance in base units.
        indexer: U256,
        /// The on-chain balance in base units.
        on_chain: U256,
    },
    /// The indexer reported an insufficient balance and the on-chain
    /// re-check could not run.
    ///
    /// The indexer verdict stands; an unverifiable spend is never allowed
    /// through.
    #[error(
        "insufficient funds per indexer ({indexer} < {requested}); on-chain verification failed: {rpc_error}"
    )]
    Unverifiable {
        /// The requested amount in base units.
        requested: U256,
        /// The indexer-reported balance in base units.
        indexer: U256,
        /// The RPC failure that prevented verification.
        rpc_error: String,
    },
}
