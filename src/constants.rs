//! Engine constants.

use std::time::Duration;

/// BIP-44 derivation path prefix for EVM signers.
///
/// The account index is appended as the last path segment.
pub const EVM_DERIVATION_PATH: &str = "m/44'/60'/0'/0/";

/// Suffix marking a chain key as an ERC-4337 alias of its base chain.
///
/// `base-sepolia-erc4337` resolves accounts on `base-sepolia`, but is pinned
/// to the smart-account model.
pub const ERC4337_ALIAS_SUFFIX: &str = "-erc4337";

/// Number of words in auto-provisioned seed phrases.
pub const SEED_PHRASE_WORDS: usize = 12;

/// Derivation index used for the primary account of each owner.
pub const DEFAULT_ACCOUNT_INDEX: u32 = 0;

/// Attempts made when polling a bundler for a user operation receipt.
pub const RECEIPT_POLL_ATTEMPTS: usize = 3;

/// Fixed delay between user operation receipt polls.
pub const RECEIPT_POLL_DELAY: Duration = Duration::from_secs(2);

/// Upper bound on any single chain RPC call issued by the engine.
pub const RPC_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on any single indexer call issued by the engine.
pub const INDEXER_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on any single bundler or paymaster call.
pub const BUNDLER_CALL_TIMEOUT: Duration = Duration::from_secs(15);

/// Extra buffer added to gas estimates to cover execution overhead.
pub const GAS_ESTIMATE_BUFFER: u64 = 25_000;

/// Default lifetime of cached balances.
pub const DEFAULT_BALANCE_TTL: Duration = Duration::from_secs(120);

/// Default lifetime of cached derived addresses.
pub const DEFAULT_ADDRESS_TTL: Duration = Duration::from_secs(600);

/// Default lifetime of cached token decimals.
///
/// Decimals are immutable in practice, but bounded anyway so a misresolved
/// value cannot stick forever.
pub const DEFAULT_DECIMALS_TTL: Duration = Duration::from_secs(86_400);

/// Default number of sponsored submissions allowed per rate-limit window.
pub const DEFAULT_GASLESS_MAX_PER_WINDOW: u32 = 10;

/// Default sponsored-submission rate-limit window.
pub const DEFAULT_GASLESS_WINDOW: Duration = Duration::from_secs(3_600);

/// Highest token decimal precision the engine accepts.
pub const MAX_TOKEN_DECIMALS: u8 = 36;
