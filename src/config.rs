//! Engine configuration.

use crate::constants::{
    DEFAULT_ADDRESS_TTL, DEFAULT_BALANCE_TTL, DEFAULT_DECIMALS_TTL, DEFAULT_GASLESS_MAX_PER_WINDOW,
    DEFAULT_GASLESS_WINDOW, INDEXER_CALL_TIMEOUT,
};
use alloy::primitives::Address;
use eyre::Context;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeSet, HashMap},
    path::Path,
    time::Duration,
};
use tracing::info;
use url::Url;

/// Engine configuration.
///
/// Loaded once at process start; the capability registry built from it is
/// read-only thereafter.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Chain configurations, keyed by chain key.
    pub chains: HashMap<String, ChainConfig>,
    /// Chains eligible for automatic sponsored routing.
    #[serde(default)]
    pub eligibility: EligibilityConfig,
    /// Balance/portfolio indexer collaborator.
    pub indexer: IndexerConfig,
    /// Sponsored-path rate limiting.
    #[serde(default)]
    pub gasless: GaslessConfig,
    /// In-process cache lifetimes.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Secrets.
    #[serde(skip_serializing, default)]
    pub secrets: SecretsConfig,
}

impl EngineConfig {
    /// Loads the configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read config at {}", path.display()))?;
        serde_yaml::from_str(&raw).wrap_err("failed to parse config")
    }

    /// Loads the configuration, writing a default file when none exists.
    pub fn load_or_init(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            let config = Self::default();
            std::fs::write(path, serde_yaml::to_string(&config)?)
                .wrap_err_with(|| format!("failed to write default config to {}", path.display()))?;
            info!(path = %path.display(), "wrote default config");
            return Ok(config);
        }
        Self::load(path)
    }

    /// Adds a chain configuration.
    pub fn with_chain(mut self, key: impl Into<String>, chain: ChainConfig) -> Self {
        self.chains.insert(key.into(), chain);
        self
    }

    /// Marks a chain as eligible for automatic EIP-7702 routing.
    pub fn with_eip7702_eligible(mut self, key: impl Into<String>) -> Self {
        self.eligibility.eip7702.insert(key.into());
        self
    }

    /// Marks a chain as eligible for automatic ERC-4337 routing.
    pub fn with_erc4337_eligible(mut self, key: impl Into<String>) -> Self {
        self.eligibility.erc4337.insert(key.into());
        self
    }

    /// Sets the seed vault master key (base64 of 32 raw bytes).
    pub fn with_seed_master_key(mut self, key: impl Into<String>) -> Self {
        self.secrets.seed_master_key = Some(key.into());
        self
    }

    /// Sets the sponsored-path rate limit.
    pub fn with_gasless_limit(mut self, max_per_window: u32, window: Duration) -> Self {
        self.gasless = GaslessConfig { max_per_window, window };
        self
    }

    /// Sets the indexer endpoint.
    pub fn with_indexer_endpoint(mut self, endpoint: Url) -> Self {
        self.indexer.endpoint = endpoint;
        self
    }

    /// Sets the cached-balance lifetime.
    pub fn with_balance_ttl(mut self, ttl: Duration) -> Self {
        self.cache.balance_ttl = ttl;
        self
    }
}

/// Configuration for a single chain.
///
/// Field presence is validated against the enabled account models when the
/// capability registry is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Numeric chain ID (EVM) or network discriminator (Substrate).
    pub chain_id: u64,
    /// JSON-RPC endpoint for the chain.
    pub rpc: Url,
    /// Whether this is an EVM chain. Non-EVM chains route to the Substrate
    /// gateway.
    #[serde(default = "default_true")]
    pub evm: bool,
    /// Decimal precision of the native asset.
    #[serde(default = "default_native_decimals")]
    pub native_decimals: u8,
    /// Whether ERC-4337 smart accounts are enabled on this chain.
    #[serde(default)]
    pub erc4337_enabled: bool,
    /// Whether EIP-7702 delegated accounts are enabled on this chain.
    #[serde(default)]
    pub eip7702_enabled: bool,
    /// Bundler endpoint for user-operation submission.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundler_endpoint: Option<Url>,
    /// Paymaster endpoint for sponsored operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_endpoint: Option<Url>,
    /// ERC-4337 entry point contract.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_point: Option<Address>,
    /// Smart-account factory contract.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_factory: Option<Address>,
    /// EIP-7702 delegation implementation contract.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegation_contract: Option<Address>,
}

/// Chains eligible for automatic sponsored routing.
///
/// An account model being enabled on a chain makes it usable via overrides;
/// eligibility additionally opts the chain into automatic selection.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct EligibilityConfig {
    /// Chains auto-routed to EIP-7702 delegated accounts.
    #[serde(default)]
    pub eip7702: BTreeSet<String>,
    /// Chains auto-routed to ERC-4337 smart accounts.
    #[serde(default)]
    pub erc4337: BTreeSet<String>,
}

/// Balance/portfolio indexer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// Base endpoint of the indexer API.
    pub endpoint: Url,
    /// Upper bound on a single indexer request.
    #[serde(default = "default_indexer_timeout")]
    pub request_timeout: Duration,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            endpoint: Url::parse("http://localhost:4000").expect("static url"),
            request_timeout: INDEXER_CALL_TIMEOUT,
        }
    }
}

/// Sponsored-path rate limiting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaslessConfig {
    /// Sponsored submissions allowed per window and (owner, chain, flow) key.
    pub max_per_window: u32,
    /// Fixed window length.
    pub window: Duration,
}

impl Default for GaslessConfig {
    fn default() -> Self {
        Self { max_per_window: DEFAULT_GASLESS_MAX_PER_WINDOW, window: DEFAULT_GASLESS_WINDOW }
    }
}

/// In-process cache lifetimes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Lifetime of cached balances.
    pub balance_ttl: Duration,
    /// Lifetime of cached derived addresses.
    pub address_ttl: Duration,
    /// Lifetime of cached token decimals.
    pub decimals_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            balance_ttl: DEFAULT_BALANCE_TTL,
            address_ttl: DEFAULT_ADDRESS_TTL,
            decimals_ttl: DEFAULT_DECIMALS_TTL,
        }
    }
}

/// Secrets.
///
/// Deserialized from the environment-provided config but never serialized
/// back out.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct SecretsConfig {
    /// Base64-encoded 32-byte master key for the seed vault.
    pub seed_master_key: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_native_decimals() -> u8 {
    18
}

fn default_indexer_timeout() -> Duration {
    INDEXER_CALL_TIMEOUT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_config_defaults() {
        let yaml = r#"
chain_id: 84532
rpc: "https://sepolia.base.org"
"#;
        let chain: ChainConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(chain.evm);
        assert_eq!(chain.native_decimals, 18);
        assert!(!chain.erc4337_enabled);
        assert!(!chain.eip7702_enabled);
        assert!(chain.bundler_endpoint.is_none());
    }

    #[test]
    fn secrets_never_serialized() {
        let config = EngineConfig::default().with_seed_master_key("c2VjcmV0");
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(!yaml.contains("c2VjcmV0"));
        assert!(!yaml.contains("seed_master_key"));
    }

    #[test]
    fn full_config_round_trips() {
        let yaml = r#"
chains:
  base-sepolia:
    chain_id: 84532
    rpc: "https://sepolia.base.org"
    eip7702_enabled: true
    erc4337_enabled: true
    bundler_endpoint: "https://bundler.example"
    entry_point: "0x0000000071727De22E5E9d8BAf0edAc6f37da032"
    account_factory: "0x9406Cc6185a346906296840746125a0E44976454"
    delegation_contract: "0x654F42b74885EE6803F403f077bc0409f1066c58"
eligibility:
  eip7702: ["base-sepolia"]
indexer:
  endpoint: "http://indexer.internal:4000"
"#;
        let config: EngineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.chains.len(), 1);
        assert!(config.eligibility.eip7702.contains("base-sepolia"));
        assert_eq!(config.gasless.max_per_window, DEFAULT_GASLESS_MAX_PER_WINDOW);
        let chain = &config.chains["base-sepolia"];
        assert!(chain.eip7702_enabled && chain.erc4337_enabled);
        assert!(chain.entry_point.is_some());
    }
}
