//! Chain capabilities and connections.
//!
//! [`ChainRegistry`] is the static capability table: which account models a
//! chain supports and the network parameters they need. It is built once from
//! configuration and does no I/O. [`Chains`] holds the live per-chain
//! connection handles.

use crate::{
    bundler::{BundlerApi, HttpBundler},
    config::EngineConfig,
    constants::ERC4337_ALIAS_SUFFIX,
    error::ChainError,
    provider::ChainRpc,
};
use alloy::{primitives::Address, providers::{Provider, ProviderBuilder}};
use std::{collections::HashMap, sync::Arc};
use url::Url;

/// A chain key normalized to its base chain plus the alias fact.
///
/// Chain keys ending in the ERC-4337 alias marker resolve against their base
/// chain, but the alias is retained: alias-only requests must not be silently
/// re-routed to other account models.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChainRef {
    /// The base chain key, alias marker stripped.
    pub base: String,
    /// Whether the original key carried the ERC-4337 alias marker.
    pub erc4337_alias: bool,
}

impl ChainRef {
    /// Normalizes a raw chain key.
    pub fn normalize(chain_key: &str) -> Self {
        match chain_key.strip_suffix(ERC4337_ALIAS_SUFFIX) {
            Some(base) if !base.is_empty() => {
                Self { base: base.to_string(), erc4337_alias: true }
            }
            _ => Self { base: chain_key.to_string(), erc4337_alias: false },
        }
    }
}

impl std::fmt::Display for ChainRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.erc4337_alias {
            write!(f, "{}{ERC4337_ALIAS_SUFFIX}", self.base)
        } else {
            f.write_str(&self.base)
        }
    }
}

/// Capability descriptor for a single chain.
#[derive(Debug, Clone)]
pub struct ChainDescriptor {
    /// The chain key this descriptor was registered under.
    pub chain_key: String,
    /// Numeric chain ID.
    pub chain_id: u64,
    /// JSON-RPC endpoint.
    pub rpc: Url,
    /// Whether this is an EVM chain.
    pub evm: bool,
    /// Decimal precision of the native asset.
    pub native_decimals: u8,
    /// Whether ERC-4337 smart accounts are enabled.
    pub erc4337_enabled: bool,
    /// Whether EIP-7702 delegated accounts are enabled.
    pub eip7702_enabled: bool,
    /// Bundler endpoint, present when a smart-account model is enabled.
    pub bundler_endpoint: Option<Url>,
    /// Paymaster endpoint for sponsored operations.
    pub paymaster_endpoint: Option<Url>,
    /// ERC-4337 entry point contract.
    pub entry_point: Option<Address>,
    /// Smart-account factory contract.
    pub account_factory: Option<Address>,
    /// EIP-7702 delegation implementation contract.
    pub delegation_contract: Option<Address>,
}

impl ChainDescriptor {
    /// The chain as known to the wider ecosystem, for display and log fields.
    pub fn chain(&self) -> alloy_chains::Chain {
        alloy_chains::Chain::from(self.chain_id)
    }
}

/// Static, read-only capability table for all configured chains.
#[derive(Debug, Default, Clone)]
pub struct ChainRegistry {
    descriptors: HashMap<String, ChainDescriptor>,
    eip7702_eligible: std::collections::BTreeSet<String>,
    erc4337_eligible: std::collections::BTreeSet<String>,
}

impl ChainRegistry {
    /// Builds and validates the registry from configuration.
    ///
    /// Misconfigured entries fail construction: a chain claiming an account
    /// model without the parameters to use it would otherwise fail at send
    /// time, after funds routing decisions were already made.
    pub fn new(config: &EngineConfig) -> Result<Self, ChainError> {
        let mut descriptors = HashMap::with_capacity(config.chains.len());
        for (key, chain) in &config.chains {
            let misconfigured = |reason: &str| ChainError::Misconfigured {
                chain: key.clone(),
                reason: reason.to_string(),
            };
            if key.ends_with(ERC4337_ALIAS_SUFFIX) {
                return Err(misconfigured("chain keys must be registered without the alias suffix"));
            }
            if chain.erc4337_enabled {
                if !chain.evm {
                    return Err(misconfigured("erc4337 requires an evm chain"));
                }
                if chain.bundler_endpoint.is_none()
                    || chain.entry_point.is_none()
                    || chain.account_factory.is_none()
                {
                    return Err(misconfigured(
                        "erc4337 requires bundler_endpoint, entry_point and account_factory",
                    ));
                }
            }
            if chain.eip7702_enabled {
                if !chain.evm {
                    return Err(misconfigured("eip7702 requires an evm chain"));
                }
                if chain.delegation_contract.is_none() {
                    return Err(misconfigured("eip7702 requires delegation_contract"));
                }
                if chain.bundler_endpoint.is_none() || chain.entry_point.is_none() {
                    return Err(misconfigured(
                        "eip7702 sponsorship requires bundler_endpoint and entry_point",
                    ));
                }
            }
            descriptors.insert(
                key.clone(),
                ChainDescriptor {
                    chain_key: key.clone(),
                    chain_id: chain.chain_id,
                    rpc: chain.rpc.clone(),
                    evm: chain.evm,
                    native_decimals: chain.native_decimals,
                    erc4337_enabled: chain.erc4337_enabled,
                    eip7702_enabled: chain.eip7702_enabled,
                    bundler_endpoint: chain.bundler_endpoint.clone(),
                    paymaster_endpoint: chain.paymaster_endpoint.clone(),
                    entry_point: chain.entry_point,
                    account_factory: chain.account_factory,
                    delegation_contract: chain.delegation_contract,
                },
            );
        }

        for (set, flag) in [
            (&config.eligibility.eip7702, "eip7702"),
            (&config.eligibility.erc4337, "erc4337"),
        ] {
            for key in set {
                let descriptor = descriptors.get(key).ok_or_else(|| ChainError::Misconfigured {
                    chain: key.clone(),
                    reason: format!("{flag}-eligible chain is not configured"),
                })?;
                let enabled = match flag {
                    "eip7702" => descriptor.eip7702_enabled,
                    _ => descriptor.erc4337_enabled,
                };
                if !enabled {
                    return Err(ChainError::Misconfigured {
                        chain: key.clone(),
                        reason: format!("{flag}-eligible chain does not have {flag} enabled"),
                    });
                }
            }
        }

        Ok(Self {
            descriptors,
            eip7702_eligible: config.eligibility.eip7702.iter().cloned().collect(),
            erc4337_eligible: config.eligibility.erc4337.iter().cloned().collect(),
        })
    }

    /// Looks up the descriptor for a base chain key.
    pub fn descriptor(&self, base_key: &str) -> Result<&ChainDescriptor, ChainError> {
        self.descriptors.get(base_key).ok_or_else(|| ChainError::Unsupported(base_key.to_string()))
    }

    /// Whether ERC-4337 smart accounts are enabled for the chain.
    pub fn is_erc4337_enabled(&self, base_key: &str) -> bool {
        self.descriptors.get(base_key).is_some_and(|d| d.erc4337_enabled)
    }

    /// Whether EIP-7702 delegated accounts are enabled for the chain.
    pub fn is_eip7702_enabled(&self, base_key: &str) -> bool {
        self.descriptors.get(base_key).is_some_and(|d| d.eip7702_enabled)
    }

    /// Whether the chain is in the EIP-7702 auto-routing set.
    pub fn is_eip7702_eligible(&self, base_key: &str) -> bool {
        self.eip7702_eligible.contains(base_key)
    }

    /// Whether the chain is in the ERC-4337 auto-routing set.
    pub fn is_erc4337_eligible(&self, base_key: &str) -> bool {
        self.erc4337_eligible.contains(base_key)
    }

    /// Iterator over all configured base chain keys.
    pub fn chain_keys(&self) -> impl Iterator<Item = &str> {
        self.descriptors.keys().map(String::as_str)
    }

    /// Iterator over all descriptors.
    pub fn descriptors(&self) -> impl Iterator<Item = &ChainDescriptor> {
        self.descriptors.values()
    }
}

/// Live connection handles for a single chain.
#[derive(Clone)]
pub struct Chain {
    /// Capability descriptor.
    pub descriptor: ChainDescriptor,
    /// JSON-RPC handle.
    pub rpc: Arc<dyn ChainRpc>,
    /// Bundler handle, when a smart-account model is enabled.
    pub bundler: Option<Arc<dyn BundlerApi>>,
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("descriptor", &self.descriptor)
            .field("bundler", &self.descriptor.bundler_endpoint)
            .finish()
    }
}

/// Connection handles for all configured EVM chains.
#[derive(Debug, Default, Clone)]
pub struct Chains {
    chains: HashMap<String, Chain>,
}

impl Chains {
    /// Connects a handle for every EVM chain in the registry.
    ///
    /// Non-EVM chains have no RPC handle here; they are served entirely by
    /// the Substrate gateway.
    pub fn connect(registry: &ChainRegistry) -> Self {
        let mut chains = HashMap::new();
        for descriptor in registry.descriptors() {
            let descriptor = descriptor.clone();
            if !descriptor.evm {
                continue;
            }
            let provider = ProviderBuilder::new().connect_http(descriptor.rpc.clone()).erased();
            let bundler = descriptor
                .bundler_endpoint
                .clone()
                .map(|endpoint| {
                    Arc::new(HttpBundler::new(endpoint, descriptor.paymaster_endpoint.clone()))
                        as Arc<dyn BundlerApi>
                });
            chains.insert(
                descriptor.chain_key.clone(),
                Chain { descriptor, rpc: Arc::new(provider), bundler },
            );
        }
        Self { chains }
    }

    /// Registers a handle explicitly. Used for tests and custom transports.
    pub fn with_chain(mut self, key: impl Into<String>, chain: Chain) -> Self {
        self.chains.insert(key.into(), chain);
        self
    }

    /// Handle for a base chain key.
    pub fn get(&self, base_key: &str) -> Option<&Chain> {
        self.chains.get(base_key)
    }
}
