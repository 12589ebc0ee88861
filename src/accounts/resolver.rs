//! Account-model resolution.
//!
//! One normalization pass turns the raw chain key into a base chain plus the
//! alias fact, then a fixed priority order picks the account model. The first
//! matching rule wins; nothing falls through silently.

use super::AccountModel;
use crate::{
    chains::{ChainRef, ChainRegistry},
    error::{AccountError, EngineError},
};
use std::sync::Arc;
use tracing::debug;

/// Per-request routing overrides.
#[derive(Debug, Default, Clone, Copy)]
pub struct SendOverrides {
    /// Force the ERC-4337 path regardless of registry flags.
    pub force_erc4337: bool,
    /// Force the EIP-7702 path.
    pub force_eip7702: bool,
    /// Skip transparent gasless auto-routing.
    pub bypass_auto_routing: bool,
}

/// Where a send gets dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// An EVM account of the given model.
    Evm(AccountModel),
    /// The non-EVM (Substrate) account path.
    NonEvm,
}

/// Picks the account model for a normalized chain reference.
#[derive(Debug, Clone)]
pub struct AccountResolver {
    registry: Arc<ChainRegistry>,
}

impl AccountResolver {
    /// Creates a resolver over the capability registry.
    pub fn new(registry: Arc<ChainRegistry>) -> Self {
        Self { registry }
    }

    /// Resolves the route for a chain reference, first match wins:
    ///
    /// 1. `force_erc4337` override (bypasses registry flags)
    /// 2. `force_eip7702` override
    /// 3. ERC-4337 alias chains
    /// 4. EIP-7702 enabled and eligible
    /// 5. ERC-4337 enabled and eligible
    /// 6. EVM chains default to EOA
    /// 7. everything else delegates to the non-EVM path
    ///
    /// Alias-only chains never re-route: anything that would resolve away
    /// from ERC-4337 on them is rejected instead.
    pub fn resolve(
        &self,
        chain: &ChainRef,
        overrides: &SendOverrides,
    ) -> Result<Route, EngineError> {
        // The base chain must be known before any routing decision.
        let descriptor = self.registry.descriptor(&chain.base)?;

        if overrides.force_erc4337 {
            debug!(chain = %chain, "forcing erc4337 route");
            return Ok(Route::Evm(AccountModel::Erc4337));
        }
        if overrides.force_eip7702 {
            if chain.erc4337_alias {
                return Err(AccountError::AliasRequiresErc4337 {
                    chain: chain.to_string(),
                }
                .into());
            }
            debug!(chain = %chain, "forcing eip7702 route");
            return Ok(Route::Evm(AccountModel::Eip7702));
        }
        if chain.erc4337_alias {
            return Ok(Route::Evm(AccountModel::Erc4337));
        }
        if self.registry.is_eip7702_enabled(&chain.base)
            && self.registry.is_eip7702_eligible(&chain.base)
        {
            return Ok(Route::Evm(AccountModel::Eip7702));
        }
        if self.registry.is_erc4337_enabled(&chain.base)
            && self.registry.is_erc4337_eligible(&chain.base)
        {
            return Ok(Route::Evm(AccountModel::Erc4337));
        }
        if descriptor.evm {
            return Ok(Route::Evm(AccountModel::Eoa));
        }
        Ok(Route::NonEvm)
    }
}
