//! Balance reconciliation.
//!
//! Affordability is validated against two independently-sourced truths: the
//! indexer (cheap, cached, possibly stale) and the chain itself. The policy
//! is deliberately asymmetric and lazy:
//!
//! 1. the indexer is queried first;
//! 2. if it reports a sufficient balance the send proceeds with no on-chain
//!    call at all — the common case stays fast;
//! 3. if it reports insufficient, the chain is re-checked before rejecting,
//!    so a stale cache can never block a legitimate send. When that re-check
//!    itself fails, the indexer's rejection stands: an unverifiable spend is
//!    never allowed through.
//!
//! Snapshots are recomputed per request and never merged into a stored
//! value.

use crate::{
    cache::{BalanceKey, EngineCaches},
    chains::ChainDescriptor,
    constants::{INDEXER_CALL_TIMEOUT, RPC_CALL_TIMEOUT},
    error::{BalanceError, Dependency, DependencyError, EngineError},
    indexer::IndexerApi,
    provider::ChainRpc,
};
use alloy::primitives::{Address, U256};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

/// Where a balance observation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceSource {
    /// The off-chain indexer.
    Indexer,
    /// The chain RPC.
    OnChain,
}

/// One balance observation from one source.
#[derive(Debug, Clone, Copy)]
pub struct BalanceSnapshot {
    /// The source that produced the observation.
    pub source: BalanceSource,
    /// Observed balance in base units.
    pub amount: U256,
    /// When the observation was made.
    pub as_of: DateTime<Utc>,
}

impl BalanceSnapshot {
    fn now(source: BalanceSource, amount: U256) -> Self {
        Self { source, amount, as_of: Utc::now() }
    }
}

/// Outcome of a successful affordability check.
#[derive(Debug, Clone)]
pub struct BalanceCheck {
    /// The indexer observation.
    pub indexer: BalanceSnapshot,
    /// The on-chain observation, present only when the indexer verdict
    /// required re-checking.
    pub on_chain: Option<BalanceSnapshot>,
}

/// Validates transfer affordability against both balance sources.
#[derive(Debug, Clone)]
pub struct BalanceReconciler {
    indexer: Arc<dyn IndexerApi>,
    caches: Arc<EngineCaches>,
}

impl BalanceReconciler {
    /// Creates a reconciler over the indexer and cache set.
    pub fn new(indexer: Arc<dyn IndexerApi>, caches: Arc<EngineCaches>) -> Self {
        Self { indexer, caches }
    }

    /// Validates that `account` can afford `requested` base units of the
    /// asset.
    ///
    /// Insufficient funds and unverifiable rejections surface as errors so
    /// the orchestrator classifies them; the `Ok` shape carries the
    /// snapshots that justified proceeding.
    #[instrument(skip(self, descriptor, rpc), fields(chain = %descriptor.chain_key))]
    pub async fn validate(
        &self,
        descriptor: &ChainDescriptor,
        rpc: &Arc<dyn ChainRpc>,
        token: Option<Address>,
        account: Address,
        requested: U256,
    ) -> Result<BalanceCheck, EngineError> {
        let indexer_balance = self.indexer_balance(descriptor, token, account).await?;
        let indexer_snapshot = BalanceSnapshot::now(BalanceSource::Indexer, indexer_balance);

        if indexer_balance >= requested {
            debug!(%account, %requested, %indexer_balance, "indexer balance sufficient");
            return Ok(BalanceCheck { indexer: indexer_snapshot, on_chain: None });
        }

        // The indexer may lag the chain; verify against the source of truth
        // before rejecting.
        let on_chain = match timeout(RPC_CALL_TIMEOUT, async {
            match token {
                Some(token) => rpc.erc20_balance(token, account).await,
                None => rpc.native_balance(account).await,
            }
        })
        .await
        {
            Ok(Ok(balance)) => balance,
            Ok(Err(err)) => {
                return Err(BalanceError::Unverifiable {
                    requested,
                    indexer: indexer_balance,
                    rpc_error: err.to_string(),
                }
                .into());
            }
            Err(_) => {
                return Err(BalanceError::Unverifiable {
                    requested,
                    indexer: indexer_balance,
                    rpc_error: "balance query timed out".into(),
                }
                .into());
            }
        };
        let on_chain_snapshot = BalanceSnapshot::now(BalanceSource::OnChain, on_chain);

        if on_chain >= requested {
            metrics::counter!("custodia_stale_indexer_balances").increment(1);
            warn!(
                %account,
                %requested,
                %indexer_balance,
                %on_chain,
                "indexer balance stale; on-chain balance sufficient, proceeding"
            );
            // Refresh the cache with the authoritative value so the next
            // check does not repeat the detour.
            self.caches.balance.insert(
                BalanceKey { chain: descriptor.chain_key.clone(), address: account, token },
                on_chain,
            );
            return Ok(BalanceCheck {
                indexer: indexer_snapshot,
                on_chain: Some(on_chain_snapshot),
            });
        }

        Err(BalanceError::Insufficient { requested, indexer: indexer_balance, on_chain }.into())
    }

    /// Indexer balance read through the TTL cache.
    async fn indexer_balance(
        &self,
        descriptor: &ChainDescriptor,
        token: Option<Address>,
        account: Address,
    ) -> Result<U256, EngineError> {
        let key = BalanceKey { chain: descriptor.chain_key.clone(), address: account, token };
        if let Some(balance) = self.caches.balance.get(&key) {
            return Ok(balance);
        }

        let fetched = timeout(INDEXER_CALL_TIMEOUT, async {
            match token {
                Some(token) => {
                    self.indexer.token_balance(&descriptor.chain_key, account, token).await
                }
                None => self.indexer.native_balance(&descriptor.chain_key, account).await,
            }
        })
        .await
        .map_err(|_| DependencyError::timeout(Dependency::Indexer))??;

        self.caches.balance.insert(key, fetched);
        Ok(fetched)
    }
}
