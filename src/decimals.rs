//! Token decimals resolution.
//!
//! Precision comes from a prioritized fallback chain: the caller's hint, the
//! indexer, then the token contract itself. A default is never substituted
//! for an address-bearing token; if every source fails, the whole send fails
//! with an error naming each attempt. Native transfers never reach this
//! module — their precision is fixed by the chain registry.

use crate::{
    cache::EngineCaches,
    chains::ChainDescriptor,
    constants::{INDEXER_CALL_TIMEOUT, MAX_TOKEN_DECIMALS, RPC_CALL_TIMEOUT},
    error::{DecimalsAttempt, DecimalsError, EngineError},
    indexer::IndexerApi,
    provider::ChainRpc,
};
use alloy::primitives::Address;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, instrument};

/// Resolves token decimal precision.
#[derive(Debug, Clone)]
pub struct DecimalsResolver {
    indexer: Arc<dyn IndexerApi>,
    caches: Arc<EngineCaches>,
}

impl DecimalsResolver {
    /// Creates a resolver over the indexer and cache set.
    pub fn new(indexer: Arc<dyn IndexerApi>, caches: Arc<EngineCaches>) -> Self {
        Self { indexer, caches }
    }

    /// Resolves decimals for `token` on the descriptor's chain.
    ///
    /// A present, valid hint short-circuits without any external call. A
    /// present, out-of-range hint is rejected outright — the caller sent
    /// garbage and silently second-guessing it would hide the bug.
    #[instrument(skip(self, descriptor, rpc), fields(chain = %descriptor.chain_key))]
    pub async fn resolve(
        &self,
        descriptor: &ChainDescriptor,
        rpc: &Arc<dyn ChainRpc>,
        token: Address,
        hint: Option<u32>,
    ) -> Result<u8, EngineError> {
        if let Some(hint) = hint {
            if hint > MAX_TOKEN_DECIMALS as u32 {
                return Err(DecimalsError::HintOutOfRange { got: hint, max: MAX_TOKEN_DECIMALS }
                    .into());
            }
            return Ok(hint as u8);
        }

        let cache_key = (descriptor.chain_id, token);
        if let Some(decimals) = self.caches.decimals.get(&cache_key) {
            return Ok(decimals);
        }

        let mut attempts = vec![DecimalsAttempt {
            source: "caller hint",
            reason: "not supplied".into(),
        }];

        match timeout(
            INDEXER_CALL_TIMEOUT,
            self.indexer.token_decimals(&descriptor.chain_key, token),
        )
        .await
        {
            Ok(Ok(Some(decimals))) if decimals <= MAX_TOKEN_DECIMALS => {
                debug!(%token, decimals, "decimals resolved via indexer");
                self.caches.decimals.insert(cache_key, decimals);
                return Ok(decimals);
            }
            Ok(Ok(Some(decimals))) => attempts.push(DecimalsAttempt {
                source: "indexer",
                reason: format!("returned out-of-range value {decimals}"),
            }),
            Ok(Ok(None)) => attempts.push(DecimalsAttempt {
                source: "indexer",
                reason: "token not tracked".into(),
            }),
            Ok(Err(err)) => {
                attempts.push(DecimalsAttempt { source: "indexer", reason: err.to_string() })
            }
            Err(_) => attempts.push(DecimalsAttempt {
                source: "indexer",
                reason: "request timed out".into(),
            }),
        }

        match timeout(RPC_CALL_TIMEOUT, rpc.erc20_decimals(token)).await {
            Ok(Ok(decimals)) if decimals <= MAX_TOKEN_DECIMALS => {
                debug!(%token, decimals, "decimals resolved via token contract");
                self.caches.decimals.insert(cache_key, decimals);
                return Ok(decimals);
            }
            Ok(Ok(decimals)) => attempts.push(DecimalsAttempt {
                source: "token contract",
                reason: format!("returned out-of-range value {decimals}"),
            }),
            Ok(Err(err)) => attempts
                .push(DecimalsAttempt { source: "token contract", reason: err.to_string() }),
            Err(_) => attempts.push(DecimalsAttempt {
                source: "token contract",
                reason: "request timed out".into(),
            }),
        }

        Err(DecimalsError::Unresolvable { token, attempts }.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::CacheConfig,
        error::{Dependency, DependencyError},
    };
    use alloy::{
        consensus::TxEnvelope,
        eips::eip1559::Eip1559Estimation,
        primitives::{B256, Bytes, U256},
        rpc::types::TransactionRequest,
        transports::{TransportErrorKind, TransportResult},
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct FakeIndexer {
        decimals: Option<u8>,
        fail: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl IndexerApi for FakeIndexer {
        async fn native_balance(
            &self,
            _chain: &str,
            _address: Address,
        ) -> Result<U256, DependencyError> {
            unreachable!("not used in decimals tests")
        }

        async fn token_balance(
            &self,
            _chain: &str,
            _address: Address,
            _token: Address,
        ) -> Result<U256, DependencyError> {
            unreachable!("not used in decimals tests")
        }

        async fn token_decimals(
            &self,
            _chain: &str,
            _token: Address,
        ) -> Result<Option<u8>, DependencyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(DependencyError::new(Dependency::Indexer, "boom"));
            }
            Ok(self.decimals)
        }
    }

    #[derive(Debug, Default)]
    struct FakeRpc {
        decimals: Option<u8>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChainRpc for FakeRpc {
        async fn get_code(&self, _address: Address) -> TransportResult<Bytes> {
            unreachable!()
        }
        async fn native_balance(&self, _address: Address) -> TransportResult<U256> {
            unreachable!()
        }
        async fn erc20_balance(&self, _token: Address, _owner: Address) -> TransportResult<U256> {
            unreachable!()
        }
        async fn erc20_decimals(&self, _token: Address) -> TransportResult<u8> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.decimals
                .ok_or_else(|| TransportErrorKind::custom_str("execution reverted"))
        }
        async fn transaction_count(&self, _address: Address) -> TransportResult<u64> {
            unreachable!()
        }
        async fn estimate_gas(&self, _tx: TransactionRequest) -> TransportResult<u64> {
            unreachable!()
        }
        async fn fee_estimate(&self) -> TransportResult<Eip1559Estimation> {
            unreachable!()
        }
        async fn counterfactual_address(
            &self,
            _factory: Address,
            _owner: Address,
            _salt: U256,
        ) -> TransportResult<Address> {
            unreachable!()
        }
        async fn entry_point_nonce(
            &self,
            _entry_point: Address,
            _sender: Address,
        ) -> TransportResult<U256> {
            unreachable!()
        }
        async fn broadcast(&self, _tx: TxEnvelope) -> TransportResult<B256> {
            unreachable!()
        }
    }

    fn descriptor() -> ChainDescriptor {
        ChainDescriptor {
            chain_key: "base-sepolia".into(),
            chain_id: 84532,
            rpc: url::Url::parse("http://localhost:8545").unwrap(),
            evm: true,
            native_decimals: 18,
            erc4337_enabled: false,
            eip7702_enabled: false,
            bundler_endpoint: None,
            paymaster_endpoint: None,
            entry_point: None,
            account_factory: None,
            delegation_contract: None,
        }
    }

    fn resolver(indexer: FakeIndexer) -> (DecimalsResolver, Arc<FakeIndexer>) {
        let indexer = Arc::new(indexer);
        let caches = Arc::new(EngineCaches::new(&CacheConfig::default()));
        (DecimalsResolver::new(indexer.clone(), caches), indexer)
    }

    #[tokio::test]
    async fn valid_hint_makes_no_external_calls() {
        let (resolver, indexer) = resolver(FakeIndexer::default());
        let rpc = Arc::new(FakeRpc::default());
        let dyn_rpc: Arc<dyn ChainRpc> = rpc.clone();

        let decimals = resolver
            .resolve(&descriptor(), &dyn_rpc, Address::repeat_byte(1), Some(6))
            .await
            .unwrap();
        assert_eq!(decimals, 6);
        assert_eq!(indexer.calls.load(Ordering::SeqCst), 0);
        assert_eq!(rpc.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn out_of_range_hint_is_rejected() {
        let (resolver, _) = resolver(FakeIndexer::default());
        let dyn_rpc: Arc<dyn ChainRpc> = Arc::new(FakeRpc::default());
        let err = resolver
            .resolve(&descriptor(), &dyn_rpc, Address::repeat_byte(1), Some(40))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Decimals(DecimalsError::HintOutOfRange { got: 40, .. })
        ));
    }

    #[tokio::test]
    async fn indexer_failure_falls_through_to_contract() {
        let (resolver, indexer) =
            resolver(FakeIndexer { fail: true, ..Default::default() });
        let rpc = Arc::new(FakeRpc { decimals: Some(8), ..Default::default() });
        let dyn_rpc: Arc<dyn ChainRpc> = rpc.clone();

        let decimals = resolver
            .resolve(&descriptor(), &dyn_rpc, Address::repeat_byte(1), None)
            .await
            .unwrap();
        assert_eq!(decimals, 8);
        assert_eq!(indexer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(rpc.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn all_sources_failing_names_every_attempt() {
        let (resolver, _) = resolver(FakeIndexer { fail: true, ..Default::default() });
        let dyn_rpc: Arc<dyn ChainRpc> = Arc::new(FakeRpc::default());

        let err = resolver
            .resolve(&descriptor(), &dyn_rpc, Address::repeat_byte(1), None)
            .await
            .unwrap_err();
        match err {
            EngineError::Decimals(DecimalsError::Unresolvable { attempts, .. }) => {
                let sources: Vec<_> = attempts.iter().map(|a| a.source).collect();
                assert_eq!(sources, vec!["caller hint", "indexer", "token contract"]);
            }
            other => panic!("expected unresolvable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn successful_lookup_is_cached() {
        let (resolver, indexer) =
            resolver(FakeIndexer { decimals: Some(6), ..Default::default() });
        let dyn_rpc: Arc<dyn ChainRpc> = Arc::new(FakeRpc::default());
        let token = Address::repeat_byte(1);

        for _ in 0..3 {
            let decimals =
                resolver.resolve(&descriptor(), &dyn_rpc, token, None).await.unwrap();
            assert_eq!(decimals, 6);
        }
        assert_eq!(indexer.calls.load(Ordering::SeqCst), 1);
    }
}
