//! Send orchestration.
//!
//! [`SendOrchestrator`] sequences one send request end to end: seed
//! provisioning, amount validation, chain/account resolution, decimals and
//! balance reconciliation, the gasless rate-limit gate, dispatch, and
//! failure classification. It is the only layer that wraps lower-level
//! errors with user-facing text, and it always preserves the original cause.

use crate::{
    accounts::{
        Account, AccountModel, AccountResolver, DelegatedAccount, EoaAccount, Route, SendOutcome,
        SmartAccount,
    },
    amount,
    balance::BalanceReconciler,
    cache::EngineCaches,
    chains::{Chain, ChainRef, ChainRegistry, Chains},
    config::EngineConfig,
    constants::{DEFAULT_ACCOUNT_INDEX, MAX_TOKEN_DECIMALS},
    decimals::DecimalsResolver,
    error::{BalanceError, ChainError, EngineError, FailureKind, ValidationError},
    indexer::{HttpIndexer, IndexerApi},
    ratelimit::{GaslessFlow, GaslessRateLimiter},
    storage::{EngineStorage, StorageApi},
    substrate::SubstrateGateway,
    vault::{SeedCustodian, SeedVault},
};
use alloy::primitives::Address;
use std::sync::Arc;
use tracing::{error, info, instrument};

pub use crate::accounts::SendOverrides;

/// One value-transfer request, validated and consumed once.
///
/// The orchestrator never retries a request that may already have been
/// broadcast; retrying is the caller's decision.
#[derive(Debug, Clone)]
pub struct SendRequest {
    /// Owner whose custodied seed funds the transfer.
    pub owner: String,
    /// Target chain key, possibly carrying an alias suffix.
    pub chain_key: String,
    /// Recipient address in the chain's native format.
    pub recipient: String,
    /// Human-readable decimal amount, e.g. `"0.01"`.
    pub amount: String,
    /// Token contract for ERC-20 transfers; `None` sends the native asset.
    pub token: Option<Address>,
    /// Caller-supplied decimals hint for the token.
    pub token_decimals: Option<u32>,
    /// Routing overrides.
    pub overrides: SendOverrides,
}

/// What kind of hash a send produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptKind {
    /// A directly broadcast transaction.
    Transaction,
    /// An ERC-4337 user operation.
    UserOperation,
    /// A Substrate extrinsic.
    Extrinsic,
}

/// Result of a successfully dispatched send.
#[derive(Debug, Clone)]
pub struct SendReceipt {
    /// Transaction, user-operation or extrinsic hash.
    pub hash: String,
    /// What the hash refers to.
    pub kind: ReceiptKind,
    /// Confirmed transaction hash for a user operation, when known.
    ///
    /// `None` with [`ReceiptKind::UserOperation`] means inclusion was not
    /// observed within the polling budget: status unknown, not failed.
    pub transaction: Option<String>,
    /// The base chain the send executed on.
    pub chain: String,
    /// The account model used, absent for non-EVM sends.
    pub model: Option<AccountModel>,
    /// The sender address.
    pub from: String,
}

/// A classified send failure with the original cause preserved.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct SendError {
    /// Taxonomy bucket.
    pub kind: FailureKind,
    message: String,
    /// The underlying engine error.
    #[source]
    pub cause: EngineError,
}

impl SendError {
    fn classify(cause: EngineError) -> Self {
        let kind = cause.kind();
        let prefix = match kind {
            FailureKind::Configuration => "send rejected by configuration",
            FailureKind::Validation => "invalid send request",
            FailureKind::InsufficientFunds => "insufficient funds",
            FailureKind::UnavailableDependency => "a dependency is temporarily unavailable",
            FailureKind::Tamper => "stored seed material is corrupt",
            FailureKind::ProtocolMismatch => "account protocol error",
            FailureKind::RateLimited => "rate limited",
            FailureKind::Unknown => "send failed",
        };
        Self { kind, message: format!("{prefix}: {cause}"), cause }
    }
}

/// The engine's top-level send pipeline.
///
/// All mutable state (rate-limit buckets, caches) is scoped to the instance;
/// tests construct isolated orchestrators.
#[derive(Debug)]
pub struct SendOrchestrator {
    registry: Arc<ChainRegistry>,
    chains: Chains,
    resolver: AccountResolver,
    custodian: SeedCustodian,
    storage: EngineStorage,
    reconciler: BalanceReconciler,
    decimals: DecimalsResolver,
    limiter: GaslessRateLimiter,
    caches: Arc<EngineCaches>,
    substrate: Option<Arc<dyn SubstrateGateway>>,
}

impl SendOrchestrator {
    /// Builds an orchestrator over explicit collaborators.
    ///
    /// Fails fast on configuration errors: a missing or malformed vault key
    /// or an inconsistent chain table must stop the process before it serves.
    pub fn new(
        config: &EngineConfig,
        chains: Chains,
        storage: EngineStorage,
        indexer: Arc<dyn IndexerApi>,
        substrate: Option<Arc<dyn SubstrateGateway>>,
    ) -> eyre::Result<Self> {
        let registry = Arc::new(ChainRegistry::new(config)?);
        let vault = SeedVault::from_config(&config.secrets)?;
        let caches = Arc::new(EngineCaches::new(&config.cache));
        Ok(Self {
            resolver: AccountResolver::new(registry.clone()),
            registry,
            chains,
            custodian: SeedCustodian::new(vault, storage.clone()),
            storage,
            reconciler: BalanceReconciler::new(indexer.clone(), caches.clone()),
            decimals: DecimalsResolver::new(indexer, caches.clone()),
            limiter: GaslessRateLimiter::new(&config.gasless),
            caches,
            substrate,
        })
    }

    /// Builds an orchestrator with live HTTP collaborators from config.
    pub fn connect(
        config: &EngineConfig,
        storage: EngineStorage,
        substrate: Option<Arc<dyn SubstrateGateway>>,
    ) -> eyre::Result<Self> {
        let registry = ChainRegistry::new(config)?;
        let chains = Chains::connect(&registry);
        let indexer = Arc::new(HttpIndexer::new(
            config.indexer.endpoint.clone(),
            config.indexer.request_timeout,
        ));
        Self::new(config, chains, storage, indexer, substrate)
    }

    /// Sends value per `request`, returning the dispatched hash.
    #[instrument(skip(self, request), fields(owner = %request.owner, chain = %request.chain_key))]
    pub async fn send(&self, request: SendRequest) -> Result<SendReceipt, SendError> {
        self.send_inner(&request).await.map_err(|cause| {
            let classified = SendError::classify(cause);
            error!(
                kind = %classified.kind,
                cause = ?classified.cause,
                "send failed"
            );
            classified
        })
    }

    /// The derived primary address for (owner, chain), read through the
    /// address cache for EVM chains.
    pub async fn account_address(
        &self,
        owner: &str,
        chain_key: &str,
    ) -> Result<String, EngineError> {
        let chain = ChainRef::normalize(chain_key);
        let route = self.resolver.resolve(&chain, &SendOverrides::default())?;
        if matches!(route, Route::NonEvm) {
            let gateway = self
                .substrate
                .as_ref()
                .ok_or_else(|| ChainError::Unsupported(chain.base.clone()))?;
            let phrase = self.custodian.ensure_seed(owner).await?;
            return Ok(gateway.derive_address(&chain.base, &phrase).await?);
        }

        let cache_key = (owner.to_string(), chain.base.clone());
        if let Some(address) = self.caches.address.get(&cache_key) {
            return Ok(address.to_string());
        }
        let phrase = self.custodian.ensure_seed(owner).await?;
        let account = self.derive_account(owner, &chain, route, &phrase, false).await?;
        let address = account.address();
        self.caches.address.insert(cache_key, address);
        Ok(address.to_string())
    }

    /// Drops expired cache entries and rate-limit buckets.
    pub fn sweep(&self) -> usize {
        self.caches.sweep_expired() + self.limiter.sweep_expired()
    }

    /// Spawns the periodic cache maintenance task.
    pub fn spawn_maintenance(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let orchestrator = self.clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(300));
            loop {
                interval.tick().await;
                orchestrator.sweep();
            }
        })
    }

    async fn send_inner(&self, request: &SendRequest) -> Result<SendReceipt, EngineError> {
        // Seed material first: a first-time owner gets one provisioned.
        let phrase = self.custodian.ensure_seed(&request.owner).await?;

        // Fail malformed amounts before any external call; the precise
        // conversion happens after decimals are known.
        amount::to_base_units(&request.amount, MAX_TOKEN_DECIMALS)?;

        let chain = ChainRef::normalize(&request.chain_key);
        let route = self.resolver.resolve(&chain, &request.overrides)?;

        match route {
            Route::NonEvm => self.send_substrate(request, &chain, &phrase).await,
            Route::Evm(model) => self.send_evm(request, &chain, model, &phrase).await,
        }
    }

    async fn send_evm(
        &self,
        request: &SendRequest,
        chain: &ChainRef,
        model: AccountModel,
        phrase: &str,
    ) -> Result<SendReceipt, EngineError> {
        let descriptor = self.registry.descriptor(&chain.base)?.clone();
        let handle = self.chains.get(&chain.base).ok_or_else(|| {
            ChainError::Misconfigured {
                chain: chain.base.clone(),
                reason: "no connection handle for chain".into(),
            }
        })?;

        let recipient: Address = request.recipient.parse().map_err(|_| {
            ValidationError::InvalidRecipient { input: request.recipient.clone() }
        })?;

        let sponsored = self.is_sponsored(request, chain, model, handle);
        let account = self
            .derive_account(&request.owner, chain, Route::Evm(model), phrase, sponsored)
            .await?;
        self.caches
            .address
            .insert((request.owner.clone(), chain.base.clone()), account.address());

        let decimals = match request.token {
            Some(token) => {
                self.decimals
                    .resolve(&descriptor, &handle.rpc, token, request.token_decimals)
                    .await?
            }
            None => descriptor.native_decimals,
        };
        let base_units = amount::to_base_units(&request.amount, decimals)?;

        self.reconciler
            .validate(&descriptor, &handle.rpc, request.token, account.address(), base_units)
            .await?;

        if sponsored {
            let flow = match request.token {
                Some(_) => GaslessFlow::TokenTransfer,
                None => GaslessFlow::NativeTransfer,
            };
            self.limiter.check(&request.owner, &chain.base, flow)?;
        }

        let outcome = match request.token {
            Some(token) => account.send_token(token, recipient, base_units).await?,
            None => account.send_native(recipient, base_units).await?,
        };

        self.record_side_effects(&request.owner, &descriptor.chain_key, descriptor.chain_id, &outcome)
            .await;
        self.caches.invalidate_balances(&chain.base, account.address());

        info!(
            hash = %outcome.hash,
            model = %model,
            chain = %chain.base,
            "send dispatched"
        );
        Ok(SendReceipt {
            hash: outcome.hash.to_string(),
            kind: match outcome.kind {
                crate::accounts::HashKind::Transaction => ReceiptKind::Transaction,
                crate::accounts::HashKind::UserOperation => ReceiptKind::UserOperation,
            },
            transaction: outcome.transaction.map(|hash| hash.to_string()),
            chain: chain.base.clone(),
            model: Some(model),
            from: account.address().to_string(),
        })
    }

    async fn send_substrate(
        &self,
        request: &SendRequest,
        chain: &ChainRef,
        phrase: &str,
    ) -> Result<SendReceipt, EngineError> {
        let gateway = self
            .substrate
            .as_ref()
            .ok_or_else(|| ChainError::Unsupported(chain.base.clone()))?;
        if request.token.is_some() {
            return Err(ValidationError::TokenUnsupported { chain: chain.base.clone() }.into());
        }
        let descriptor = self.registry.descriptor(&chain.base)?;
        let base_units = amount::to_base_units(&request.amount, descriptor.native_decimals)?;

        let from = gateway.derive_address(&chain.base, phrase).await?;
        // The gateway is the only balance source off the EVM; both sides of
        // the reconciliation collapse onto its view.
        let balance = gateway.free_balance(&chain.base, &from).await?;
        if balance < base_units {
            return Err(BalanceError::Insufficient {
                requested: base_units,
                indexer: balance,
                on_chain: balance,
            }
            .into());
        }

        let transfer =
            gateway.transfer(&chain.base, phrase, &request.recipient, base_units).await?;
        info!(hash = %transfer.extrinsic_hash, chain = %chain.base, "substrate send dispatched");
        Ok(SendReceipt {
            hash: transfer.extrinsic_hash,
            kind: ReceiptKind::Extrinsic,
            transaction: None,
            chain: chain.base.clone(),
            model: None,
            from: transfer.from,
        })
    }

    /// Whether this send takes a sponsored (paymaster-backed) path.
    ///
    /// Native sends on EIP-7702-eligible chains are transparently routed to
    /// the gasless path unless the caller bypasses auto-routing; a caller
    /// must never accidentally submit a zero-gas-field direct transaction on
    /// a chain that expects the sponsored flow.
    fn is_sponsored(
        &self,
        request: &SendRequest,
        chain: &ChainRef,
        model: AccountModel,
        handle: &Chain,
    ) -> bool {
        match model {
            AccountModel::Eoa => false,
            AccountModel::Erc4337 => handle.descriptor.paymaster_endpoint.is_some(),
            AccountModel::Eip7702 => {
                !request.overrides.bypass_auto_routing
                    && request.token.is_none()
                    && self.registry.is_eip7702_eligible(&chain.base)
            }
        }
    }

    async fn derive_account(
        &self,
        owner: &str,
        chain: &ChainRef,
        route: Route,
        phrase: &str,
        sponsored: bool,
    ) -> Result<Account, EngineError> {
        let descriptor = self.registry.descriptor(&chain.base)?.clone();
        let handle = self.chains.get(&chain.base).ok_or_else(|| {
            ChainError::Misconfigured {
                chain: chain.base.clone(),
                reason: "no connection handle for chain".into(),
            }
        })?;

        let model = match route {
            Route::Evm(model) => model,
            Route::NonEvm => {
                return Err(ChainError::Misconfigured {
                    chain: chain.base.clone(),
                    reason: "non-evm chains have no derived evm account".into(),
                }
                .into());
            }
        };

        match model {
            AccountModel::Eoa => Ok(Account::Eoa(EoaAccount::derive(
                phrase,
                &descriptor,
                handle.rpc.clone(),
                DEFAULT_ACCOUNT_INDEX,
            )?)),
            AccountModel::Erc4337 => {
                let bundler = handle.bundler.clone().ok_or_else(|| {
                    ChainError::Misconfigured {
                        chain: chain.base.clone(),
                        reason: "erc4337 requires a bundler handle".into(),
                    }
                })?;
                let deployed_hint =
                    self.storage.account_deployed(owner, descriptor.chain_id).await?;
                Ok(Account::Smart(
                    SmartAccount::derive(
                        phrase,
                        &descriptor,
                        handle.rpc.clone(),
                        bundler,
                        DEFAULT_ACCOUNT_INDEX,
                        deployed_hint,
                    )
                    .await?,
                ))
            }
            AccountModel::Eip7702 => {
                let delegation_hint =
                    self.storage.delegation_recorded(owner, descriptor.chain_id).await?;
                Ok(Account::Delegated(
                    DelegatedAccount::derive(
                        phrase,
                        &descriptor,
                        handle.rpc.clone(),
                        handle.bundler.clone(),
                        DEFAULT_ACCOUNT_INDEX,
                        delegation_hint,
                        sponsored,
                    )
                    .await?,
                ))
            }
        }
    }

    /// Persists non-secret side effects of a dispatched send.
    ///
    /// Failures here are logged, not surfaced: the transfer is already
    /// broadcast and must be reported as such.
    async fn record_side_effects(
        &self,
        owner: &str,
        chain_key: &str,
        chain_id: u64,
        outcome: &SendOutcome,
    ) {
        if outcome.delegation_attached {
            if let Err(err) = self.storage.record_delegation(owner, chain_id).await {
                error!(owner, chain_key, %err, "failed to record delegation");
            }
        }
        if outcome.deployment_attached {
            if let Err(err) = self.storage.record_account_deployed(owner, chain_id).await {
                error!(owner, chain_key, %err, "failed to record account deployment");
            }
        }
    }
}
