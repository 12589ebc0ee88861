//! End-to-end send scenarios against fake collaborators.

use alloy::{
    consensus::{Transaction, TxEnvelope},
    eips::eip1559::Eip1559Estimation,
    primitives::{Address, B256, Bytes, U256},
    rpc::types::TransactionRequest,
    sol_types::SolCall,
    transports::{TransportErrorKind, TransportResult},
};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use custodia::{
    bundler::{BundlerApi, SponsorshipData, UserOperation, UserOperationReceipt},
    chains::{Chain, ChainRegistry, Chains},
    config::{ChainConfig, EngineConfig},
    error::{DependencyError, FailureKind},
    indexer::IndexerApi,
    orchestrator::{ReceiptKind, SendOrchestrator, SendOverrides, SendRequest},
    provider::{ChainRpc, IERC20},
    storage::{EngineStorage, StorageApi},
    substrate::{SubstrateGateway, SubstrateTransfer},
    vault::EncryptedSeed,
};
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};
use url::Url;

const DELEGATION: Address = Address::repeat_byte(0x42);
const ENTRY_POINT: Address = Address::repeat_byte(0x07);
const FACTORY: Address = Address::repeat_byte(0x09);
const TOKEN: Address = Address::repeat_byte(0x77);
const RECIPIENT: &str = "0x00000000000000000000000000000000000000aa";

#[derive(Debug)]
struct FakeRpc {
    code: Mutex<HashMap<Address, Bytes>>,
    native_balance: U256,
    token_balance: U256,
    broadcasts: Mutex<Vec<TxEnvelope>>,
    decimals_calls: AtomicUsize,
}

impl Default for FakeRpc {
    fn default() -> Self {
        Self {
            code: Mutex::new(HashMap::new()),
            native_balance: U256::from(10u64).pow(U256::from(20)),
            token_balance: U256::from(10u64).pow(U256::from(12)),
            broadcasts: Mutex::new(Vec::new()),
            decimals_calls: AtomicUsize::new(0),
        }
    }
}

impl FakeRpc {
    fn with_code(self, address: Address, code: Bytes) -> Self {
        self.code.lock().unwrap().insert(address, code);
        self
    }

    fn set_code(&self, address: Address, code: Bytes) {
        self.code.lock().unwrap().insert(address, code);
    }
}

#[async_trait]
impl ChainRpc for FakeRpc {
    async fn get_code(&self, address: Address) -> TransportResult<Bytes> {
        Ok(self.code.lock().unwrap().get(&address).cloned().unwrap_or_default())
    }
    async fn native_balance(&self, _address: Address) -> TransportResult<U256> {
        Ok(self.native_balance)
    }
    async fn erc20_balance(&self, _token: Address, _owner: Address) -> TransportResult<U256> {
        Ok(self.token_balance)
    }
    async fn erc20_decimals(&self, _token: Address) -> TransportResult<u8> {
        self.decimals_calls.fetch_add(1, Ordering::SeqCst);
        Ok(18)
    }
    async fn transaction_count(&self, _address: Address) -> TransportResult<u64> {
        Ok(0)
    }
    async fn estimate_gas(&self, _tx: TransactionRequest) -> TransportResult<u64> {
        Ok(21_000)
    }
    async fn fee_estimate(&self) -> TransportResult<Eip1559Estimation> {
        Ok(Eip1559Estimation {
            max_fee_per_gas: 1_000_000_000,
            max_priority_fee_per_gas: 100_000_000,
        })
    }
    async fn counterfactual_address(
        &self,
        _factory: Address,
        _owner: Address,
        _salt: U256,
    ) -> TransportResult<Address> {
        Ok(Address::repeat_byte(0x55))
    }
    async fn entry_point_nonce(
        &self,
        _entry_point: Address,
        _sender: Address,
    ) -> TransportResult<U256> {
        Ok(U256::ZERO)
    }
    async fn broadcast(&self, tx: TxEnvelope) -> TransportResult<B256> {
        self.broadcasts.lock().unwrap().push(tx);
        Ok(B256::repeat_byte(0xbb))
    }
}

#[derive(Debug)]
struct FakeIndexer {
    native_balance: U256,
    token_balance: U256,
    decimals_calls: AtomicUsize,
}

impl Default for FakeIndexer {
    fn default() -> Self {
        Self {
            native_balance: U256::from(10u64).pow(U256::from(20)),
            token_balance: U256::from(10u64).pow(U256::from(12)),
            decimals_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl IndexerApi for FakeIndexer {
    async fn native_balance(
        &self,
        _chain: &str,
        _address: Address,
    ) -> Result<U256, DependencyError> {
        Ok(self.native_balance)
    }
    async fn token_balance(
        &self,
        _chain: &str,
        _address: Address,
        _token: Address,
    ) -> Result<U256, DependencyError> {
        Ok(self.token_balance)
    }
    async fn token_decimals(
        &self,
        _chain: &str,
        _token: Address,
    ) -> Result<Option<u8>, DependencyError> {
        self.decimals_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(18))
    }
}

#[derive(Debug, Default)]
struct FakeBundler {
    ops: Mutex<Vec<UserOperation>>,
}

#[async_trait]
impl BundlerApi for FakeBundler {
    async fn send_user_operation(
        &self,
        op: &UserOperation,
        _entry_point: Address,
    ) -> Result<B256, DependencyError> {
        self.ops.lock().unwrap().push(op.clone());
        Ok(B256::repeat_byte(0xaa))
    }
    async fn user_operation_receipt(
        &self,
        op_hash: B256,
    ) -> Result<Option<UserOperationReceipt>, DependencyError> {
        Ok(Some(UserOperationReceipt {
            user_op_hash: op_hash,
            success: true,
            transaction_hash: Some(B256::repeat_byte(0xcc)),
        }))
    }
    async fn sponsor_user_operation(
        &self,
        _op: &UserOperation,
        _entry_point: Address,
    ) -> Result<SponsorshipData, DependencyError> {
        Ok(SponsorshipData {
            paymaster: Address::repeat_byte(0x99),
            paymaster_data: Bytes::new(),
            paymaster_verification_gas_limit: U256::from(100_000),
            paymaster_post_op_gas_limit: U256::from(50_000),
        })
    }
}

#[derive(Debug)]
struct FakeSubstrate {
    balance: U256,
    transfers: Mutex<Vec<(String, U256)>>,
}

#[async_trait]
impl SubstrateGateway for FakeSubstrate {
    async fn derive_address(&self, _chain: &str, _phrase: &str) -> Result<String, DependencyError> {
        Ok("5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY".to_string())
    }
    async fn free_balance(&self, _chain: &str, _address: &str) -> Result<U256, DependencyError> {
        Ok(self.balance)
    }
    async fn transfer(
        &self,
        _chain: &str,
        _phrase: &str,
        to: &str,
        amount: U256,
    ) -> Result<SubstrateTransfer, DependencyError> {
        self.transfers.lock().unwrap().push((to.to_string(), amount));
        Ok(SubstrateTransfer {
            extrinsic_hash: "0xfeedface".to_string(),
            from: "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY".to_string(),
        })
    }
}

fn config() -> EngineConfig {
    let rpc = Url::parse("http://localhost:8545").unwrap();
    let bundler = Url::parse("http://localhost:4337").unwrap();
    EngineConfig::default()
        .with_chain(
            "base-sepolia",
            ChainConfig {
                chain_id: 84532,
                rpc: rpc.clone(),
                evm: true,
                native_decimals: 18,
                erc4337_enabled: false,
                eip7702_enabled: true,
                bundler_endpoint: Some(bundler.clone()),
                paymaster_endpoint: None,
                entry_point: Some(ENTRY_POINT),
                account_factory: None,
                delegation_contract: Some(DELEGATION),
            },
        )
        .with_chain(
            "ethereum",
            ChainConfig {
                chain_id: 1,
                rpc: rpc.clone(),
                evm: true,
                native_decimals: 18,
                erc4337_enabled: false,
                eip7702_enabled: false,
                bundler_endpoint: None,
                paymaster_endpoint: None,
                entry_point: None,
                account_factory: None,
                delegation_contract: None,
            },
        )
        .with_chain(
            "arbitrum",
            ChainConfig {
                chain_id: 42161,
                rpc: rpc.clone(),
                evm: true,
                native_decimals: 18,
                erc4337_enabled: true,
                eip7702_enabled: false,
                bundler_endpoint: Some(bundler),
                paymaster_endpoint: Some(Url::parse("http://localhost:4338").unwrap()),
                entry_point: Some(ENTRY_POINT),
                account_factory: Some(FACTORY),
                delegation_contract: None,
            },
        )
        .with_chain(
            "polkadot",
            ChainConfig {
                chain_id: 0,
                rpc,
                evm: false,
                native_decimals: 10,
                erc4337_enabled: false,
                eip7702_enabled: false,
                bundler_endpoint: None,
                paymaster_endpoint: None,
                entry_point: None,
                account_factory: None,
                delegation_contract: None,
            },
        )
        .with_eip7702_eligible("base-sepolia")
        .with_erc4337_eligible("arbitrum")
        .with_seed_master_key(BASE64.encode([7u8; 32]))
}

struct Env {
    orchestrator: SendOrchestrator,
    storage: EngineStorage,
    rpc: Arc<FakeRpc>,
    indexer: Arc<FakeIndexer>,
    bundler: Arc<FakeBundler>,
    substrate: Arc<FakeSubstrate>,
}

fn env_with(rpc: FakeRpc, indexer: FakeIndexer, config: EngineConfig) -> Env {
    let registry = ChainRegistry::new(&config).unwrap();
    let rpc = Arc::new(rpc.with_code(DELEGATION, Bytes::from(vec![0x60, 0x80, 0x60, 0x40])));
    let indexer = Arc::new(indexer);
    let bundler = Arc::new(FakeBundler::default());
    let substrate = Arc::new(FakeSubstrate {
        balance: U256::from(100_000_000_000u64),
        transfers: Mutex::new(Vec::new()),
    });
    let storage = EngineStorage::in_memory();

    let mut chains = Chains::default();
    for key in ["base-sepolia", "ethereum", "arbitrum"] {
        let descriptor = registry.descriptor(key).unwrap().clone();
        let handle_bundler = descriptor
            .bundler_endpoint
            .is_some()
            .then(|| bundler.clone() as Arc<dyn BundlerApi>);
        chains = chains.with_chain(
            key,
            Chain {
                descriptor,
                rpc: rpc.clone() as Arc<dyn ChainRpc>,
                bundler: handle_bundler,
            },
        );
    }

    let orchestrator = SendOrchestrator::new(
        &config,
        chains,
        storage.clone(),
        indexer.clone() as Arc<dyn IndexerApi>,
        Some(substrate.clone() as Arc<dyn SubstrateGateway>),
    )
    .unwrap();

    Env { orchestrator, storage, rpc, indexer, bundler, substrate }
}

fn env() -> Env {
    env_with(FakeRpc::default(), FakeIndexer::default(), config())
}

fn native_request(owner: &str, chain: &str, amount: &str) -> SendRequest {
    SendRequest {
        owner: owner.to_string(),
        chain_key: chain.to_string(),
        recipient: RECIPIENT.to_string(),
        amount: amount.to_string(),
        token: None,
        token_decimals: None,
        overrides: SendOverrides::default(),
    }
}

#[tokio::test]
async fn happy_path_native_send_auto_provisions_and_sponsors() {
    let env = env();

    // No prior seed for this owner.
    assert!(!env.storage.has_seed("alice").await.unwrap());
    assert!(!env.storage.delegation_recorded("alice", 84532).await.unwrap());

    let receipt =
        env.orchestrator.send(native_request("alice", "base-sepolia", "0.01")).await.unwrap();

    // Seed auto-provisioned, sponsored path taken, delegation recorded.
    assert!(env.storage.has_seed("alice").await.unwrap());
    assert_eq!(receipt.kind, ReceiptKind::UserOperation);
    assert!(receipt.transaction.is_some());
    assert_eq!(receipt.model, Some(custodia::accounts::AccountModel::Eip7702));
    assert!(env.storage.delegation_recorded("alice", 84532).await.unwrap());

    // The submitted operation carried the one-time authorization.
    let ops = env.bundler.ops.lock().unwrap();
    assert_eq!(ops.len(), 1);
    assert!(ops[0].eip7702_auth.is_some());
}

#[tokio::test]
async fn second_send_omits_authorization_once_designator_is_live() {
    let env = env();

    let first =
        env.orchestrator.send(native_request("alice", "base-sepolia", "0.01")).await.unwrap();

    // Simulate the chain applying the delegation from the first send.
    let sender: Address = first.from.parse().unwrap();
    let designator = Bytes::from([&[0xef, 0x01, 0x00][..], DELEGATION.as_slice()].concat());
    env.rpc.set_code(sender, designator);

    env.orchestrator.send(native_request("alice", "base-sepolia", "0.02")).await.unwrap();

    let ops = env.bundler.ops.lock().unwrap();
    assert_eq!(ops.len(), 2);
    assert!(ops[0].eip7702_auth.is_some());
    assert!(ops[1].eip7702_auth.is_none());
}

#[tokio::test]
async fn token_send_with_caller_decimals_skips_resolution() {
    let env = env();

    let request = SendRequest {
        token: Some(TOKEN),
        token_decimals: Some(6),
        ..native_request("bob", "ethereum", "100.5")
    };
    let receipt = env.orchestrator.send(request).await.unwrap();
    assert_eq!(receipt.kind, ReceiptKind::Transaction);

    // No decimals lookup hit either source.
    assert_eq!(env.indexer.decimals_calls.load(Ordering::SeqCst), 0);
    assert_eq!(env.rpc.decimals_calls.load(Ordering::SeqCst), 0);

    // 100.5 at 6 decimals converted to exactly 100_500_000 base units.
    let broadcasts = env.rpc.broadcasts.lock().unwrap();
    assert_eq!(broadcasts.len(), 1);
    let TxEnvelope::Eip1559(signed) = &broadcasts[0] else {
        panic!("expected a direct eip-1559 transaction");
    };
    let transfer = IERC20::transferCall::abi_decode(signed.tx().input()).unwrap();
    assert_eq!(transfer.amount, U256::from(100_500_000u64));
    assert_eq!(transfer.to, RECIPIENT.parse::<Address>().unwrap());
}

#[tokio::test]
async fn stale_indexer_balance_does_not_block_send() {
    let env = env_with(
        FakeRpc {
            native_balance: U256::from(50_000_000_000_000_000_000u128),
            ..Default::default()
        },
        FakeIndexer { native_balance: U256::ZERO, ..Default::default() },
        config(),
    );

    let receipt =
        env.orchestrator.send(native_request("carol", "ethereum", "10")).await.unwrap();
    assert_eq!(receipt.kind, ReceiptKind::Transaction);
}

#[tokio::test]
async fn insufficient_on_both_sources_is_classified() {
    let env = env_with(
        FakeRpc { native_balance: U256::from(5), ..Default::default() },
        FakeIndexer { native_balance: U256::from(3), ..Default::default() },
        config(),
    );

    let err =
        env.orchestrator.send(native_request("dave", "ethereum", "1")).await.unwrap_err();
    assert_eq!(err.kind, FailureKind::InsufficientFunds);
    assert!(err.to_string().contains("insufficient funds"));
}

#[tokio::test]
async fn gasless_sends_are_rate_limited() {
    let env = env_with(
        FakeRpc::default(),
        FakeIndexer::default(),
        config().with_gasless_limit(2, std::time::Duration::from_secs(3600)),
    );

    for _ in 0..2 {
        env.orchestrator.send(native_request("erin", "base-sepolia", "0.01")).await.unwrap();
    }
    let err = env
        .orchestrator
        .send(native_request("erin", "base-sepolia", "0.01"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::RateLimited);

    // Direct (non-sponsored) sends on another chain are unaffected.
    env.orchestrator.send(native_request("erin", "ethereum", "0.01")).await.unwrap();
}

#[tokio::test]
async fn erc4337_send_deploys_then_reuses_account() {
    let env = env();

    let receipt =
        env.orchestrator.send(native_request("frank", "arbitrum", "0.5")).await.unwrap();
    assert_eq!(receipt.kind, ReceiptKind::UserOperation);
    assert!(env.storage.account_deployed("frank", 42161).await.unwrap());

    env.orchestrator.send(native_request("frank", "arbitrum", "0.5")).await.unwrap();

    let ops = env.bundler.ops.lock().unwrap();
    assert_eq!(ops.len(), 2);
    assert!(ops[0].factory.is_some(), "first operation carries deployment data");
    assert!(ops[1].factory.is_none(), "deployed account needs no factory");
}

#[tokio::test]
async fn substrate_send_routes_through_the_gateway() {
    let env = env();

    let receipt =
        env.orchestrator.send(native_request("grace", "polkadot", "1.5")).await.unwrap();
    assert_eq!(receipt.kind, ReceiptKind::Extrinsic);
    assert_eq!(receipt.hash, "0xfeedface");
    assert_eq!(receipt.model, None);

    let transfers = env.substrate.transfers.lock().unwrap();
    // 1.5 at the chain's 10 native decimals.
    assert_eq!(transfers[0].1, U256::from(15_000_000_000u64));
}

#[tokio::test]
async fn corrupted_seed_record_is_a_tamper_failure() {
    let env = env();

    env.storage
        .write_seed(
            "mallory",
            &EncryptedSeed {
                ciphertext: vec![1, 2, 3, 4].into(),
                iv: vec![0; 12].into(),
                auth_tag: vec![0; 16].into(),
            },
        )
        .await
        .unwrap();

    let err = env
        .orchestrator
        .send(native_request("mallory", "ethereum", "0.01"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::Tamper);
}

#[tokio::test]
async fn malformed_amounts_fail_before_any_dispatch() {
    let env = env();

    for amount in ["", "-1", "0", "abc", "1.2.3"] {
        let err = env
            .orchestrator
            .send(native_request("henry", "ethereum", amount))
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::Validation, "amount {amount:?}");
    }
    assert!(env.rpc.broadcasts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unknown_chain_is_a_configuration_failure() {
    let env = env();
    let err =
        env.orchestrator.send(native_request("iris", "notachain", "1")).await.unwrap_err();
    assert_eq!(err.kind, FailureKind::Configuration);
}

#[tokio::test]
async fn eip7702_override_on_alias_chain_is_rejected() {
    let env = env();
    let request = SendRequest {
        overrides: SendOverrides { force_eip7702: true, ..Default::default() },
        ..native_request("judy", "ethereum-erc4337", "1")
    };
    let err = env.orchestrator.send(request).await.unwrap_err();
    assert_eq!(err.kind, FailureKind::Validation);
    assert!(err.to_string().contains("ERC-4337"));
}

#[tokio::test]
async fn addresses_are_deterministic_per_owner() {
    let env = env();
    let first = env.orchestrator.account_address("kate", "ethereum").await.unwrap();
    let second = env.orchestrator.account_address("kate", "ethereum").await.unwrap();
    assert_eq!(first, second);

    let other = env.orchestrator.account_address("liam", "ethereum").await.unwrap();
    assert_ne!(first, other);
}
