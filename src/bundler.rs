//! Bundler/paymaster collaborator for smart-account execution paths.
//!
//! User operations follow the ERC-4337 v0.7 wire shape. The bundler and
//! paymaster are assumed-correct external services; this module only speaks
//! their JSON-RPC interface and bounds how long the engine waits on them.

use crate::{
    constants::{BUNDLER_CALL_TIMEOUT, RECEIPT_POLL_ATTEMPTS, RECEIPT_POLL_DELAY},
    error::{Dependency, DependencyError},
};
use alloy::{
    eips::eip7702::SignedAuthorization,
    primitives::{Address, B256, Bytes, U256, keccak256},
    sol_types::SolValue,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::json;
use tracing::{debug, trace};
use url::Url;

/// An ERC-4337 v0.7 user operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    /// The account the operation executes from.
    pub sender: Address,
    /// Anti-replay nonce, managed by the entry point.
    pub nonce: U256,
    /// Account factory, set only while the account is undeployed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory: Option<Address>,
    /// Factory calldata, paired with `factory`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory_data: Option<Bytes>,
    /// The call the account executes.
    pub call_data: Bytes,
    /// Gas limit for the execution phase.
    pub call_gas_limit: U256,
    /// Gas limit for the verification phase.
    pub verification_gas_limit: U256,
    /// Gas paid to the bundler for pre-execution overhead.
    pub pre_verification_gas: U256,
    /// EIP-1559 max fee.
    pub max_fee_per_gas: U256,
    /// EIP-1559 priority fee.
    pub max_priority_fee_per_gas: U256,
    /// Sponsoring paymaster, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster: Option<Address>,
    /// Paymaster verification gas limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_verification_gas_limit: Option<U256>,
    /// Paymaster post-op gas limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_post_op_gas_limit: Option<U256>,
    /// Opaque paymaster payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_data: Option<Bytes>,
    /// EIP-7702 authorization to set alongside the operation, if the sender
    /// is a delegated EOA performing its first sponsored send.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eip7702_auth: Option<SignedAuthorization>,
    /// Account signature over [`UserOperation::hash`].
    pub signature: Bytes,
}

impl UserOperation {
    /// The v0.7 user operation hash signed by the account owner.
    pub fn hash(&self, entry_point: Address, chain_id: u64) -> B256 {
        let init_code = match (self.factory, &self.factory_data) {
            (Some(factory), Some(data)) => {
                let mut out = factory.to_vec();
                out.extend_from_slice(data);
                Bytes::from(out)
            }
            (Some(factory), None) => factory.to_vec().into(),
            _ => Bytes::new(),
        };
        let paymaster_and_data = match self.paymaster {
            Some(paymaster) => {
                let mut out = paymaster.to_vec();
                out.extend_from_slice(
                    &pack_u128_pair(
                        self.paymaster_verification_gas_limit.unwrap_or_default(),
                        self.paymaster_post_op_gas_limit.unwrap_or_default(),
                    )
                    .0,
                );
                out.extend_from_slice(self.paymaster_data.as_deref().map_or(&[][..], |b| &b[..]));
                Bytes::from(out)
            }
            None => Bytes::new(),
        };

        let packed = (
            self.sender,
            self.nonce,
            keccak256(&init_code),
            keccak256(&self.call_data),
            pack_u128_pair(self.verification_gas_limit, self.call_gas_limit),
            self.pre_verification_gas,
            pack_u128_pair(self.max_priority_fee_per_gas, self.max_fee_per_gas),
            keccak256(&paymaster_and_data),
        )
            .abi_encode();

        keccak256((keccak256(packed), entry_point, U256::from(chain_id)).abi_encode())
    }
}

/// Packs two 128-bit quantities into one 32-byte word, high value first.
fn pack_u128_pair(hi: U256, lo: U256) -> B256 {
    let mut out = [0u8; 32];
    out[..16].copy_from_slice(&hi.to_be_bytes::<32>()[16..]);
    out[16..].copy_from_slice(&lo.to_be_bytes::<32>()[16..]);
    B256::from(out)
}

/// Receipt for an included user operation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationReceipt {
    /// The operation hash.
    pub user_op_hash: B256,
    /// Whether the inner call succeeded.
    pub success: bool,
    /// Hash of the transaction the operation was bundled into.
    #[serde(default)]
    pub transaction_hash: Option<B256>,
}

/// Sponsorship fields returned by a paymaster.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SponsorshipData {
    /// Sponsoring paymaster contract.
    pub paymaster: Address,
    /// Opaque paymaster payload.
    pub paymaster_data: Bytes,
    /// Paymaster verification gas limit.
    pub paymaster_verification_gas_limit: U256,
    /// Paymaster post-op gas limit.
    pub paymaster_post_op_gas_limit: U256,
}

/// The bundler/paymaster calls used by smart-account execution.
#[async_trait]
pub trait BundlerApi: Send + Sync {
    /// Submits a user operation, returning its operation hash.
    async fn send_user_operation(
        &self,
        op: &UserOperation,
        entry_point: Address,
    ) -> Result<B256, DependencyError>;

    /// Fetches the receipt for an operation hash, if already included.
    async fn user_operation_receipt(
        &self,
        op_hash: B256,
    ) -> Result<Option<UserOperationReceipt>, DependencyError>;

    /// Requests paymaster sponsorship for an operation.
    async fn sponsor_user_operation(
        &self,
        op: &UserOperation,
        entry_point: Address,
    ) -> Result<SponsorshipData, DependencyError>;

    /// Polls for a receipt with bounded attempts and a fixed delay.
    ///
    /// Exhausting the attempts is not a failure: the operation may still be
    /// included later, so callers report the operation hash as status
    /// unknown.
    async fn poll_receipt(&self, op_hash: B256) -> Option<UserOperationReceipt> {
        for attempt in 1..=RECEIPT_POLL_ATTEMPTS {
            match self.user_operation_receipt(op_hash).await {
                Ok(Some(receipt)) => return Some(receipt),
                Ok(None) => trace!(%op_hash, attempt, "user operation not yet included"),
                Err(err) => debug!(%op_hash, attempt, %err, "receipt poll failed"),
            }
            if attempt < RECEIPT_POLL_ATTEMPTS {
                tokio::time::sleep(RECEIPT_POLL_DELAY).await;
            }
        }
        None
    }
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct JsonRpcResponse<T> {
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// HTTP JSON-RPC implementation of [`BundlerApi`].
#[derive(Debug, Clone)]
pub struct HttpBundler {
    bundler: Url,
    paymaster: Option<Url>,
    client: reqwest::Client,
}

impl HttpBundler {
    /// Creates a client for a bundler endpoint and optional paymaster.
    pub fn new(bundler: Url, paymaster: Option<Url>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(BUNDLER_CALL_TIMEOUT)
            .build()
            .expect("reqwest client construction");
        Self { bundler, paymaster, client }
    }

    async fn rpc_call<T: DeserializeOwned>(
        &self,
        url: &Url,
        method: &str,
        params: serde_json::Value,
    ) -> Result<Option<T>, DependencyError> {
        trace!(%url, method, "bundler request");
        let body = json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params });
        let response = self
            .client
            .post(url.clone())
            .json(&body)
            .send()
            .await
            .map_err(classify)?
            .error_for_status()
            .map_err(classify)?;
        let response: JsonRpcResponse<T> = response.json().await.map_err(classify)?;
        if let Some(err) = response.error {
            return Err(DependencyError::new(
                Dependency::Bundler,
                format!("{method} failed with code {}: {}", err.code, err.message),
            ));
        }
        Ok(response.result)
    }
}

fn classify(err: reqwest::Error) -> DependencyError {
    if err.is_timeout() {
        DependencyError::timeout(Dependency::Bundler)
    } else {
        DependencyError::new(Dependency::Bundler, err.to_string())
    }
}

#[async_trait]
impl BundlerApi for HttpBundler {
    async fn send_user_operation(
        &self,
        op: &UserOperation,
        entry_point: Address,
    ) -> Result<B256, DependencyError> {
        self.rpc_call(&self.bundler, "eth_sendUserOperation", json!([op, entry_point]))
            .await?
            .ok_or_else(|| {
                DependencyError::new(Dependency::Bundler, "empty eth_sendUserOperation result")
            })
    }

    async fn user_operation_receipt(
        &self,
        op_hash: B256,
    ) -> Result<Option<UserOperationReceipt>, DependencyError> {
        self.rpc_call(&self.bundler, "eth_getUserOperationReceipt", json!([op_hash])).await
    }

    async fn sponsor_user_operation(
        &self,
        op: &UserOperation,
        entry_point: Address,
    ) -> Result<SponsorshipData, DependencyError> {
        let Some(paymaster) = &self.paymaster else {
            return Err(DependencyError::new(
                Dependency::Bundler,
                "no paymaster endpoint configured for this chain",
            ));
        };
        self.rpc_call(paymaster, "pm_sponsorUserOperation", json!([op, entry_point]))
            .await?
            .ok_or_else(|| {
                DependencyError::new(Dependency::Bundler, "empty pm_sponsorUserOperation result")
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_and_field_sensitive() {
        let op = UserOperation {
            sender: Address::repeat_byte(0x11),
            nonce: U256::from(7),
            call_data: Bytes::from(vec![0xde, 0xad]),
            call_gas_limit: U256::from(100_000),
            verification_gas_limit: U256::from(200_000),
            pre_verification_gas: U256::from(50_000),
            max_fee_per_gas: U256::from(1_000_000_000u64),
            max_priority_fee_per_gas: U256::from(100_000_000u64),
            ..Default::default()
        };
        let entry_point = Address::repeat_byte(0x07);

        assert_eq!(op.hash(entry_point, 84532), op.hash(entry_point, 84532));
        assert_ne!(op.hash(entry_point, 84532), op.hash(entry_point, 1));

        let mut bumped = op.clone();
        bumped.nonce = U256::from(8);
        assert_ne!(op.hash(entry_point, 84532), bumped.hash(entry_point, 84532));
    }

    #[test]
    fn gas_packing_layout() {
        let word = pack_u128_pair(U256::from(0x0102u64), U256::from(0x0304u64));
        assert_eq!(word[14..16], [0x01, 0x02]);
        assert_eq!(word[30..32], [0x03, 0x04]);
        assert!(word[..14].iter().all(|b| *b == 0));
    }

    #[test]
    fn optional_fields_skipped_on_wire() {
        let op = UserOperation::default();
        let wire = serde_json::to_value(&op).unwrap();
        assert!(wire.get("factory").is_none());
        assert!(wire.get("paymaster").is_none());
        assert!(wire.get("eip7702Auth").is_none());
        assert!(wire.get("sender").is_some());
    }
}
