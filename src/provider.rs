//! Chain RPC access.
//!
//! [`ChainRpc`] is the narrow interface the engine uses to talk to a chain
//! node: the handful of calls the send path actually needs, no more. Every
//! alloy [`Provider`] gets the implementation for free; tests substitute
//! fakes.

use alloy::{
    consensus::TxEnvelope,
    eips::eip1559::Eip1559Estimation,
    primitives::{Address, B256, Bytes, U256},
    providers::Provider,
    rpc::types::TransactionRequest,
    sol,
    transports::{TransportErrorKind, TransportResult},
};
use async_trait::async_trait;

sol! {
    #[sol(rpc)]
    #[derive(Debug)]
    interface IERC20 {
        event Transfer(address indexed from, address indexed to, uint256 amount);

        function decimals() external view returns (uint8);
        function balanceOf(address owner) external view returns (uint256);
        function transfer(address to, uint256 amount) external returns (bool);
    }
}

sol! {
    #[sol(rpc)]
    #[derive(Debug)]
    interface IAccountFactory {
        function getAddress(address owner, uint256 salt) external view returns (address);
        function createAccount(address owner, uint256 salt) external returns (address);
    }
}

sol! {
    #[sol(rpc)]
    #[derive(Debug)]
    interface IEntryPoint {
        function getNonce(address sender, uint192 key) external view returns (uint256);
    }
}

/// The chain JSON-RPC calls used by the send path.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Bytecode at `address`.
    async fn get_code(&self, address: Address) -> TransportResult<Bytes>;

    /// Native balance of `address`.
    async fn native_balance(&self, address: Address) -> TransportResult<U256>;

    /// ERC-20 balance of `owner` for `token`.
    async fn erc20_balance(&self, token: Address, owner: Address) -> TransportResult<U256>;

    /// ERC-20 `decimals()` of `token`.
    async fn erc20_decimals(&self, token: Address) -> TransportResult<u8>;

    /// Pending-state transaction count of `address`.
    async fn transaction_count(&self, address: Address) -> TransportResult<u64>;

    /// Gas estimate for `tx`.
    async fn estimate_gas(&self, tx: TransactionRequest) -> TransportResult<u64>;

    /// EIP-1559 fee estimate for the next block.
    async fn fee_estimate(&self) -> TransportResult<Eip1559Estimation>;

    /// Counterfactual smart-account address for `owner` under `factory`.
    async fn counterfactual_address(
        &self,
        factory: Address,
        owner: Address,
        salt: U256,
    ) -> TransportResult<Address>;

    /// Entry point nonce of `sender` on the default sequence key.
    async fn entry_point_nonce(
        &self,
        entry_point: Address,
        sender: Address,
    ) -> TransportResult<U256>;

    /// Broadcasts a signed transaction envelope, returning its hash.
    async fn broadcast(&self, tx: TxEnvelope) -> TransportResult<B256>;
}

#[async_trait]
impl<P> ChainRpc for P
where
    P: Provider,
{
    async fn get_code(&self, address: Address) -> TransportResult<Bytes> {
        Provider::get_code_at(self, address).await
    }

    async fn native_balance(&self, address: Address) -> TransportResult<U256> {
        Provider::get_balance(self, address).await
    }

    async fn erc20_balance(&self, token: Address, owner: Address) -> TransportResult<U256> {
        IERC20::new(token, self)
            .balanceOf(owner)
            .call()
            .await
            .map_err(TransportErrorKind::custom)
    }

    async fn erc20_decimals(&self, token: Address) -> TransportResult<u8> {
        IERC20::new(token, self).decimals().call().await.map_err(TransportErrorKind::custom)
    }

    async fn transaction_count(&self, address: Address) -> TransportResult<u64> {
        Provider::get_transaction_count(self, address).pending().await
    }

    async fn estimate_gas(&self, tx: TransactionRequest) -> TransportResult<u64> {
        Provider::estimate_gas(self, tx).await
    }

    async fn fee_estimate(&self) -> TransportResult<Eip1559Estimation> {
        Provider::estimate_eip1559_fees(self).await
    }

    async fn counterfactual_address(
        &self,
        factory: Address,
        owner: Address,
        salt: U256,
    ) -> TransportResult<Address> {
        IAccountFactory::new(factory, self)
            .getAddress(owner, salt)
            .call()
            .await
            .map_err(TransportErrorKind::custom)
    }

    async fn entry_point_nonce(
        &self,
        entry_point: Address,
        sender: Address,
    ) -> TransportResult<U256> {
        IEntryPoint::new(entry_point, self)
            .getNonce(sender, alloy::primitives::aliases::U192::ZERO)
            .call()
            .await
            .map_err(TransportErrorKind::custom)
    }

    async fn broadcast(&self, tx: TxEnvelope) -> TransportResult<B256> {
        let pending = Provider::send_tx_envelope(self, tx).await?;
        Ok(*pending.tx_hash())
    }
}

/// Whether bytecode marks an EIP-7702 delegation to some implementation.
pub fn is_delegation_designator(code: &Bytes) -> bool {
    code.len() == 23 && code.starts_with(&[0xef, 0x01, 0x00])
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::bytes;

    #[test]
    fn delegation_designator_detection() {
        let delegated = Bytes::from(
            [&[0xef, 0x01, 0x00][..], &[0x11; 20][..]].concat(),
        );
        assert!(is_delegation_designator(&delegated));
        assert!(!is_delegation_designator(&bytes!("ef0100")));
        assert!(!is_delegation_designator(&bytes!("6080604052")));
        assert!(!is_delegation_designator(&Bytes::new()));
    }
}
