//! Balance/portfolio indexer collaborator.
//!
//! The indexer is a fast, address-keyed read path over chain state. It is
//! treated as a cache that may lag the chain, never as the sole source of
//! truth for a spend decision.

use crate::error::{Dependency, DependencyError};
use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use serde::Deserialize;
use std::{fmt::Debug, time::Duration};
use tracing::trace;
use url::Url;

/// The indexer lookups used by the send path.
#[async_trait]
pub trait IndexerApi: Debug + Send + Sync {
    /// Native-asset balance of `address` on `chain`, in base units.
    async fn native_balance(&self, chain: &str, address: Address)
    -> Result<U256, DependencyError>;

    /// ERC-20 balance of `address` for `token` on `chain`, in base units.
    async fn token_balance(
        &self,
        chain: &str,
        address: Address,
        token: Address,
    ) -> Result<U256, DependencyError>;

    /// Decimal precision of `token` on `chain`, if the indexer knows it.
    ///
    /// `Ok(None)` means the indexer responded but does not track the token;
    /// transport failures are errors.
    async fn token_decimals(
        &self,
        chain: &str,
        token: Address,
    ) -> Result<Option<u8>, DependencyError>;
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    balance: U256,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    decimals: Option<u8>,
}

/// HTTP implementation of [`IndexerApi`].
#[derive(Debug, Clone)]
pub struct HttpIndexer {
    endpoint: Url,
    client: reqwest::Client,
}

impl HttpIndexer {
    /// Creates a client against the given base endpoint.
    pub fn new(endpoint: Url, request_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .expect("reqwest client construction");
        Self { endpoint, client }
    }

    fn url(&self, path: &str) -> Result<Url, DependencyError> {
        self.endpoint
            .join(path)
            .map_err(|err| DependencyError::new(Dependency::Indexer, err.to_string()))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: Url,
    ) -> Result<T, DependencyError> {
        trace!(%url, "indexer request");
        let response = self.client.get(url).send().await.map_err(classify)?;
        let response = response.error_for_status().map_err(classify)?;
        response.json().await.map_err(classify)
    }
}

fn classify(err: reqwest::Error) -> DependencyError {
    if err.is_timeout() {
        DependencyError::timeout(Dependency::Indexer)
    } else {
        DependencyError::new(Dependency::Indexer, err.to_string())
    }
}

#[async_trait]
impl IndexerApi for HttpIndexer {
    async fn native_balance(
        &self,
        chain: &str,
        address: Address,
    ) -> Result<U256, DependencyError> {
        let url = self.url(&format!("v1/chains/{chain}/addresses/{address}/balance"))?;
        let response: BalanceResponse = self.get_json(url).await?;
        Ok(response.balance)
    }

    async fn token_balance(
        &self,
        chain: &str,
        address: Address,
        token: Address,
    ) -> Result<U256, DependencyError> {
        let mut url = self.url(&format!("v1/chains/{chain}/addresses/{address}/balance"))?;
        url.query_pairs_mut().append_pair("token", &token.to_string());
        let response: BalanceResponse = self.get_json(url).await?;
        Ok(response.balance)
    }

    async fn token_decimals(
        &self,
        chain: &str,
        token: Address,
    ) -> Result<Option<u8>, DependencyError> {
        let url = self.url(&format!("v1/chains/{chain}/tokens/{token}"))?;
        let response: TokenResponse = self.get_json(url).await?;
        Ok(response.decimals)
    }
}
