use alloy_json_abi::JsonAbi;
use alloy_primitives::Address;
use log::{debug, error, info};
use moka::future::Cache;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::error::FetchError;

/// Envelope of the Etherscan `contract/getabi` endpoint. On success `result`
/// holds the ABI as a JSON string; otherwise it holds the reason.
#[derive(Deserialize, Debug)]
pub struct AbiResponse {
    pub status: String,
    #[serde(default)]
    pub message: String,
    pub result: String,
}

impl AbiResponse {
    pub fn into_abi(self) -> Result<JsonAbi, FetchError> {
        if self.status != "1" {
            return Err(FetchError::Explorer(format!("{}: {}", self.message, self.result)));
        }
        Ok(serde_json::from_str(&self.result)?)
    }
}

/// Fetches verified contract ABIs from a block explorer. Minipool delegates
/// are shared by many minipools, so ABIs are cached by delegate address.
#[derive(Clone)]
pub struct Explorer {
    client: Client,
    api_url: String,
    api_key: String,
    chain_id: u64,
    cache: Cache<Address, Arc<JsonAbi>>,
}

impl Explorer {
    pub fn new(client: Client, api_url: String, api_key: String, chain_id: u64, ttl: Duration) -> Self {
        let cache = Cache::builder().time_to_live(ttl).max_capacity(256).build();
        Self {
            client,
            api_url,
            api_key,
            chain_id,
            cache,
        }
    }

    /// The delegate's ABI, from the cache when present. Concurrent misses for
    /// the same address share a single explorer request.
    pub async fn contract_abi(&self, address: Address) -> Result<Arc<JsonAbi>, FetchError> {
        let load = async {
            debug!("[Explorer] Cache miss for {}", address);
            let abi = self.fetch_abi(address).await?;
            info!("[Explorer] Cached ABI for {}", address);
            Ok::<_, FetchError>(Arc::new(abi))
        };
        self.cache.try_get_with(address, load).await.map_err(|e| {
            error!("[Explorer] Failed to fetch ABI for {}: {}", address, e);
            shared_error(e)
        })
    }

    async fn fetch_abi(&self, address: Address) -> Result<JsonAbi, FetchError> {
        let chain_id = self.chain_id.to_string();
        let address = address.to_checksum(None);
        let response = self
            .client
            .get(&self.api_url)
            .query(&[
                ("chainid", chain_id.as_str()),
                ("module", "contract"),
                ("action", "getabi"),
                ("address", address.as_str()),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }
        response.json::<AbiResponse>().await?.into_abi()
    }
}

/// Waiters on a failed load all receive the same error; only the last holder
/// gets it back by value.
fn shared_error(err: Arc<FetchError>) -> FetchError {
    Arc::try_unwrap(err).unwrap_or_else(|shared| match *shared {
        FetchError::Timeout => FetchError::Timeout,
        FetchError::Status(status) => FetchError::Status(status),
        ref other => FetchError::Explorer(other.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::spawn_upstream;
    use futures::future::join_all;

    const DELEGATE_ABI: &str = include_str!("../abi/RocketMinipoolDelegate.json");

    #[test]
    fn parses_verified_abi() {
        let response = AbiResponse {
            status: "1".to_string(),
            message: "OK".to_string(),
            result: DELEGATE_ABI.to_string(),
        };
        let abi = response.into_abi().unwrap();
        assert!(abi.function("calculateNodeShare").is_some());
        assert!(abi.function("getNodeRefundBalance").is_some());
    }

    #[test]
    fn unverified_contract_is_an_explorer_error() {
        let body = r#"{"status":"0","message":"NOTOK","result":"Contract source code not verified"}"#;
        let response: AbiResponse = serde_json::from_str(body).unwrap();
        match response.into_abi() {
            Err(FetchError::Explorer(reason)) => assert!(reason.contains("not verified")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn cached_abi_skips_the_network() {
        let explorer = Explorer::new(
            Client::new(),
            "http://127.0.0.1:9".to_string(),
            String::new(),
            1,
            Duration::from_secs(60),
        );
        let delegate = Address::with_last_byte(42);
        let abi: JsonAbi = serde_json::from_str(DELEGATE_ABI).unwrap();
        explorer.cache.insert(delegate, Arc::new(abi)).await;

        let cached = explorer.contract_abi(delegate).await.unwrap();
        assert!(cached.function("getNodeFee").is_some());
        assert!(explorer.contract_abi(Address::with_last_byte(43)).await.is_err());
    }

    #[actix_web::test]
    async fn concurrent_misses_share_one_request() {
        let upstream = spawn_upstream(
            200,
            serde_json::json!({"status": "1", "message": "OK", "result": DELEGATE_ABI}),
        );
        let explorer = Explorer::new(Client::new(), upstream.url.clone(), String::new(), 1, Duration::from_secs(60));
        let delegate = Address::with_last_byte(42);

        let results = join_all((0..4).map(|_| explorer.contract_abi(delegate))).await;
        for abi in results {
            assert!(abi.unwrap().function("calculateNodeShare").is_some());
        }
        assert_eq!(upstream.hits(), 1);
    }

    #[actix_web::test]
    async fn failed_loads_are_not_cached() {
        let upstream = spawn_upstream(
            200,
            serde_json::json!({"status": "0", "message": "NOTOK", "result": "Max rate limit reached"}),
        );
        let explorer = Explorer::new(Client::new(), upstream.url.clone(), String::new(), 1, Duration::from_secs(60));
        let delegate = Address::with_last_byte(42);

        assert!(matches!(explorer.contract_abi(delegate).await, Err(FetchError::Explorer(_))));
        assert!(explorer.contract_abi(delegate).await.is_err());
        assert_eq!(upstream.hits(), 2);
    }
}
