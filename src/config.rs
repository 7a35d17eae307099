use alloy_primitives::Address;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::FetchError;

pub const DEFAULT_NODE_MANAGER: &str = "0x89F478E6Cc24f052103628f36598D4C14Da3D287";
pub const DEFAULT_MINIPOOL_MANAGER: &str = "0x6293B8abC1F36aFB22406Be5f96D893072A8cF3a";

/// Everything the server reads from the environment (after `.env` is loaded).
#[derive(Clone, Debug)]
pub struct Config {
    pub server_port: u16,
    pub rpc_url: String,
    pub coinmarketcap_api_key: String,
    pub price_api_url: String,
    pub etherscan_api_key: String,
    pub explorer_api_url: String,
    pub chain_id: u64,
    pub node_manager_address: Address,
    pub minipool_manager_address: Address,
    pub fetch_timeout: Duration,
    pub abi_cache_ttl: Duration,
    pub retry: RetryConfig,
    pub minipool_concurrency: usize,
}

#[derive(Clone, Copy, Debug)]
pub struct RetryConfig {
    pub max_times: usize,
    pub min_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_times: 3,
            min_delay: Duration::from_millis(1000),
        }
    }
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or(default.to_string())
}

fn parsed_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

fn contract_address(key: &str, default: &str) -> Result<Address, FetchError> {
    let raw = var_or(key, default);
    Address::parse_checksummed(raw.trim(), None)
        .or_else(|_| Address::from_str(raw.trim()))
        .map_err(|e| FetchError::Config(format!("{key}={raw}: {e}")))
}

impl Config {
    pub fn from_env() -> Result<Self, FetchError> {
        Ok(Self {
            server_port: parsed_or("SERVER_PORT", 8080),
            rpc_url: var_or("RPC_URL", "https://ethereum-rpc.publicnode.com"),
            // A missing key only breaks the calls that need it.
            coinmarketcap_api_key: var_or("COINMARKETCAP_API_KEY", ""),
            price_api_url: var_or(
                "PRICE_API_URL",
                "https://pro-api.coinmarketcap.com/v2/cryptocurrency/quotes/latest",
            ),
            etherscan_api_key: var_or("ETHERSCAN_API_KEY", ""),
            explorer_api_url: var_or("EXPLORER_API_URL", "https://api.etherscan.io/v2/api"),
            chain_id: parsed_or("CHAIN_ID", 1),
            node_manager_address: contract_address(
                "ROCKET_NODE_MANAGER_ADDRESS",
                DEFAULT_NODE_MANAGER,
            )?,
            minipool_manager_address: contract_address(
                "ROCKET_MINIPOOL_MANAGER_ADDRESS",
                DEFAULT_MINIPOOL_MANAGER,
            )?,
            fetch_timeout: Duration::from_secs(parsed_or("FETCH_TIMEOUT_SECONDS", 30)),
            abi_cache_ttl: Duration::from_secs(parsed_or("ABI_CACHE_TTL_SECONDS", 3600)),
            retry: RetryConfig {
                max_times: parsed_or("RETRY_MAX_TIMES", 3),
                min_delay: Duration::from_millis(parsed_or("RETRY_MIN_DELAY_MS", 1000)),
            },
            minipool_concurrency: parsed_or("MINIPOOL_FETCH_CONCURRENCY", 4usize).max(1),
        })
    }
}
