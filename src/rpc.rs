use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use alloy_rpc_client::RpcClient;
use alloy_transport_http::Http;
use log::info;
use reqwest::{Client, Url};

use crate::error::FetchError;

/// Connects to an Ethereum JSON-RPC endpoint through the shared HTTP client,
/// so chain reads carry the same timeout as every other upstream.
pub fn connect(client: Client, url: &str) -> Result<DynProvider, FetchError> {
    let endpoint: Url = url
        .parse()
        .map_err(|e| FetchError::Config(format!("RPC_URL {url}: {e}")))?;
    info!("[Chain] RPC endpoint at {}", endpoint.host_str().unwrap_or_default());

    let transport = Http::with_client(client, endpoint);
    Ok(ProviderBuilder::new()
        .connect_client(RpcClient::new(transport, false))
        .erased())
}
