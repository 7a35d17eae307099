//! In-memory `ChainReader` and loopback upstreams used by the unit tests.

use actix_web::{App, HttpResponse, HttpServer, web};
use alloy_json_abi::JsonAbi;
use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::contracts::{ChainReader, Contract, NodeDetails};
use crate::error::FetchError;
use crate::rpc;

const ETH: u128 = 1_000_000_000_000_000_000;

#[derive(Default)]
pub struct FakeChain {
    nodes: Vec<(Address, Vec<Address>)>,
    calls: Mutex<HashMap<&'static str, usize>>,
    failures: Mutex<HashMap<&'static str, usize>>,
    balance_reads: Mutex<HashMap<Address, u64>>,
}

impl FakeChain {
    /// A chain with a single node owning `count` minipools.
    pub fn with_minipools(node: Address, count: u8) -> Self {
        let minipools = (0..count).map(|i| Address::with_last_byte(0x10 + i)).collect();
        Self {
            nodes: vec![(node, minipools)],
            ..Self::default()
        }
    }

    pub fn minipools_of(&self, node: Address) -> Vec<Address> {
        self.nodes
            .iter()
            .find(|(n, _)| *n == node)
            .map(|(_, m)| m.clone())
            .unwrap_or_default()
    }

    pub fn calls(&self, method: &str) -> usize {
        self.calls.lock().unwrap().get(method).copied().unwrap_or(0)
    }

    /// Makes the next `times` calls to `method` fail with an RPC error.
    pub fn fail_next(&self, method: &'static str, times: usize) {
        self.failures.lock().unwrap().insert(method, times);
    }

    /// The balance the first read of `minipool` returns. Every later read
    /// returns a little more, like a validator accruing rewards.
    pub fn first_balance_of(&self, minipool: Address) -> U256 {
        U256::from(32 * ETH + u128::from(minipool.0[19]) * 10_000_000_000_000_000)
    }

    fn record(&self, method: &'static str) -> Result<(), FetchError> {
        *self.calls.lock().unwrap().entry(method).or_default() += 1;
        let mut failures = self.failures.lock().unwrap();
        match failures.get_mut(method) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(FetchError::Rpc {
                    code: -32005,
                    message: format!("{method} rate limited"),
                })
            }
            _ => Ok(()),
        }
    }

    fn node(&self, node: Address) -> Result<&Vec<Address>, FetchError> {
        self.nodes
            .iter()
            .find(|(n, _)| *n == node)
            .map(|(_, m)| m)
            .ok_or_else(|| FetchError::Rpc {
                code: 3,
                message: "execution reverted".to_string(),
            })
    }
}

#[async_trait]
impl ChainReader for FakeChain {
    async fn node_details(&self, node: Address) -> Result<NodeDetails, FetchError> {
        self.record("node_details")?;
        let minipools = self.node(node)?;
        Ok(NodeDetails {
            address: node,
            registration_time: 1_677_801_600,
            timezone_location: "Europe/Berlin".to_string(),
            balance_eth: U256::from(ETH / 2),
            balance_rpl: U256::from(10 * ETH),
            rpl_stake: U256::from(1_000 * ETH),
            effective_rpl_stake: U256::from(900 * ETH),
            minimum_rpl_stake: U256::from(240 * ETH),
            maximum_rpl_stake: U256::from(3_600 * ETH),
            minipool_count: minipools.len() as u64,
            eth_matched: U256::from(24 * ETH * minipools.len() as u128),
            smoothing_pool_registration_state: false,
        })
    }

    async fn smoothing_pool_registration_state(&self, node: Address) -> Result<bool, FetchError> {
        self.record("smoothing_pool_registration_state")?;
        self.node(node).map(|_| true)
    }

    async fn node_count(&self) -> Result<u64, FetchError> {
        self.record("node_count")?;
        Ok(self.nodes.len() as u64)
    }

    async fn node_addresses(&self, offset: u64, limit: u64) -> Result<Vec<Address>, FetchError> {
        self.record("node_addresses")?;
        Ok(self
            .nodes
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .map(|(n, _)| *n)
            .collect())
    }

    async fn node_minipool_count(&self, node: Address) -> Result<u64, FetchError> {
        self.record("node_minipool_count")?;
        Ok(self.node(node)?.len() as u64)
    }

    async fn node_active_minipool_count(&self, node: Address) -> Result<u64, FetchError> {
        self.record("node_active_minipool_count")?;
        Ok(self.node(node)?.len() as u64)
    }

    async fn node_finalised_minipool_count(&self, node: Address) -> Result<u64, FetchError> {
        self.record("node_finalised_minipool_count")?;
        self.node(node)?;
        Ok(0)
    }

    async fn node_validating_minipool_count(&self, node: Address) -> Result<u64, FetchError> {
        self.record("node_validating_minipool_count")?;
        Ok(self.node(node)?.len() as u64)
    }

    async fn node_minipool_at(&self, node: Address, index: u64) -> Result<Address, FetchError> {
        self.record("node_minipool_at")?;
        self.node(node)?
            .get(index as usize)
            .copied()
            .ok_or_else(|| FetchError::Rpc {
                code: 3,
                message: "index out of bounds".to_string(),
            })
    }

    async fn balance(&self, address: Address) -> Result<U256, FetchError> {
        self.record("balance")?;
        let mut reads = self.balance_reads.lock().unwrap();
        let read = reads.entry(address).or_default();
        let balance = self.first_balance_of(address) + U256::from(*read) * U256::from(1_000_000_000u64);
        *read += 1;
        Ok(balance)
    }

    async fn minipool_delegate(&self, minipool: Address) -> Result<Contract, FetchError> {
        self.record("minipool_delegate")?;
        let abi: JsonAbi = serde_json::from_str("[]")?;
        let provider = rpc::connect(reqwest::Client::new(), "http://127.0.0.1:9")?;
        Ok(Contract::new(minipool, Arc::new(abi), provider))
    }

    async fn node_deposit_balance(&self, _minipool: &Contract) -> Result<U256, FetchError> {
        self.record("node_deposit_balance")?;
        Ok(U256::from(8 * ETH))
    }

    async fn node_fee(&self, _minipool: &Contract) -> Result<U256, FetchError> {
        self.record("node_fee")?;
        Ok(U256::from(ETH * 14 / 100))
    }

    async fn node_refund_balance(&self, _minipool: &Contract) -> Result<U256, FetchError> {
        self.record("node_refund_balance")?;
        Ok(U256::ZERO)
    }

    async fn calculate_node_share(&self, _minipool: &Contract, balance: U256) -> Result<U256, FetchError> {
        self.record("calculate_node_share")?;
        Ok(balance / U256::from(4u8))
    }
}

/// A loopback HTTP server standing in for an upstream API.
pub struct Upstream {
    pub url: String,
    hits: Arc<AtomicUsize>,
}

impl Upstream {
    /// Requests served so far.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    fn start(server: actix_web::dev::Server, addr: std::net::SocketAddr, hits: Arc<AtomicUsize>) -> Self {
        actix_web::rt::spawn(server);
        Self {
            url: format!("http://{addr}"),
            hits,
        }
    }
}

/// Serves `body` with `status` on every path, on a random loopback port.
pub fn spawn_upstream(status: u16, body: Value) -> Upstream {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let server = HttpServer::new(move || {
        let body = body.clone();
        let counter = counter.clone();
        App::new().default_service(web::to(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            let body = body.clone();
            async move {
                let status = actix_web::http::StatusCode::from_u16(status).unwrap();
                HttpResponse::build(status).json(body)
            }
        }))
    })
    .workers(1)
    .bind(("127.0.0.1", 0))
    .unwrap();
    let addr = server.addrs()[0];
    Upstream::start(server.run(), addr, hits)
}

/// A JSON-RPC endpoint. `reply` gets the method name and returns the
/// `result` or `error` member of the response; the id is echoed back.
pub fn spawn_json_rpc(reply: fn(&str) -> Value) -> Upstream {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let server = HttpServer::new(move || {
        let counter = counter.clone();
        App::new().default_service(web::to(move |request: web::Json<Value>| {
            counter.fetch_add(1, Ordering::SeqCst);
            let request = request.into_inner();
            let mut response = reply(request["method"].as_str().unwrap_or_default());
            response["jsonrpc"] = json!("2.0");
            response["id"] = request["id"].clone();
            async move { HttpResponse::Ok().json(response) }
        }))
    })
    .workers(1)
    .bind(("127.0.0.1", 0))
    .unwrap();
    let addr = server.addrs()[0];
    Upstream::start(server.run(), addr, hits)
}
