use alloy_primitives::Address;
use backon::{ExponentialBuilder, Retryable};
use futures::{StreamExt, TryStreamExt, stream};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::contracts::{self, ChainReader, NodeDetails, parse_address};
use crate::error::FetchError;
use crate::models::{MinipoolDetail, MinipoolSummary};

/// Everything gathered for one node by the minipool aggregation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodeMinipools {
    pub summary: MinipoolSummary,
    pub minipools: Vec<MinipoolDetail>,
}

/// Turns node and minipool addresses into the data the endpoints serve.
///
/// Each call builds its own accumulator; an `Aggregator` holds no
/// per-request state and can be shared across workers.
#[derive(Clone)]
pub struct Aggregator {
    chain: Arc<dyn ChainReader>,
    retry: RetryConfig,
    concurrency: usize,
}

impl Aggregator {
    pub fn new(chain: Arc<dyn ChainReader>, retry: RetryConfig, concurrency: usize) -> Self {
        Self {
            chain,
            retry,
            concurrency: concurrency.max(1),
        }
    }

    pub fn chain(&self) -> &dyn ChainReader {
        self.chain.as_ref()
    }

    /// Node details with the smoothing pool flag read alongside.
    pub async fn node_details(&self, node_address: &str) -> Result<NodeDetails, FetchError> {
        let node = parse_address(node_address).map_err(FetchError::InvalidNodeAddress)?;
        let (mut details, smoothing_pool) = tokio::try_join!(
            contracts::get_node_details(self.chain(), node_address),
            self.chain.smoothing_pool_registration_state(node),
        )?;
        details.smoothing_pool_registration_state = smoothing_pool;
        Ok(details)
    }

    /// The four minipool counters and the minipool addresses, in
    /// registration order.
    pub async fn minipool_summary(&self, node: Address) -> Result<MinipoolSummary, FetchError> {
        let (total, active, finalised, validating) = tokio::try_join!(
            self.chain.node_minipool_count(node),
            self.chain.node_active_minipool_count(node),
            self.chain.node_finalised_minipool_count(node),
            self.chain.node_validating_minipool_count(node),
        )?;
        let addresses = contracts::get_minipool_addresses(self.chain(), node, total).await?;

        Ok(MinipoolSummary {
            total,
            active,
            finalised,
            validating,
            addresses,
        })
    }

    /// Reads one minipool. The balance is read once and that same value is
    /// handed to `calculateNodeShare`, so the two shares always add up to
    /// the reported balance.
    pub async fn minipool_detail(&self, minipool: Address) -> Result<MinipoolDetail, FetchError> {
        info!("[Aggregator] Gathering minipool data for {}", minipool);
        let handle = self.chain.minipool_delegate(minipool).await?;
        let balance = self.chain.balance(minipool).await?;

        let (node_deposit_balance, commission_rate, node_refund_balance, node_share) = tokio::try_join!(
            self.chain.node_deposit_balance(&handle),
            self.chain.node_fee(&handle),
            self.chain.node_refund_balance(&handle),
            self.chain.calculate_node_share(&handle, balance),
        )?;

        let detail = MinipoolDetail {
            address: minipool,
            balance,
            node_deposit_balance,
            node_refund_balance,
            commission_rate,
            node_share,
            user_share: balance.saturating_sub(node_share),
        };
        debug!(
            "[Aggregator] Minipool {} balance {} splits into {} node / {} user",
            minipool, detail.balance, detail.node_share, detail.user_share
        );
        Ok(detail)
    }

    /// Single pass of the full minipool aggregation for a node.
    pub async fn node_minipools_once(&self, node: Address) -> Result<NodeMinipools, FetchError> {
        let summary = self.minipool_summary(node).await?;
        let minipools = stream::iter(summary.addresses.clone())
            .map(|minipool| self.minipool_detail(minipool))
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        Ok(NodeMinipools { summary, minipools })
    }

    /// Full minipool aggregation, retried from the top with exponential
    /// backoff while the failure looks transient.
    pub async fn node_minipools(&self, node_address: &str) -> Result<NodeMinipools, FetchError> {
        let node = parse_address(node_address).map_err(FetchError::InvalidNodeAddress)?;
        let backoff = ExponentialBuilder::default()
            .with_min_delay(self.retry.min_delay)
            .with_max_delay(self.retry.min_delay * 8)
            .with_max_times(self.retry.max_times);

        (|| self.node_minipools_once(node))
            .retry(backoff)
            .sleep(tokio::time::sleep)
            .when(FetchError::is_transient)
            .notify(|err: &FetchError, dur: Duration| {
                warn!("[Aggregator] Aggregation for {} failed: {}, retrying after {:?}", node, err, dur);
            })
            .await
            .inspect_err(|e| error!("[Aggregator] Giving up on minipools for {}: {}", node, e))
    }

    /// Details of a node together with its minipool summary, as shown on the
    /// node page. Short-circuits before any minipool read if the address is
    /// malformed.
    pub async fn node_page(&self, node_address: &str) -> Result<(NodeDetails, MinipoolSummary), FetchError> {
        let details = self.node_details(node_address).await?;
        let summary = self.minipool_summary(details.address).await?;
        Ok((details, summary))
    }

    pub async fn network_node_count(&self) -> Result<u64, FetchError> {
        self.chain.node_count().await
    }

    pub async fn all_node_addresses(&self) -> Result<Vec<Address>, FetchError> {
        let count = self.chain.node_count().await?;
        self.chain.node_addresses(0, count).await
    }
}
