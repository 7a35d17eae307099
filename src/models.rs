use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::contracts::NodeDetails;
use crate::formatters::{format_coin_value, format_registration_date, round_to};

// Response bodies. Amounts stay as U256 until they are put in one of these.

/// Decimal places kept when a wei amount is turned into a coin amount.
pub const COIN_DECIMALS: u32 = 6;

fn coins(amount: U256) -> f64 {
    format_coin_value(amount, COIN_DECIMALS)
}

/// A minipool's balance sheet, read in a single pass.
#[derive(Clone, Debug, PartialEq)]
pub struct MinipoolDetail {
    pub address: Address,
    pub balance: U256,
    pub node_deposit_balance: U256,
    pub node_refund_balance: U256,
    pub commission_rate: U256,
    pub node_share: U256,
    pub user_share: U256,
}

/// Counters and addresses of a node's minipools, built fresh per request.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MinipoolSummary {
    pub total: u64,
    pub active: u64,
    pub finalised: u64,
    pub validating: u64,
    pub addresses: Vec<Address>,
}

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct NodeDetailsResponse {
    pub address: String,
    pub timezone: String,
    pub formatted_registration_date: String,
    #[serde(rename = "balanceETH")]
    pub balance_eth: f64,
    #[serde(rename = "balanceRPL")]
    pub balance_rpl: f64,
    #[serde(rename = "rplStake")]
    pub rpl_stake: f64,
    #[serde(rename = "effectiveRPLStake")]
    pub effective_rpl_stake: f64,
    #[serde(rename = "minimumRPLStake")]
    pub minimum_rpl_stake: f64,
    #[serde(rename = "maximumRPLStake")]
    pub maximum_rpl_stake: f64,
    pub minipool_count: u64,
    pub eth_matched: f64,
    pub smoothing_pool_registration_state: bool,
}

impl From<&NodeDetails> for NodeDetailsResponse {
    fn from(details: &NodeDetails) -> Self {
        Self {
            address: details.address.to_checksum(None),
            timezone: details.timezone_location.clone(),
            formatted_registration_date: format_registration_date(details.registration_time),
            balance_eth: coins(details.balance_eth),
            balance_rpl: coins(details.balance_rpl),
            rpl_stake: coins(details.rpl_stake),
            effective_rpl_stake: coins(details.effective_rpl_stake),
            minimum_rpl_stake: coins(details.minimum_rpl_stake),
            maximum_rpl_stake: coins(details.maximum_rpl_stake),
            minipool_count: details.minipool_count,
            eth_matched: coins(details.eth_matched),
            smoothing_pool_registration_state: details.smoothing_pool_registration_state,
        }
    }
}

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MinipoolResponse {
    pub address: String,
    pub balance: f64,
    pub node_deposit_balance: f64,
    pub node_refund_balance: f64,
    pub minipool_commission_rate: f64,
    pub node_share: f64,
    pub user_share: f64,
}

impl From<&MinipoolDetail> for MinipoolResponse {
    /// `userShare` is what is left of the rounded balance after the rounded
    /// node share, so the shown shares add up to the shown balance.
    fn from(detail: &MinipoolDetail) -> Self {
        let balance = coins(detail.balance);
        let node_share = coins(detail.node_share);
        Self {
            address: detail.address.to_checksum(None),
            balance,
            node_deposit_balance: coins(detail.node_deposit_balance),
            node_refund_balance: coins(detail.node_refund_balance),
            minipool_commission_rate: coins(detail.commission_rate),
            node_share,
            user_share: round_to((balance - node_share).max(0.0), COIN_DECIMALS),
        }
    }
}

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MinipoolManagerResponse {
    pub minipool_count: u64,
    pub active_minipool_count: u64,
    pub finalised_minipool_count: u64,
    pub validating_minipool_count: u64,
    pub minipool_addresses: Vec<String>,
    pub minipools: Vec<MinipoolResponse>,
}

impl MinipoolManagerResponse {
    pub fn new(summary: &MinipoolSummary, details: &[MinipoolDetail]) -> Self {
        Self {
            minipool_count: summary.total,
            active_minipool_count: summary.active,
            finalised_minipool_count: summary.finalised,
            validating_minipool_count: summary.validating,
            minipool_addresses: checksummed(&summary.addresses),
            minipools: details.iter().map(MinipoolResponse::from).collect(),
        }
    }
}

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct NetworkResponse {
    pub network_node_count: u64,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct NodeAddressEntry {
    pub address: String,
}

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AllAddressesResponse {
    pub all_node_addresses_array: Vec<NodeAddressEntry>,
}

/// Data behind the `/node/{address}` page.
#[derive(Serialize, Clone, Debug)]
pub struct NodePageResponse {
    pub node: NodePageNode,
    pub prices: PricesResponse,
}

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct NodePageNode {
    #[serde(flatten)]
    pub details: NodeDetailsResponse,
    pub minipools_total: u64,
    pub minipools_active: u64,
    pub minipools_finalized: u64,
    pub minipools_validating: u64,
    pub minipool_addresses: Vec<String>,
}

impl NodePageNode {
    pub fn new(details: &NodeDetails, summary: &MinipoolSummary) -> Self {
        Self {
            details: details.into(),
            minipools_total: summary.total,
            minipools_active: summary.active,
            minipools_finalized: summary.finalised,
            minipools_validating: summary.validating,
            minipool_addresses: checksummed(&summary.addresses),
        }
    }
}

#[derive(Serialize, Clone, Debug, Default)]
pub struct PricesResponse {
    pub eth: Option<f64>,
    pub rpl: Option<f64>,
}

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct IndexResponse {
    pub node_address: Option<String>,
}

/// Body of the node search form.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SetAddressForm {
    pub node_address: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct NodeAddressQuery {
    pub node_address: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MinipoolAddressQuery {
    pub minipool_address: Option<String>,
}

fn checksummed(addresses: &[Address]) -> Vec<String> {
    addresses.iter().map(|a| a.to_checksum(None)).collect()
}
