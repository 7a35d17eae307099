use alloy_contract::{ContractInstance, Interface};
use alloy_dyn_abi::DynSolValue;
use alloy_json_abi::{Function, JsonAbi};
use alloy_primitives::{Address, AddressError, U256};
use alloy_provider::{DynProvider, Provider};
use async_trait::async_trait;
use log::error;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{FetchError, InvalidNodeAddress};
use crate::explorer::Explorer;

pub const ROCKET_NODE_MANAGER_ABI: &str = include_str!("../abi/RocketNodeManager.json");
pub const ROCKET_MINIPOOL_MANAGER_ABI: &str = include_str!("../abi/RocketMinipoolManager.json");
pub const ROCKET_MINIPOOL_BASE_ABI: &str = include_str!("../abi/RocketMinipoolBase.json");

/// A deployed contract bound to a provider, with its ABI kept at hand for
/// reading struct component names.
pub struct Contract {
    abi: Arc<JsonAbi>,
    instance: ContractInstance<DynProvider>,
}

/// Builds a contract handle from an address and a JSON ABI.
pub fn create_contract(address: Address, abi: &str, provider: DynProvider) -> Result<Contract, FetchError> {
    let abi: JsonAbi = serde_json::from_str(abi)?;
    Ok(Contract::new(address, Arc::new(abi), provider))
}

impl Contract {
    pub fn new(address: Address, abi: Arc<JsonAbi>, provider: DynProvider) -> Self {
        let interface = Interface::new(JsonAbi::clone(&abi));
        Self {
            instance: ContractInstance::new(address, provider, interface),
            abi,
        }
    }

    fn function(&self, name: &str) -> Result<&Function, FetchError> {
        self.abi
            .function(name)
            .and_then(|overloads| overloads.first())
            .ok_or_else(|| FetchError::MissingFunction(name.to_string()))
    }

    /// Runs a read-only call against the latest block.
    pub async fn call(&self, name: &str, args: &[DynSolValue]) -> Result<Vec<DynSolValue>, FetchError> {
        Ok(self.instance.function(name, args)?.call().await?)
    }

    async fn call_single(&self, name: &str, args: &[DynSolValue]) -> Result<DynSolValue, FetchError> {
        self.call(name, args)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| FetchError::Decode(format!("{name} returned nothing")))
    }

    async fn call_uint(&self, name: &str, args: &[DynSolValue]) -> Result<U256, FetchError> {
        as_uint(&self.call_single(name, args).await?, name)
    }

    async fn call_address(&self, name: &str, args: &[DynSolValue]) -> Result<Address, FetchError> {
        let value = self.call_single(name, args).await?;
        value
            .as_address()
            .ok_or_else(|| FetchError::Decode(format!("{name} returned {value:?}")))
    }

    /// Names of the components of the first output, for struct returns.
    fn output_components(&self, name: &str) -> Result<Vec<String>, FetchError> {
        let function = self.function(name)?;
        let output = function
            .outputs
            .first()
            .ok_or_else(|| FetchError::Decode(format!("{name} has no outputs")))?;
        Ok(output.components.iter().map(|c| c.name.clone()).collect())
    }
}

fn as_uint(value: &DynSolValue, what: &str) -> Result<U256, FetchError> {
    value
        .as_uint()
        .map(|(v, _)| v)
        .ok_or_else(|| FetchError::Decode(format!("{what} returned {value:?}")))
}

fn as_u64(value: U256, what: &str) -> Result<u64, FetchError> {
    u64::try_from(value).map_err(|_| FetchError::Decode(format!("{what} out of range: {value}")))
}

/// Parses a user-supplied address. Mixed-case input must carry a valid EIP-55
/// checksum; all-lowercase or all-uppercase hex is accepted as is.
pub fn parse_address(input: &str) -> Result<Address, InvalidNodeAddress> {
    let trimmed = input.trim();
    let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let mixed_case = digits.chars().any(|c| c.is_ascii_uppercase())
        && digits.chars().any(|c| c.is_ascii_lowercase());

    let parsed = if mixed_case {
        Address::parse_checksummed(trimmed, None)
    } else {
        Address::from_str(trimmed).map_err(AddressError::Hex)
    };

    parsed.map_err(|e| {
        error!("[Chain] Rejected address {}: {}", input, e);
        InvalidNodeAddress::new(input)
    })
}

fn tuple_field<'a>(names: &[String], values: &'a [DynSolValue], name: &str) -> Result<&'a DynSolValue, FetchError> {
    names
        .iter()
        .position(|n| n == name)
        .and_then(|i| values.get(i))
        .ok_or_else(|| FetchError::Decode(format!("NodeDetails.{name} missing")))
}

/// Node fields read from `RocketNodeManager.getNodeDetails`.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeDetails {
    pub address: Address,
    pub registration_time: u64,
    pub timezone_location: String,
    pub balance_eth: U256,
    pub balance_rpl: U256,
    pub rpl_stake: U256,
    pub effective_rpl_stake: U256,
    pub minimum_rpl_stake: U256,
    pub maximum_rpl_stake: U256,
    pub minipool_count: u64,
    pub eth_matched: U256,
    pub smoothing_pool_registration_state: bool,
}

impl NodeDetails {
    /// Picks the fields we use out of the decoded `NodeDetails` struct,
    /// matching tuple members by their ABI names.
    fn from_tuple(address: Address, names: &[String], values: &[DynSolValue]) -> Result<Self, FetchError> {
        let field = |name: &str| tuple_field(names, values, name);
        let uint = |name: &str| tuple_field(names, values, name).and_then(|v| as_uint(v, name));

        Ok(Self {
            address,
            registration_time: as_u64(uint("registrationTime")?, "registrationTime")?,
            timezone_location: field("timezoneLocation")?
                .as_str()
                .unwrap_or_default()
                .to_string(),
            balance_eth: uint("balanceETH")?,
            balance_rpl: uint("balanceRPL")?,
            rpl_stake: uint("rplStake")?,
            effective_rpl_stake: uint("effectiveRPLStake")?,
            minimum_rpl_stake: uint("minimumRPLStake")?,
            maximum_rpl_stake: uint("maximumRPLStake")?,
            minipool_count: as_u64(uint("minipoolCount")?, "minipoolCount")?,
            eth_matched: uint("ethMatched")?,
            smoothing_pool_registration_state: field("smoothingPoolRegistrationState")?
                .as_bool()
                .unwrap_or_default(),
        })
    }
}

/// Every on-chain read the aggregation needs. One method per contract call.
#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn node_details(&self, node: Address) -> Result<NodeDetails, FetchError>;
    async fn smoothing_pool_registration_state(&self, node: Address) -> Result<bool, FetchError>;
    async fn node_count(&self) -> Result<u64, FetchError>;
    async fn node_addresses(&self, offset: u64, limit: u64) -> Result<Vec<Address>, FetchError>;

    async fn node_minipool_count(&self, node: Address) -> Result<u64, FetchError>;
    async fn node_active_minipool_count(&self, node: Address) -> Result<u64, FetchError>;
    async fn node_finalised_minipool_count(&self, node: Address) -> Result<u64, FetchError>;
    async fn node_validating_minipool_count(&self, node: Address) -> Result<u64, FetchError>;
    async fn node_minipool_at(&self, node: Address, index: u64) -> Result<Address, FetchError>;

    async fn balance(&self, address: Address) -> Result<U256, FetchError>;

    /// Resolves the minipool's delegate and returns a handle for the minipool
    /// address that speaks the delegate's ABI.
    async fn minipool_delegate(&self, minipool: Address) -> Result<Contract, FetchError>;
    async fn node_deposit_balance(&self, minipool: &Contract) -> Result<U256, FetchError>;
    async fn node_fee(&self, minipool: &Contract) -> Result<U256, FetchError>;
    async fn node_refund_balance(&self, minipool: &Contract) -> Result<U256, FetchError>;
    async fn calculate_node_share(&self, minipool: &Contract, balance: U256) -> Result<U256, FetchError>;
}

/// Node details for a user-supplied address. A malformed address gives the
/// `InvalidNodeAddress` sentinel rather than an RPC round trip.
pub async fn get_node_details(chain: &dyn ChainReader, node_address: &str) -> Result<NodeDetails, FetchError> {
    let node = parse_address(node_address).map_err(FetchError::InvalidNodeAddress)?;
    chain.node_details(node).await.inspect_err(|e| {
        error!("[Chain] getNodeDetails({}) failed: {}", node_address, e);
    })
}

/// Reads `count` minipool addresses one index at a time, in registration order.
pub async fn get_minipool_addresses(
    chain: &dyn ChainReader,
    node: Address,
    count: u64,
) -> Result<Vec<Address>, FetchError> {
    let mut addresses = Vec::new();
    for index in 0..count {
        addresses.push(chain.node_minipool_at(node, index).await?);
    }
    Ok(addresses)
}

/// Reads Rocket Pool state over JSON-RPC.
pub struct RocketPool {
    provider: DynProvider,
    node_manager: Contract,
    minipool_manager: Contract,
    minipool_base_abi: Arc<JsonAbi>,
    explorer: Explorer,
}

impl RocketPool {
    pub fn new(
        provider: DynProvider,
        node_manager: Address,
        minipool_manager: Address,
        explorer: Explorer,
    ) -> Result<Self, FetchError> {
        let minipool_base_abi: JsonAbi = serde_json::from_str(ROCKET_MINIPOOL_BASE_ABI)?;
        Ok(Self {
            node_manager: create_contract(node_manager, ROCKET_NODE_MANAGER_ABI, provider.clone())?,
            minipool_manager: create_contract(minipool_manager, ROCKET_MINIPOOL_MANAGER_ABI, provider.clone())?,
            minipool_base_abi: Arc::new(minipool_base_abi),
            provider,
            explorer,
        })
    }

    async fn minipool_manager_count(&self, name: &str, node: Address) -> Result<u64, FetchError> {
        let count = self
            .minipool_manager
            .call_uint(name, &[DynSolValue::Address(node)])
            .await?;
        as_u64(count, name)
    }
}

#[async_trait]
impl ChainReader for RocketPool {
    async fn node_details(&self, node: Address) -> Result<NodeDetails, FetchError> {
        let names = self.node_manager.output_components("getNodeDetails")?;
        let value = self
            .node_manager
            .call_single("getNodeDetails", &[DynSolValue::Address(node)])
            .await?;
        let values = value
            .as_tuple()
            .ok_or_else(|| FetchError::Decode(format!("getNodeDetails returned {value:?}")))?;
        NodeDetails::from_tuple(node, &names, values)
    }

    async fn smoothing_pool_registration_state(&self, node: Address) -> Result<bool, FetchError> {
        let value = self
            .node_manager
            .call_single("getSmoothingPoolRegistrationState", &[DynSolValue::Address(node)])
            .await?;
        value
            .as_bool()
            .ok_or_else(|| FetchError::Decode(format!("smoothing pool state {value:?}")))
    }

    async fn node_count(&self) -> Result<u64, FetchError> {
        as_u64(self.node_manager.call_uint("getNodeCount", &[]).await?, "getNodeCount")
    }

    async fn node_addresses(&self, offset: u64, limit: u64) -> Result<Vec<Address>, FetchError> {
        let args = [
            DynSolValue::Uint(U256::from(offset), 256),
            DynSolValue::Uint(U256::from(limit), 256),
        ];
        let value = self.node_manager.call_single("getNodeAddresses", &args).await?;
        let items = value
            .as_array()
            .ok_or_else(|| FetchError::Decode(format!("getNodeAddresses returned {value:?}")))?;
        items
            .iter()
            .map(|item| {
                item.as_address()
                    .ok_or_else(|| FetchError::Decode(format!("node address {item:?}")))
            })
            .collect()
    }

    async fn node_minipool_count(&self, node: Address) -> Result<u64, FetchError> {
        self.minipool_manager_count("getNodeMinipoolCount", node).await
    }

    async fn node_active_minipool_count(&self, node: Address) -> Result<u64, FetchError> {
        self.minipool_manager_count("getNodeActiveMinipoolCount", node).await
    }

    async fn node_finalised_minipool_count(&self, node: Address) -> Result<u64, FetchError> {
        self.minipool_manager_count("getNodeFinalisedMinipoolCount", node).await
    }

    async fn node_validating_minipool_count(&self, node: Address) -> Result<u64, FetchError> {
        self.minipool_manager_count("getNodeValidatingMinipoolCount", node).await
    }

    async fn node_minipool_at(&self, node: Address, index: u64) -> Result<Address, FetchError> {
        let args = [DynSolValue::Address(node), DynSolValue::Uint(U256::from(index), 256)];
        self.minipool_manager.call_address("getNodeMinipoolAt", &args).await
    }

    async fn balance(&self, address: Address) -> Result<U256, FetchError> {
        Ok(self.provider.get_balance(address).await?)
    }

    async fn minipool_delegate(&self, minipool: Address) -> Result<Contract, FetchError> {
        let base = Contract::new(minipool, self.minipool_base_abi.clone(), self.provider.clone());
        let delegate = base.call_address("getDelegate", &[]).await?;
        let abi = self.explorer.contract_abi(delegate).await?;
        Ok(Contract::new(minipool, abi, self.provider.clone()))
    }

    async fn node_deposit_balance(&self, minipool: &Contract) -> Result<U256, FetchError> {
        minipool.call_uint("getNodeDepositBalance", &[]).await
    }

    async fn node_fee(&self, minipool: &Contract) -> Result<U256, FetchError> {
        minipool.call_uint("getNodeFee", &[]).await
    }

    async fn node_refund_balance(&self, minipool: &Contract) -> Result<U256, FetchError> {
        minipool.call_uint("getNodeRefundBalance", &[]).await
    }

    async fn calculate_node_share(&self, minipool: &Contract, balance: U256) -> Result<U256, FetchError> {
        minipool
            .call_uint("calculateNodeShare", &[DynSolValue::Uint(balance, 256)])
            .await
    }
}
