use actix_web::cookie::Cookie;
use actix_web::http::header::{self, CacheControl, CacheDirective};
use actix_web::{HttpRequest, HttpResponse, get, post, web};
use log::{error, info};

use crate::aggregator::Aggregator;
use crate::contracts::parse_address;
use crate::error::FetchError;
use crate::models::{
    AllAddressesResponse, IndexResponse, MinipoolAddressQuery, MinipoolManagerResponse,
    MinipoolResponse, NetworkResponse, NodeAddressEntry, NodeAddressQuery, NodeDetailsResponse,
    NodePageNode, NodePageResponse, PricesResponse, SetAddressForm,
};
use crate::prices::PriceClient;

pub const NODE_ADDRESS_COOKIE: &str = "nodeAddress";

const PRICE_MAX_AGE: u32 = 30;
const CONTRACT_MAX_AGE: u32 = 600;

/// Shared by every worker. Holds clients only, never request data.
#[derive(Clone)]
pub struct AppState {
    pub aggregator: Aggregator,
    pub prices: PriceClient,
}

fn cache_for(seconds: u32) -> CacheControl {
    CacheControl(vec![CacheDirective::MaxAge(seconds)])
}

fn required(value: Option<String>, name: &'static str) -> Result<String, FetchError> {
    value.filter(|v| !v.trim().is_empty()).ok_or_else(|| {
        error!("[API] Request without {}", name);
        FetchError::MissingParameter(name)
    })
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(eth_price)
        .service(rpl_price)
        .service(network)
        .service(all_addresses)
        .service(rocket_node_manager)
        .service(single_minipool_data)
        .service(minipool_manager)
        .service(index)
        .service(set_address)
        .service(node_page);
}

#[get("/api/prices/eth")]
async fn eth_price(state: web::Data<AppState>) -> HttpResponse {
    let price = state.prices.get_price("ETH").await;
    HttpResponse::Ok().insert_header(cache_for(PRICE_MAX_AGE)).json(price)
}

#[get("/api/prices/rpl")]
async fn rpl_price(state: web::Data<AppState>) -> HttpResponse {
    let price = state.prices.get_price("RPL").await;
    HttpResponse::Ok().insert_header(cache_for(PRICE_MAX_AGE)).json(price)
}

#[get("/api/rocket-pool/network")]
async fn network(state: web::Data<AppState>) -> Result<HttpResponse, FetchError> {
    let network_node_count = state.aggregator.network_node_count().await.inspect_err(|e| {
        error!("[API] Failed to get network node count: {}", e);
    })?;
    Ok(HttpResponse::Ok().json(NetworkResponse { network_node_count }))
}

#[get("/api/rocket-pool/network/all-addresses")]
async fn all_addresses(state: web::Data<AppState>) -> Result<HttpResponse, FetchError> {
    let addresses = state.aggregator.all_node_addresses().await.inspect_err(|e| {
        error!("[API] Failed to list node addresses: {}", e);
    })?;
    let all_node_addresses_array = addresses
        .iter()
        .map(|a| NodeAddressEntry {
            address: a.to_checksum(None),
        })
        .collect();
    Ok(HttpResponse::Ok().json(AllAddressesResponse {
        all_node_addresses_array,
    }))
}

#[get("/api/rocket-pool/rocket-node-manager")]
async fn rocket_node_manager(
    state: web::Data<AppState>,
    query: web::Query<NodeAddressQuery>,
) -> Result<HttpResponse, FetchError> {
    let node_address = required(query.into_inner().node_address, "nodeAddress")?;
    let details = state.aggregator.node_details(&node_address).await.inspect_err(|e| {
        error!("[API] Failed to get node details for {}: {}", node_address, e);
    })?;
    Ok(HttpResponse::Ok()
        .insert_header(cache_for(CONTRACT_MAX_AGE))
        .json(NodeDetailsResponse::from(&details)))
}

#[get("/api/rocket-pool/minipool-manager")]
async fn minipool_manager(
    state: web::Data<AppState>,
    query: web::Query<NodeAddressQuery>,
) -> Result<HttpResponse, FetchError> {
    let node_address = required(query.into_inner().node_address, "nodeAddress")?;
    let result = state.aggregator.node_minipools(&node_address).await?;
    Ok(HttpResponse::Ok()
        .insert_header(cache_for(CONTRACT_MAX_AGE))
        .json(MinipoolManagerResponse::new(&result.summary, &result.minipools)))
}

#[get("/api/rocket-pool/minipool-manager/single-minipool-data")]
async fn single_minipool_data(
    state: web::Data<AppState>,
    query: web::Query<MinipoolAddressQuery>,
) -> Result<HttpResponse, FetchError> {
    let minipool_address = required(query.into_inner().minipool_address, "minipoolAddress")?;
    info!("[API] Retrieving minipool data for {}", minipool_address);
    let minipool = parse_address(&minipool_address)
        .map_err(|_| FetchError::InvalidMinipoolAddress(minipool_address.clone()))?;
    let detail = state.aggregator.minipool_detail(minipool).await.inspect_err(|e| {
        error!("[API] Failed to read minipool {}: {}", minipool_address, e);
    })?;
    Ok(HttpResponse::Ok()
        .insert_header(cache_for(CONTRACT_MAX_AGE))
        .json(MinipoolResponse::from(&detail)))
}

/// Landing page data: the address searched last time, if any.
#[get("/")]
async fn index(req: HttpRequest) -> HttpResponse {
    let node_address = req.cookie(NODE_ADDRESS_COOKIE).map(|c| c.value().to_string());
    HttpResponse::Ok().json(IndexResponse { node_address })
}

#[post("/setAddress")]
async fn set_address(form: web::Form<SetAddressForm>) -> HttpResponse {
    let node_address = form.into_inner().node_address.trim().to_string();
    info!("[API] Setting cookie for node address {}", node_address);

    let cookie = Cookie::build(NODE_ADDRESS_COOKIE, node_address.clone())
        .path("/")
        .permanent()
        .finish();
    HttpResponse::SeeOther()
        .cookie(cookie)
        .insert_header((header::LOCATION, format!("/node/{node_address}")))
        .finish()
}

#[get("/node/{address}")]
async fn node_page(state: web::Data<AppState>, address: web::Path<String>) -> Result<HttpResponse, FetchError> {
    let address = address.into_inner();
    let (details, summary) = state.aggregator.node_page(&address).await.inspect_err(|e| {
        error!("[API] Failed to load node page for {}: {}", address, e);
    })?;
    let (eth, rpl) = tokio::join!(state.prices.get_price("ETH"), state.prices.get_price("RPL"));

    Ok(HttpResponse::Ok().json(NodePageResponse {
        node: NodePageNode::new(&details, &summary),
        prices: PricesResponse { eth, rpl },
    }))
}
