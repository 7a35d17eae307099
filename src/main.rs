use actix_web::{App, HttpServer, web};
use dotenvy::dotenv;
use log::{error, info};
use std::sync::Arc;
mod aggregator;
mod config;
mod contracts;
mod env_setup;
mod error;
mod explorer;
mod formatters;
mod models;
mod prices;
mod routes;
mod rpc;
#[cfg(test)]
mod testing;
use aggregator::Aggregator;
use config::Config;
use contracts::RocketPool;
use explorer::Explorer;
use prices::PriceClient;
use routes::AppState;

fn startup_error(what: &str, e: impl std::fmt::Display) -> std::io::Error {
    error!("Failed to start {}: {}", what, e);
    std::io::Error::other(format!("{what} initialization failed"))
}

/// This is where the app starts.
///
/// It sets up everything: .env, logger, configuration, the RPC and API
/// clients, and finally, the web server.
#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Create a default .env file if needed, then load it.
    env_setup::setup_env()?;
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env().map_err(|e| startup_error("configuration", e))?;

    // One HTTP client for every upstream; it carries the fetch timeout.
    let client = reqwest::Client::builder()
        .timeout(config.fetch_timeout)
        .build()
        .map_err(|e| startup_error("http client", e))?;

    let explorer = Explorer::new(
        client.clone(),
        config.explorer_api_url.clone(),
        config.etherscan_api_key.clone(),
        config.chain_id,
        config.abi_cache_ttl,
    );
    let provider = rpc::connect(client.clone(), &config.rpc_url).map_err(|e| startup_error("rpc provider", e))?;
    let rocket_pool = RocketPool::new(
        provider,
        config.node_manager_address,
        config.minipool_manager_address,
        explorer,
    )
    .map_err(|e| startup_error("contracts", e))?;
    info!("[Main] Contracts are ready.");

    let state = AppState {
        aggregator: Aggregator::new(Arc::new(rocket_pool), config.retry, config.minipool_concurrency),
        prices: PriceClient::new(
            client,
            config.price_api_url.clone(),
            config.coinmarketcap_api_key.clone(),
        ),
    };

    let port = config.server_port;
    info!("Starting server on http://0.0.0.0:{}", port);
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .configure(routes::configure)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
