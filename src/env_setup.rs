use std::fs::File;
use std::io::Write;
use std::path::Path;

pub fn setup_env() -> std::io::Result<()> {
    let env_path = Path::new(".env");
    if !env_path.exists() {
        let mut file = File::create(env_path)?;
        let content = r#"
SERVER_PORT=8080
RPC_URL="https://ethereum-rpc.publicnode.com"
COINMARKETCAP_API_KEY=""
PRICE_API_URL="https://pro-api.coinmarketcap.com/v2/cryptocurrency/quotes/latest"
ETHERSCAN_API_KEY=""
EXPLORER_API_URL="https://api.etherscan.io/v2/api"
CHAIN_ID=1
ROCKET_NODE_MANAGER_ADDRESS="0x89F478E6Cc24f052103628f36598D4C14Da3D287"
ROCKET_MINIPOOL_MANAGER_ADDRESS="0x6293B8abC1F36aFB22406Be5f96D893072A8cF3a"
FETCH_TIMEOUT_SECONDS=30
ABI_CACHE_TTL_SECONDS=3600
RETRY_MAX_TIMES=3
RETRY_MIN_DELAY_MS=1000
MINIPOOL_FETCH_CONCURRENCY=4
RUST_LOG=info
"#;
        file.write_all(content.as_bytes())?;
        println!("[Env] Created .env file with default configurations.");
    }
    Ok(())
}
