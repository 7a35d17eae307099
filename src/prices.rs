use log::{debug, error};
use reqwest::Client;
use serde_json::Value;

use crate::error::FetchError;

/// USD spot prices from the CoinMarketCap quotes endpoint.
#[derive(Clone)]
pub struct PriceClient {
    client: Client,
    api_url: String,
    api_key: String,
}

impl PriceClient {
    pub fn new(client: Client, api_url: String, api_key: String) -> Self {
        Self {
            client,
            api_url,
            api_key,
        }
    }

    /// Returns the latest USD price for `symbol`, or `None` if anything goes
    /// wrong. Failures are logged, never returned.
    pub async fn get_price(&self, symbol: &str) -> Option<f64> {
        match self.fetch_price(symbol).await {
            Ok(price) => {
                debug!("[Prices] {} = {}", symbol, price);
                Some(price)
            }
            Err(e) => {
                error!("[Prices] Failed to get {} price: {}", symbol, e);
                None
            }
        }
    }

    async fn fetch_price(&self, symbol: &str) -> Result<f64, FetchError> {
        let response = self
            .client
            .get(&self.api_url)
            .query(&[("symbol", symbol)])
            .header("X-CMC_PRO_API_KEY", &self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }
        extract_price(&response.json::<Value>().await?, symbol)
    }
}

/// Reads `data[SYMBOL][0].quote.USD.price` out of a quotes response.
pub fn extract_price(body: &Value, symbol: &str) -> Result<f64, FetchError> {
    body.pointer(&format!("/data/{symbol}/0/quote/USD/price"))
        .and_then(Value::as_f64)
        .ok_or_else(|| FetchError::Decode(format!("no USD price for {symbol}")))
}
