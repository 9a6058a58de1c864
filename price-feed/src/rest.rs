//! REST fallback providers for the reference price
//!
//! Used for the startup one-shot fetch and for polling mode once stream
//! attempts are exhausted. Providers are tried in order per cycle; the
//! first valid positive price wins.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::{error::PriceFeedError, transport::validate_price};

// -------------
// | Constants |
// -------------

/// The CoinGecko simple-price endpoint for ETH in USD
const COINGECKO_URL: &str =
    "https://api.coingecko.com/api/v3/simple/price?ids=ethereum&vs_currencies=usd";
/// The Coinbase spot-price endpoint for ETH in USD
const COINBASE_URL: &str = "https://api.coinbase.com/v2/prices/ETH-USD/spot";

/// The error message for a response missing its price field
const ERR_MISSING_PRICE: &str = "response missing price field";

// ---------
// | Trait |
// ---------

/// A one-shot REST source for the reference spot price
#[async_trait]
pub trait SpotPriceApi: Send + Sync {
    /// A short human-readable source name, e.g. `coingecko`
    fn name(&self) -> &str;

    /// Fetch the current spot price
    async fn fetch_spot(&self, client: &Client) -> Result<f64, PriceFeedError>;
}

// -------------
// | Providers |
// -------------

/// The CoinGecko simple-price provider
///
/// Response shape: `{"ethereum": {"usd": <price>}}`
#[derive(Debug, Clone, Default)]
pub struct CoinGeckoSpot;

#[async_trait]
impl SpotPriceApi for CoinGeckoSpot {
    fn name(&self) -> &str {
        "coingecko"
    }

    async fn fetch_spot(&self, client: &Client) -> Result<f64, PriceFeedError> {
        let body: Value = client.get(COINGECKO_URL).send().await?.json().await?;
        let price =
            body["ethereum"]["usd"].as_f64().ok_or(PriceFeedError::parse(ERR_MISSING_PRICE))?;

        validate_spot(price)
    }
}

/// The Coinbase spot-price provider
///
/// Response shape: `{"data": {"amount": "<price>"}}`
#[derive(Debug, Clone, Default)]
pub struct CoinbaseSpot;

#[async_trait]
impl SpotPriceApi for CoinbaseSpot {
    fn name(&self) -> &str {
        "coinbase"
    }

    async fn fetch_spot(&self, client: &Client) -> Result<f64, PriceFeedError> {
        let body: Value = client.get(COINBASE_URL).send().await?.json().await?;
        let price = body["data"]["amount"]
            .as_str()
            .and_then(|amount| amount.parse::<f64>().ok())
            .ok_or(PriceFeedError::parse(ERR_MISSING_PRICE))?;

        validate_spot(price)
    }
}

/// Validate a provider-reported spot price
fn validate_spot(price: f64) -> Result<f64, PriceFeedError> {
    if validate_price(price) {
        Ok(price)
    } else {
        Err(PriceFeedError::parse(format!("invalid spot price: {price}")))
    }
}
