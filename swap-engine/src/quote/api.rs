//! The aggregator HTTP API client and its wire types
//!
//! Wire types follow the 0x allowance-holder quote schema, as defined in
//! <https://0x.org/docs/api#tag/Swap>

use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::Value;
use tracing::error;

use crate::error::SwapError;

// -------------
// | Constants |
// -------------

/// The 0x api key header
const API_KEY_HEADER: &str = "0x-api-key";
/// The default base URL for the aggregator API
const DEFAULT_BASE_URL: &str = "https://api.0x.org/swap/allowance-holder";
/// The endpoint for getting a quote
const QUOTE_ENDPOINT: &str = "quote";

// --------------
// | Wire Types |
// --------------

/// The parameters of a quote request
#[derive(Debug, Clone)]
pub struct QuoteRequest {
    /// The chain to quote on
    pub chain_id: u64,
    /// The token being sold
    pub sell_token: Address,
    /// The token being bought
    pub buy_token: Address,
    /// The sell amount, in the sell token's smallest unit
    pub sell_amount: U256,
    /// The account that will execute the swap
    pub taker: Address,
    /// The slippage tolerance, in basis points
    pub slippage_bps: u16,
}

/// A quote response from the aggregator
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    /// The buy amount, in the buy token's smallest unit
    pub buy_amount: String,
    /// The transaction to submit to execute the quote
    pub transaction: QuoteTransaction,
    /// Issues the aggregator detected with the quote
    #[serde(default)]
    pub issues: Option<QuoteIssues>,
    /// The route the quote executes across
    #[serde(default)]
    pub route: Option<QuoteRoute>,
    /// The estimated price impact, as a percentage string
    #[serde(default)]
    pub estimated_price_impact: Option<String>,
}

/// The transaction fields of a quote
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteTransaction {
    /// The contract to call
    pub to: Address,
    /// The calldata
    pub data: Bytes,
    /// The native value to attach, as a decimal string
    pub value: String,
    /// The estimated gas limit, as a decimal string
    #[serde(default)]
    pub gas: Option<String>,
    /// The estimated gas price in wei, as a decimal string
    #[serde(default)]
    pub gas_price: Option<String>,
}

/// Issues the aggregator detected with a quote
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteIssues {
    /// Present when the taker's balance does not cover the sell amount
    #[serde(default)]
    pub balance: Option<Value>,
    /// Present when the taker's allowance does not cover the sell amount
    #[serde(default)]
    pub allowance: Option<AllowanceIssue>,
}

/// An allowance shortfall reported by the aggregator
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllowanceIssue {
    /// The contract that must be approved to spend the sell token
    pub spender: Address,
}

/// The route of a quote
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRoute {
    /// The fills composing the route, in execution order
    #[serde(default)]
    pub fills: Vec<QuoteFill>,
}

/// One fill of a quoted route
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteFill {
    /// The liquidity source the fill executes against
    pub source: String,
}

// ---------
// | Trait |
// ---------

/// The aggregator boundary used by the quote engine
#[async_trait]
pub trait AggregatorApi: Send + Sync {
    /// Fetch a priced route for the given request
    async fn fetch_quote(&self, request: &QuoteRequest) -> Result<QuoteResponse, SwapError>;
}

// ----------
// | Client |
// ----------

/// A client for the 0x allowance-holder swap API
#[derive(Clone)]
pub struct ZeroExClient {
    /// The API key to use for requests
    api_key: String,
    /// The base URL for the aggregator
    base_url: String,
    /// The underlying HTTP client
    http_client: Client,
}

impl ZeroExClient {
    /// Create a new client against the production API
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL.to_string())
    }

    /// Create a new client against a custom base URL
    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        Self { api_key, base_url, http_client: Client::new() }
    }

    /// Get a full URL for a given endpoint
    fn build_url(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<Url, SwapError> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), endpoint);
        Url::parse_with_params(&url, params).map_err(SwapError::parse)
    }
}

#[async_trait]
impl AggregatorApi for ZeroExClient {
    async fn fetch_quote(&self, request: &QuoteRequest) -> Result<QuoteResponse, SwapError> {
        let chain_id = request.chain_id.to_string();
        let sell_token = request.sell_token.to_string();
        let buy_token = request.buy_token.to_string();
        let sell_amount = request.sell_amount.to_string();
        let taker = request.taker.to_string();
        let slippage_bps = request.slippage_bps.to_string();
        let params = [
            ("chainId", chain_id.as_str()),
            ("sellToken", sell_token.as_str()),
            ("buyToken", buy_token.as_str()),
            ("sellAmount", sell_amount.as_str()),
            ("taker", taker.as_str()),
            ("slippageBps", slippage_bps.as_str()),
        ];

        let url = self.build_url(QUOTE_ENDPOINT, &params)?;
        let response = self
            .http_client
            .get(url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body: Value = response.json().await.unwrap_or(Value::Null);
            let reason = extract_error_reason(&body);
            error!("aggregator quote failed ({status}): {reason}");
            return Err(SwapError::aggregator(status.as_u16(), reason));
        }

        response.json::<QuoteResponse>().await.map_err(SwapError::parse)
    }
}

/// Pull the failure reason out of an aggregator error body
fn extract_error_reason(body: &Value) -> String {
    body["reason"]
        .as_str()
        .or_else(|| body["description"].as_str())
        .unwrap_or("unknown aggregator error")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Error bodies surface `reason` first, then `description`
    #[test]
    fn test_extract_error_reason() {
        let body = serde_json::json!({ "reason": "INSUFFICIENT_ASSET_LIQUIDITY" });
        assert_eq!(extract_error_reason(&body), "INSUFFICIENT_ASSET_LIQUIDITY");

        let body = serde_json::json!({ "description": "rate limited" });
        assert_eq!(extract_error_reason(&body), "rate limited");

        assert_eq!(extract_error_reason(&Value::Null), "unknown aggregator error");
    }

    /// The quote response deserializes from the aggregator's camelCase
    /// schema
    #[test]
    fn test_quote_response_schema() {
        let raw = r#"{
            "buyAmount": "2500000000",
            "transaction": {
                "to": "0x0000000000001ff3684f28c67538d4d072c22734",
                "data": "0xdeadbeef",
                "value": "1000000000000000000",
                "gas": "250000",
                "gasPrice": "15000000"
            },
            "issues": {
                "allowance": { "spender": "0x0000000000001ff3684f28c67538d4d072c22734" }
            },
            "route": { "fills": [{ "source": "Uniswap_V3" }, { "source": "Aerodrome" }] },
            "estimatedPriceImpact": "0.12"
        }"#;

        let quote: QuoteResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(quote.buy_amount, "2500000000");
        assert_eq!(quote.transaction.gas.as_deref(), Some("250000"));
        assert!(quote.issues.unwrap().allowance.is_some());
        let sources: Vec<_> =
            quote.route.unwrap().fills.into_iter().map(|f| f.source).collect();
        assert_eq!(sources, vec!["Uniswap_V3", "Aerodrome"]);
        assert_eq!(quote.estimated_price_impact.as_deref(), Some("0.12"));
    }
}
