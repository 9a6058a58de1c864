//! Quoting logic: translating a trade intent into a priced, executable
//! route

pub mod api;
pub mod debounce;

use std::sync::Arc;

use alloy_primitives::{Address, U256};
use tokio::time::Instant;
use tracing::{info, instrument};

use crate::{
    amount::{format_units_full, min_buy_amount, parse_units},
    chain::{ChainClient, TxPayload},
    config::{ChainConfig, SlippageBps},
    error::SwapError,
    quote::api::{AggregatorApi, QuoteRequest, QuoteResponse},
    tokens::Token,
};

// -------------
// | Constants |
// -------------

/// The price impact above which a quote is considered medium
const MEDIUM_PRICE_IMPACT_PCT: f64 = 1.0;
/// The price impact above which a quote is considered high
const HIGH_PRICE_IMPACT_PCT: f64 = 3.0;
/// The price impact above which a quote is considered critical
const CRITICAL_PRICE_IMPACT_PCT: f64 = 5.0;

/// The wei value of one native token
const ONE_ETH_WEI: f64 = 1e18;

// ---------
// | Types |
// ---------

/// The display severity of a quote's price impact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceImpactSeverity {
    /// Negligible deviation from the reference price
    Low,
    /// Noticeable deviation; worth surfacing to the user
    Medium,
    /// Large deviation; the trade size is moving the market
    High,
    /// Severe deviation; the trade should probably be split up
    Critical,
}

/// A priced, executable quote
///
/// Superseded, never mutated: each successful aggregator response
/// produces a fresh quote, and the executor always re-fetches before
/// submission rather than re-validating a displayed quote.
#[derive(Debug, Clone)]
pub struct Quote {
    /// The token being sold
    pub sell_token: Token,
    /// The token being bought
    pub buy_token: Token,
    /// The sell amount, in the sell token's smallest unit
    pub sell_amount_raw: U256,
    /// The sell amount, formatted at full precision
    pub sell_amount_formatted: String,
    /// The buy amount, in the buy token's smallest unit
    pub buy_amount_raw: U256,
    /// The buy amount, formatted at full precision
    pub buy_amount_formatted: String,
    /// The minimum acceptable output under the slippage tolerance, in
    /// the buy token's smallest unit
    pub min_buy_amount_raw: U256,
    /// The minimum acceptable output, formatted at full precision
    pub min_buy_amount_formatted: String,
    /// The estimated price impact, as a percentage
    pub estimated_price_impact_pct: Option<f64>,
    /// The estimated gas cost of the swap, in the native asset
    pub gas_cost_estimate_eth: Option<f64>,
    /// The liquidity sources of the route, in execution order
    pub route: Vec<String>,
    /// The spender needing approval, when the aggregator reported an
    /// allowance shortfall that still holds on-chain
    pub allowance_issue: Option<Address>,
    /// Whether the aggregator reported a balance shortfall
    pub balance_issue: bool,
    /// The transaction payload to submit to execute the quote
    pub tx: TxPayload,
    /// When the quote was fetched
    pub fetched_at: Instant,
}

impl Quote {
    /// The display severity of the quote's price impact
    pub fn price_impact_severity(&self) -> PriceImpactSeverity {
        match self.estimated_price_impact_pct {
            Some(pct) if pct >= CRITICAL_PRICE_IMPACT_PCT => PriceImpactSeverity::Critical,
            Some(pct) if pct >= HIGH_PRICE_IMPACT_PCT => PriceImpactSeverity::High,
            Some(pct) if pct >= MEDIUM_PRICE_IMPACT_PCT => PriceImpactSeverity::Medium,
            _ => PriceImpactSeverity::Low,
        }
    }
}

// ----------
// | Engine |
// ----------

/// The quote engine
pub struct QuoteEngine {
    /// The chain client used for balance and allowance reads
    chain: Arc<dyn ChainClient>,
    /// The aggregator quotes are fetched from
    aggregator: Arc<dyn AggregatorApi>,
    /// The network the engine quotes on
    config: ChainConfig,
}

impl QuoteEngine {
    /// Create a new engine
    pub fn new(
        chain: Arc<dyn ChainClient>,
        aggregator: Arc<dyn AggregatorApi>,
        config: ChainConfig,
    ) -> Self {
        Self { chain, aggregator, config }
    }

    /// Fetch a priced quote for the given trade intent
    ///
    /// The balance check runs before the aggregator call so that an
    /// uncovered amount fails fast with a precise shortfall message
    /// instead of burning a quote request.
    #[instrument(
        skip_all,
        fields(
            sell = %sell_token.symbol,
            buy = %buy_token.symbol,
            amount = %sell_amount_human
        )
    )]
    pub async fn get_quote(
        &self,
        taker: Address,
        sell_token: &Token,
        buy_token: &Token,
        sell_amount_human: &str,
        slippage: SlippageBps,
    ) -> Result<Quote, SwapError> {
        let sell_amount = parse_units(sell_amount_human, sell_token.decimals)?;
        if sell_amount.is_zero() {
            return Err(SwapError::invalid_amount("amount must be positive"));
        }

        self.check_balance(taker, sell_token, sell_amount).await?;

        let request = QuoteRequest {
            chain_id: self.config.chain_id,
            sell_token: sell_token.address,
            buy_token: buy_token.address,
            sell_amount,
            taker,
            slippage_bps: slippage.bps(),
        };
        let response = self.aggregator.fetch_quote(&request).await?;

        let quote =
            self.enrich_quote(taker, sell_token, buy_token, sell_amount, slippage, response).await?;
        info!(
            "quoted {} {} -> {} {}",
            quote.sell_amount_formatted,
            sell_token.symbol,
            quote.buy_amount_formatted,
            buy_token.symbol
        );

        Ok(quote)
    }

    // -----------
    // | Helpers |
    // -----------

    /// Verify the taker's balance covers the sell amount
    async fn check_balance(
        &self,
        taker: Address,
        sell_token: &Token,
        sell_amount: U256,
    ) -> Result<(), SwapError> {
        let balance = if sell_token.is_native() {
            self.chain.native_balance(taker).await?
        } else {
            self.chain.erc20_balance(sell_token.address, taker).await?
        };

        if balance < sell_amount {
            return Err(SwapError::InsufficientBalance {
                symbol: sell_token.symbol.to_string(),
                required: format_units_full(sell_amount, sell_token.decimals),
                available: format_units_full(balance, sell_token.decimals),
            });
        }

        Ok(())
    }

    /// Build the enriched quote from an aggregator response
    async fn enrich_quote(
        &self,
        taker: Address,
        sell_token: &Token,
        buy_token: &Token,
        sell_amount: U256,
        slippage: SlippageBps,
        response: QuoteResponse,
    ) -> Result<Quote, SwapError> {
        let buy_amount =
            U256::from_str_radix(&response.buy_amount, 10).map_err(SwapError::parse)?;
        let min_buy = min_buy_amount(buy_amount, slippage);

        let allowance_issue =
            self.resolve_allowance_issue(taker, sell_token, sell_amount, &response).await?;
        let balance_issue =
            response.issues.as_ref().is_some_and(|issues| issues.balance.is_some());

        let route = response
            .route
            .map(|r| r.fills.into_iter().map(|fill| fill.source).collect())
            .unwrap_or_default();
        let estimated_price_impact_pct =
            response.estimated_price_impact.as_deref().and_then(|pct| pct.parse().ok());

        let tx = &response.transaction;
        let gas = tx.gas.as_deref().and_then(|g| g.parse::<u64>().ok());
        let gas_price = tx.gas_price.as_deref().and_then(|p| p.parse::<u128>().ok());
        let gas_cost_estimate_eth = gas
            .zip(gas_price)
            .map(|(gas, price)| gas as f64 * price as f64 / ONE_ETH_WEI);

        let value = U256::from_str_radix(&tx.value, 10).map_err(SwapError::parse)?;
        let tx = TxPayload { to: tx.to, data: tx.data.clone(), value, gas };

        Ok(Quote {
            sell_token: *sell_token,
            buy_token: *buy_token,
            sell_amount_raw: sell_amount,
            sell_amount_formatted: format_units_full(sell_amount, sell_token.decimals),
            buy_amount_raw: buy_amount,
            buy_amount_formatted: format_units_full(buy_amount, buy_token.decimals),
            min_buy_amount_raw: min_buy,
            min_buy_amount_formatted: format_units_full(min_buy, buy_token.decimals),
            estimated_price_impact_pct,
            gas_cost_estimate_eth,
            route,
            allowance_issue,
            balance_issue,
            tx,
            fetched_at: Instant::now(),
        })
    }

    /// Resolve an aggregator-reported allowance shortfall against the
    /// current on-chain allowance
    ///
    /// The native asset has no allowance concept, so it never carries an
    /// issue regardless of what the response claims.
    async fn resolve_allowance_issue(
        &self,
        taker: Address,
        sell_token: &Token,
        sell_amount: U256,
        response: &QuoteResponse,
    ) -> Result<Option<Address>, SwapError> {
        if sell_token.is_native() {
            return Ok(None);
        }

        let spender = match response.issues.as_ref().and_then(|i| i.allowance.as_ref()) {
            Some(issue) => issue.spender,
            None => return Ok(None),
        };

        let current = self.chain.allowance(sell_token.address, taker, spender).await?;
        if current < sell_amount {
            Ok(Some(spender))
        } else {
            Ok(None)
        }
    }
}
