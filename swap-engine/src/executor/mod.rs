//! The swap executor: driving a confirmed trade from intent to settled
//! transaction

pub mod classify;

use std::sync::{Arc, Mutex};

use alloy_primitives::{Address, TxHash};
use tokio::sync::watch;
use tracing::{info, instrument, warn};

use crate::{
    allowance::AllowanceGuard,
    chain::{ChainClient, TxPayload},
    config::{ChainConfig, SlippageBps},
    error::SwapError,
    executor::classify::classify_failure,
    quote::{api::AggregatorApi, Quote, QuoteEngine},
    tokens::Token,
};

// -------------
// | Constants |
// -------------

/// The percentage by which the aggregator's gas estimate is inflated,
/// absorbing execution-path variance between quote time and inclusion
const GAS_BUFFER_PCT: u64 = 30;

/// The metric counting settled swaps
const SWAPS_SUCCEEDED_METRIC: &str = "swap.succeeded";
/// The metric counting failed swap attempts
const SWAPS_FAILED_METRIC: &str = "swap.failed";

// ---------
// | Types |
// ---------

/// The phase of the in-flight swap attempt
///
/// `Confirming` is distinguished from `Submitting` because the receipt
/// wait spans multiple block intervals and is the longest-latency
/// operation in the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapPhase {
    /// No attempt in flight
    Idle,
    /// Fetching a quote
    Quoting,
    /// A quote is available with no blocking issue
    Ready,
    /// Waiting on an approval transaction
    Approving,
    /// Submitting the swap transaction
    Submitting,
    /// Waiting on the swap confirmation
    Confirming,
    /// The attempt settled successfully
    Succeeded,
    /// The attempt reached a terminal failure
    Failed,
}

/// The settled outcome of a successful swap
#[derive(Debug, Clone)]
pub struct SwapOutcome {
    /// The transaction hash
    pub tx_hash: TxHash,
    /// The block the swap was included in
    pub block_number: Option<u64>,
    /// The gas consumed by the swap
    pub gas_used: u64,
}

// ------------
// | Executor |
// ------------

/// The swap executor
///
/// Owns one swap attempt at a time; a new `swap` call is only
/// meaningful after the prior attempt reached a terminal phase, and
/// callers are responsible for disabling re-entrant triggers while an
/// attempt is in flight.
pub struct SwapExecutor {
    /// The chain client used for network checks and submission
    chain: Arc<dyn ChainClient>,
    /// The quote engine
    engine: QuoteEngine,
    /// The allowance guard
    guard: AllowanceGuard,
    /// The network swaps execute on
    config: ChainConfig,
    /// The phase of the in-flight attempt, observable by displays
    phase_tx: watch::Sender<SwapPhase>,
    /// The most recently displayed quote; cleared on a settled swap
    active_quote: Mutex<Option<Quote>>,
}

impl SwapExecutor {
    /// Create a new executor
    pub fn new(
        chain: Arc<dyn ChainClient>,
        aggregator: Arc<dyn AggregatorApi>,
        config: ChainConfig,
    ) -> Self {
        let engine = QuoteEngine::new(chain.clone(), aggregator, config.clone());
        let guard = AllowanceGuard::new(chain.clone());
        let (phase_tx, _) = watch::channel(SwapPhase::Idle);

        Self { chain, engine, guard, config, phase_tx, active_quote: Mutex::new(None) }
    }

    /// A receiver observing the phase of the in-flight attempt
    pub fn phases(&self) -> watch::Receiver<SwapPhase> {
        self.phase_tx.subscribe()
    }

    /// The most recently displayed quote, if one is held
    pub fn active_quote(&self) -> Option<Quote> {
        self.active_quote.lock().expect("quote lock poisoned").clone()
    }

    /// Reset the executor to idle after a terminal phase is acknowledged
    pub fn reset(&self) {
        self.active_quote.lock().expect("quote lock poisoned").take();
        self.phase_tx.send_replace(SwapPhase::Idle);
    }

    /// Fetch and hold a quote for display
    pub async fn refresh_quote(
        &self,
        taker: Address,
        sell_token: &Token,
        buy_token: &Token,
        sell_amount_human: &str,
        slippage: SlippageBps,
    ) -> Result<Quote, SwapError> {
        self.phase_tx.send_replace(SwapPhase::Quoting);
        match self
            .engine
            .get_quote(taker, sell_token, buy_token, sell_amount_human, slippage)
            .await
        {
            Ok(quote) => {
                *self.active_quote.lock().expect("quote lock poisoned") = Some(quote.clone());
                self.phase_tx.send_replace(SwapPhase::Ready);
                Ok(quote)
            },
            Err(e) => {
                self.phase_tx.send_replace(SwapPhase::Failed);
                Err(e)
            },
        }
    }

    /// Approve the spender for the sell token, then refresh the quote
    ///
    /// A settled approval re-quotes automatically so the caller gets a
    /// route whose allowance issue has cleared, without re-entering the
    /// amount.
    pub async fn approve_for_swap(
        &self,
        taker: Address,
        sell_token: &Token,
        buy_token: &Token,
        sell_amount_human: &str,
        slippage: SlippageBps,
        spender: Address,
    ) -> Result<Quote, SwapError> {
        self.phase_tx.send_replace(SwapPhase::Approving);
        if let Err(e) = self.guard.approve(sell_token, spender).await {
            self.phase_tx.send_replace(SwapPhase::Failed);
            return Err(e);
        }

        self.refresh_quote(taker, sell_token, buy_token, sell_amount_human, slippage).await
    }

    /// Drive a confirmed trade to settlement
    #[instrument(
        skip_all,
        fields(
            sell = %sell_token.symbol,
            buy = %buy_token.symbol,
            amount = %sell_amount_human
        )
    )]
    pub async fn swap(
        &self,
        taker: Address,
        sell_token: &Token,
        buy_token: &Token,
        sell_amount_human: &str,
        slippage: SlippageBps,
    ) -> Result<SwapOutcome, SwapError> {
        let result = self
            .execute_swap(taker, sell_token, buy_token, sell_amount_human, slippage)
            .await;

        match &result {
            Ok(outcome) => {
                // The settled attempt clears the held quote so the form
                // returns to a neutral state
                self.active_quote.lock().expect("quote lock poisoned").take();
                self.phase_tx.send_replace(SwapPhase::Succeeded);
                metrics::counter!(SWAPS_SUCCEEDED_METRIC).increment(1);
                info!("swap settled: {:#x}", outcome.tx_hash);
            },
            Err(e) => {
                self.phase_tx.send_replace(SwapPhase::Failed);
                metrics::counter!(SWAPS_FAILED_METRIC).increment(1);
                warn!("swap failed: {e}");
            },
        }

        result
    }

    // -----------
    // | Helpers |
    // -----------

    /// Run the swap steps in order
    async fn execute_swap(
        &self,
        taker: Address,
        sell_token: &Token,
        buy_token: &Token,
        sell_amount_human: &str,
        slippage: SlippageBps,
    ) -> Result<SwapOutcome, SwapError> {
        // The network check runs before any balance or quote work
        self.ensure_network().await?;

        // A fresh quote is always fetched for submission; the displayed
        // quote may be stale on price, route, or balance
        self.phase_tx.send_replace(SwapPhase::Quoting);
        let quote = self
            .engine
            .get_quote(taker, sell_token, buy_token, sell_amount_human, slippage)
            .await?;

        // The executor never silently auto-approves; an outstanding
        // allowance shortfall aborts so the caller can drive an explicit
        // approval step
        if let Some(spender) = quote.allowance_issue {
            return Err(SwapError::ApprovalRequired { spender });
        }
        self.phase_tx.send_replace(SwapPhase::Ready);

        self.phase_tx.send_replace(SwapPhase::Submitting);
        let tx = buffered_payload(&quote.tx);
        let tx_hash = match self.chain.submit_transaction(tx).await {
            Ok(tx_hash) => tx_hash,
            Err(e) => return Err(SwapError::OnChain(classify_failure(e.code, &e.message))),
        };

        self.phase_tx.send_replace(SwapPhase::Confirming);
        let outcome = self.chain.confirm_transaction(tx_hash).await?;
        if !outcome.success {
            // Classify from the recovered revert reason when the chain
            // client could reproduce one
            let reason = outcome.revert_reason.as_deref().unwrap_or("transaction reverted");
            return Err(SwapError::OnChain(classify_failure(None, reason)));
        }

        Ok(SwapOutcome {
            tx_hash: outcome.tx_hash,
            block_number: outcome.block_number,
            gas_used: outcome.gas_used,
        })
    }

    /// Verify the signer is on the required network, asking it to
    /// switch if not
    async fn ensure_network(&self) -> Result<(), SwapError> {
        let expected = self.config.chain_id;
        let actual = self.chain.chain_id().await?;
        if actual == expected {
            return Ok(());
        }

        info!("connected to chain {actual}, requesting switch to {expected}");
        self.chain
            .switch_chain(&self.config)
            .await
            .map_err(|_| SwapError::WrongNetwork { expected, actual })?;

        let actual = self.chain.chain_id().await?;
        if actual != expected {
            return Err(SwapError::WrongNetwork { expected, actual });
        }

        Ok(())
    }
}

/// The aggregator payload with the gas safety buffer applied
fn buffered_payload(tx: &TxPayload) -> TxPayload {
    let gas = tx.gas.map(|gas| gas.saturating_mul(100 + GAS_BUFFER_PCT) / 100);
    TxPayload { gas, ..tx.clone() }
}
