//! Hand-rolled fakes for the chain and aggregator boundaries, shared by
//! the unit tests

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
};

use alloy_primitives::{Address, TxHash, U256};
use alloy_sol_types::SolCall;
use async_trait::async_trait;

use crate::{
    chain::{ChainClient, IERC20, TxError, TxOutcome, TxPayload},
    config::ChainConfig,
    error::SwapError,
    quote::api::{
        AggregatorApi, AllowanceIssue, QuoteFill, QuoteIssues, QuoteRequest, QuoteResponse,
        QuoteRoute, QuoteTransaction,
    },
};

// ----------------
// | Chain Client |
// ----------------

/// A scripted in-memory chain
pub(crate) struct MockChainClient {
    /// The chain id the signer reports
    pub chain_id: Mutex<u64>,
    /// Whether switch-chain requests succeed
    pub switch_succeeds: bool,
    /// Native balances by account
    pub native_balances: Mutex<HashMap<Address, U256>>,
    /// ERC-20 balances keyed by (token, account)
    pub erc20_balances: Mutex<HashMap<(Address, Address), U256>>,
    /// Allowances keyed by (token, spender); the owner is a single
    /// account in every test, so it is not part of the key
    pub allowances: Mutex<HashMap<(Address, Address), U256>>,
    /// Every payload submitted through the client
    pub submitted: Mutex<Vec<TxPayload>>,
    /// An error to return from the next submission, if set
    pub submit_error: Mutex<Option<TxError>>,
    /// The receipt status confirmations report
    pub confirm_success: AtomicBool,
    /// The revert reason reported alongside a failed receipt, if set
    pub revert_reason: Mutex<Option<String>>,
    /// Whether balance and allowance reads fail with an RPC error
    pub fail_reads: AtomicBool,
}

impl MockChainClient {
    /// A client connected to the given chain
    pub fn on_chain(chain_id: u64) -> Self {
        Self {
            chain_id: Mutex::new(chain_id),
            switch_succeeds: true,
            native_balances: Mutex::new(HashMap::new()),
            erc20_balances: Mutex::new(HashMap::new()),
            allowances: Mutex::new(HashMap::new()),
            submitted: Mutex::new(Vec::new()),
            submit_error: Mutex::new(None),
            confirm_success: AtomicBool::new(true),
            revert_reason: Mutex::new(None),
            fail_reads: AtomicBool::new(false),
        }
    }

    /// Seed a native balance
    pub fn set_native_balance(&self, account: Address, balance: U256) {
        self.native_balances.lock().unwrap().insert(account, balance);
    }

    /// Seed an ERC-20 balance
    pub fn set_erc20_balance(&self, token: Address, account: Address, balance: U256) {
        self.erc20_balances.lock().unwrap().insert((token, account), balance);
    }

    /// The number of transactions submitted so far
    pub fn submitted_count(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }

    /// Fail if reads are scripted to error
    fn check_reads(&self) -> Result<(), SwapError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(SwapError::rpc("scripted rpc outage"));
        }

        Ok(())
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn chain_id(&self) -> Result<u64, SwapError> {
        Ok(*self.chain_id.lock().unwrap())
    }

    async fn switch_chain(&self, config: &ChainConfig) -> Result<(), SwapError> {
        if !self.switch_succeeds {
            return Err(SwapError::rpc("signer declined the switch request"));
        }

        *self.chain_id.lock().unwrap() = config.chain_id;
        Ok(())
    }

    async fn native_balance(&self, account: Address) -> Result<U256, SwapError> {
        self.check_reads()?;
        Ok(self.native_balances.lock().unwrap().get(&account).copied().unwrap_or(U256::ZERO))
    }

    async fn erc20_balance(&self, token: Address, account: Address) -> Result<U256, SwapError> {
        self.check_reads()?;
        Ok(self
            .erc20_balances
            .lock()
            .unwrap()
            .get(&(token, account))
            .copied()
            .unwrap_or(U256::ZERO))
    }

    async fn allowance(
        &self,
        token: Address,
        _owner: Address,
        spender: Address,
    ) -> Result<U256, SwapError> {
        Ok(self.allowances.lock().unwrap().get(&(token, spender)).copied().unwrap_or(U256::ZERO))
    }

    async fn submit_transaction(&self, tx: TxPayload) -> Result<TxHash, TxError> {
        if let Some(err) = self.submit_error.lock().unwrap().take() {
            return Err(err);
        }

        // An approve call updates the scripted allowance table
        if tx.data.starts_with(&IERC20::approveCall::SELECTOR) {
            if let Ok(call) = IERC20::approveCall::abi_decode(&tx.data) {
                self.allowances.lock().unwrap().insert((tx.to, call.spender), call.value);
            }
        }

        let mut submitted = self.submitted.lock().unwrap();
        submitted.push(tx);
        Ok(TxHash::with_last_byte(submitted.len() as u8))
    }

    async fn confirm_transaction(&self, tx_hash: TxHash) -> Result<TxOutcome, SwapError> {
        let success = self.confirm_success.load(Ordering::SeqCst);
        let revert_reason =
            if success { None } else { self.revert_reason.lock().unwrap().clone() };
        Ok(TxOutcome { tx_hash, success, block_number: Some(1), gas_used: 21_000, revert_reason })
    }
}

// --------------
// | Aggregator |
// --------------

/// An aggregator that replays a fixed response and counts its calls
pub(crate) struct MockAggregator {
    /// The response returned from every fetch
    pub response: QuoteResponse,
    /// The number of quote requests issued
    pub calls: AtomicUsize,
}

impl MockAggregator {
    /// Create an aggregator replaying the given response
    pub fn new(response: QuoteResponse) -> Self {
        Self { response, calls: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl AggregatorApi for MockAggregator {
    async fn fetch_quote(&self, _request: &QuoteRequest) -> Result<QuoteResponse, SwapError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.response.clone())
    }
}

/// Build a canned quote response
pub(crate) fn quote_response(
    buy_amount: &str,
    value: &str,
    allowance_spender: Option<Address>,
) -> QuoteResponse {
    QuoteResponse {
        buy_amount: buy_amount.to_string(),
        transaction: QuoteTransaction {
            to: Address::with_last_byte(0xaa),
            data: vec![0xde, 0xad, 0xbe, 0xef].into(),
            value: value.to_string(),
            gas: Some("250000".to_string()),
            gas_price: Some("15000000".to_string()),
        },
        issues: Some(QuoteIssues {
            balance: None,
            allowance: allowance_spender.map(|spender| AllowanceIssue { spender }),
        }),
        route: Some(QuoteRoute {
            fills: vec![
                QuoteFill { source: "Uniswap_V3".to_string() },
                QuoteFill { source: "Aerodrome".to_string() },
            ],
        }),
        estimated_price_impact: Some("0.12".to_string()),
    }
}
