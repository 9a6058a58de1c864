//! Balance reads with caching and bounded staleness
//!
//! The oracle keeps the last-known-good value on RPC failure and
//! surfaces the error separately, so a transient node outage never
//! blanks a displayed balance.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use alloy_primitives::{Address, U256};
use tokio::{task::JoinHandle, time::Instant};
use tracing::warn;

use crate::{
    amount::{format_display, units_to_f64},
    chain::ChainClient,
    error::SwapError,
    tokens::Token,
};

// -------------
// | Constants |
// -------------

/// The default staleness window before a cached balance is refetched
const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(15);

// ---------
// | Types |
// ---------

/// A balance in both raw and display form
#[derive(Debug, Clone)]
pub struct TokenBalance {
    /// The balance in the token's smallest unit
    pub raw: U256,
    /// The balance formatted for display
    pub formatted: String,
}

/// A cached balance and its fetch metadata
#[derive(Debug, Clone)]
struct CacheEntry {
    /// The last successfully fetched balance
    balance: TokenBalance,
    /// When the balance was fetched
    fetched_at: Instant,
    /// The error from the most recent failed refresh, if the entry is
    /// stale
    last_error: Option<String>,
}

// ----------
// | Oracle |
// ----------

/// The balance oracle
pub struct BalanceOracle {
    /// The chain client balances are read through
    chain: Arc<dyn ChainClient>,
    /// Cached balances keyed by (account, token address)
    ///
    /// Entries are replaced whole, so readers never observe a partial
    /// update.
    cache: Mutex<HashMap<(Address, Address), CacheEntry>>,
    /// The staleness window before a cached balance is refetched
    refresh_interval: Duration,
}

impl BalanceOracle {
    /// Create a new oracle with the default staleness window
    pub fn new(chain: Arc<dyn ChainClient>) -> Self {
        Self::with_refresh_interval(chain, DEFAULT_REFRESH_INTERVAL)
    }

    /// Create a new oracle with the given staleness window
    pub fn with_refresh_interval(chain: Arc<dyn ChainClient>, refresh_interval: Duration) -> Self {
        Self { chain, cache: Mutex::new(HashMap::new()), refresh_interval }
    }

    /// The account's balance of the given token, fresh within the
    /// staleness window
    pub async fn get_balance(
        &self,
        account: Address,
        token: &Token,
    ) -> Result<TokenBalance, SwapError> {
        if let Some(entry) = self.cached(account, token) {
            if entry.fetched_at.elapsed() < self.refresh_interval {
                return Ok(entry.balance);
            }
        }

        self.refetch(account, token).await
    }

    /// Fetch the balance now, bypassing the staleness window
    ///
    /// On RPC failure with a cached value available, the stale value is
    /// returned and the error recorded for [`BalanceOracle::last_error`].
    pub async fn refetch(
        &self,
        account: Address,
        token: &Token,
    ) -> Result<TokenBalance, SwapError> {
        match self.fetch(account, token).await {
            Ok(balance) => {
                let entry = CacheEntry {
                    balance: balance.clone(),
                    fetched_at: Instant::now(),
                    last_error: None,
                };
                self.cache.lock().expect("balance cache lock poisoned").insert(
                    (account, token.address),
                    entry,
                );

                Ok(balance)
            },
            Err(e) => {
                warn!("balance refresh for {} failed: {e}", token.symbol);
                let mut cache = self.cache.lock().expect("balance cache lock poisoned");
                match cache.get_mut(&(account, token.address)) {
                    // Stale but available beats blank
                    Some(entry) => {
                        entry.last_error = Some(e.to_string());
                        Ok(entry.balance.clone())
                    },
                    None => Err(e),
                }
            },
        }
    }

    /// The error from the most recent failed refresh for the pair, if
    /// the cached value is stale
    pub fn last_error(&self, account: Address, token: &Token) -> Option<String> {
        self.cached(account, token).and_then(|entry| entry.last_error)
    }

    /// Spawn a task refreshing the given tokens for an account on the
    /// staleness interval
    ///
    /// The task runs until aborted; callers drop or abort the handle on
    /// teardown.
    pub fn spawn_refresher(
        self: &Arc<Self>,
        account: Address,
        tokens: Vec<Token>,
    ) -> JoinHandle<()> {
        let oracle = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(oracle.refresh_interval).await;
                for token in &tokens {
                    // Errors are recorded in the cache entry; keep cycling
                    let _ = oracle.refetch(account, token).await;
                }
            }
        })
    }

    // -----------
    // | Helpers |
    // -----------

    /// Read a cache entry
    fn cached(&self, account: Address, token: &Token) -> Option<CacheEntry> {
        self.cache
            .lock()
            .expect("balance cache lock poisoned")
            .get(&(account, token.address))
            .cloned()
    }

    /// Fetch a balance from the chain and format it
    async fn fetch(&self, account: Address, token: &Token) -> Result<TokenBalance, SwapError> {
        let raw = if token.is_native() {
            self.chain.native_balance(account).await?
        } else {
            self.chain.erc20_balance(token.address, account).await?
        };

        let formatted = format_display(units_to_f64(raw, token.decimals));
        Ok(TokenBalance { raw, formatted })
    }
}
