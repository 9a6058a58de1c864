//! A token swap quoting and execution pipeline for the Base network
//!
//! Turns a sell/buy token selection and amount into a priced,
//! allowance-checked, slippage-bounded on-chain transaction via a
//! liquidity-aggregation API, with balance caching and a structured
//! failure taxonomy. The chain and aggregator boundaries are trait
//! seams, so the pipeline runs unchanged against scripted fakes in
//! tests.

#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]
#![deny(unsafe_code)]
#![deny(clippy::needless_pass_by_ref_mut)]

pub mod allowance;
pub mod amount;
pub mod balance;
pub mod chain;
pub mod config;
pub mod error;
pub mod executor;
pub mod quote;
pub mod telemetry;
pub mod tokens;

#[cfg(test)]
pub(crate) mod mocks;

pub use allowance::{AllowanceGuard, AllowanceState};
pub use balance::{BalanceOracle, TokenBalance};
pub use chain::{ChainClient, RpcChainClient, TxOutcome, TxPayload};
pub use config::{ChainConfig, SlippageBps};
pub use error::{ClassifiedError, RevertKind, SwapError};
pub use executor::{SwapExecutor, SwapOutcome, SwapPhase};
pub use quote::{
    api::{AggregatorApi, ZeroExClient},
    debounce::QuoteDebouncer,
    PriceImpactSeverity, Quote, QuoteEngine,
};
pub use tokens::{Token, NATIVE_TOKEN_ADDRESS};
