//! The chain RPC seam and its production implementation
//!
//! [`ChainClient`] is the boundary between the engine and the connected
//! signer/node: balance and allowance reads, network switching, and
//! transaction submission all pass through it, which is what lets the
//! quoting and execution logic run against a scripted chain in tests.

use std::time::Duration;

use alloy::{
    consensus::Transaction,
    eips::BlockId,
    network::{TransactionBuilder, TransactionResponse},
    providers::{DynProvider, Provider},
    rpc::types::{TransactionReceipt, TransactionRequest},
    sol,
};
use alloy_primitives::{Address, Bytes, TxHash, U256};
use async_trait::async_trait;
use serde_json::json;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use crate::{config::ChainConfig, error::SwapError};

// -------------
// | Constants |
// -------------

/// The interval between transaction-receipt polls
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// The maximum time to wait for a transaction confirmation
const CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(120);

/// The EIP-3085/3326 error code for a chain the signer does not know
const UNRECOGNIZED_CHAIN_CODE: i64 = 4902;

/// The signer request to switch the active chain
const SWITCH_CHAIN_METHOD: &str = "wallet_switchEthereumChain";
/// The signer request to register a new chain definition
const ADD_CHAIN_METHOD: &str = "wallet_addEthereumChain";

// The ERC20 interface
sol! {
    #[sol(rpc)]
    interface IERC20 {
        function balanceOf(address account) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 value) external returns (bool);
        event Transfer(address indexed from, address indexed to, uint256 value);
    }
}

// ---------
// | Types |
// ---------

/// A transaction payload ready for submission
///
/// For swaps this is the aggregator-supplied payload, forwarded
/// verbatim apart from the gas buffer.
#[derive(Debug, Clone)]
pub struct TxPayload {
    /// The recipient contract
    pub to: Address,
    /// The calldata
    pub data: Bytes,
    /// The native value attached to the call
    pub value: U256,
    /// The gas limit, or `None` to let the node estimate
    pub gas: Option<u64>,
}

/// The confirmed outcome of a submitted transaction
#[derive(Debug, Clone)]
pub struct TxOutcome {
    /// The transaction hash
    pub tx_hash: TxHash,
    /// Whether the receipt reported a success status
    pub success: bool,
    /// The block the transaction was included in
    pub block_number: Option<u64>,
    /// The gas consumed by the transaction
    pub gas_used: u64,
    /// The revert reason recovered for a failed receipt, when the node
    /// reproduces it
    pub revert_reason: Option<String>,
}

impl TxOutcome {
    /// Build an outcome from a confirmed receipt
    fn from_receipt(receipt: &TransactionReceipt) -> Self {
        Self {
            tx_hash: receipt.transaction_hash,
            success: receipt.status(),
            block_number: receipt.block_number,
            gas_used: receipt.gas_used,
            revert_reason: None,
        }
    }
}

/// A failure submitting a transaction
///
/// Carries the structured provider error code when one was supplied, so
/// that classification can prefer codes over message heuristics.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct TxError {
    /// The EIP-1193 / JSON-RPC error code, if one was supplied
    pub code: Option<i64>,
    /// The raw failure message
    pub message: String,
}

impl TxError {
    /// Create an error with no structured code
    #[allow(clippy::needless_pass_by_value)]
    pub fn message<T: ToString>(e: T) -> Self {
        Self { code: None, message: e.to_string() }
    }
}

// ---------
// | Trait |
// ---------

/// The chain RPC boundary used by the engine
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// The chain id the signer is currently connected to
    async fn chain_id(&self) -> Result<u64, SwapError>;

    /// Ask the signer to switch to the given network, registering the
    /// network definition first if the signer does not recognize it
    async fn switch_chain(&self, config: &ChainConfig) -> Result<(), SwapError>;

    /// The account's native asset balance
    async fn native_balance(&self, account: Address) -> Result<U256, SwapError>;

    /// The account's balance of an ERC-20 token
    async fn erc20_balance(&self, token: Address, account: Address) -> Result<U256, SwapError>;

    /// The amount the spender is currently authorized to move on the
    /// owner's behalf
    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, SwapError>;

    /// Submit a transaction, returning its hash once accepted by the
    /// node
    async fn submit_transaction(&self, tx: TxPayload) -> Result<TxHash, TxError>;

    /// Wait for one confirmation of a submitted transaction
    async fn confirm_transaction(&self, tx_hash: TxHash) -> Result<TxOutcome, SwapError>;
}

// -------------------------
// | Production RPC Client |
// -------------------------

/// The production chain client, backed by an alloy provider constructed
/// over the signer's EIP-1193 transport
pub struct RpcChainClient {
    /// The underlying RPC provider
    provider: DynProvider,
}

impl RpcChainClient {
    /// Create a new client over the given provider
    pub fn new(provider: DynProvider) -> Self {
        Self { provider }
    }

    /// Issue an add-chain request for an unrecognized network
    async fn add_chain(&self, config: &ChainConfig) -> Result<(), SwapError> {
        info!("registering chain {} with the signer", config.name);
        let params = json!([{
            "chainId": config.chain_id_hex(),
            "chainName": config.name,
            "rpcUrls": [config.rpc_url],
            "nativeCurrency": {
                "name": config.native_symbol,
                "symbol": config.native_symbol,
                "decimals": 18,
            },
            "blockExplorerUrls": [config.explorer_url],
        }]);

        self.provider
            .raw_request::<_, serde_json::Value>(ADD_CHAIN_METHOD.into(), params)
            .await
            .map_err(SwapError::rpc)?;

        Ok(())
    }

    /// Issue a single switch-chain request
    ///
    /// Failures keep their structured error code so the caller can
    /// distinguish an unrecognized chain from a declined request.
    async fn request_switch(&self, config: &ChainConfig) -> Result<(), TxError> {
        let params = json!([{ "chainId": config.chain_id_hex() }]);
        self.provider
            .raw_request::<_, serde_json::Value>(SWITCH_CHAIN_METHOD.into(), params)
            .await
            .map_err(to_tx_error)?;

        Ok(())
    }

    /// Replay a reverted transaction as a call at its inclusion block,
    /// recovering the node's revert reason when the failure reproduces
    async fn recover_revert_reason(&self, receipt: &TransactionReceipt) -> Option<String> {
        let tx =
            self.provider.get_transaction_by_hash(receipt.transaction_hash).await.ok()??;
        let request = TransactionRequest::default()
            .with_from(tx.from())
            .with_to(tx.to()?)
            .with_input(tx.input().clone())
            .with_value(tx.value());

        let call = self.provider.call(request);
        let call = match receipt.block_number {
            Some(number) => call.block(BlockId::number(number)),
            None => call,
        };
        match call.await {
            Ok(_) => None,
            Err(e) => Some(e.to_string()),
        }
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn chain_id(&self) -> Result<u64, SwapError> {
        self.provider.get_chain_id().await.map_err(SwapError::rpc)
    }

    async fn switch_chain(&self, config: &ChainConfig) -> Result<(), SwapError> {
        match self.request_switch(config).await {
            Ok(()) => Ok(()),
            Err(e) if e.code == Some(UNRECOGNIZED_CHAIN_CODE) => {
                self.add_chain(config).await?;
                self.request_switch(config).await.map_err(SwapError::rpc)
            },
            Err(e) => Err(SwapError::rpc(e)),
        }
    }

    async fn native_balance(&self, account: Address) -> Result<U256, SwapError> {
        self.provider.get_balance(account).await.map_err(SwapError::rpc)
    }

    async fn erc20_balance(&self, token: Address, account: Address) -> Result<U256, SwapError> {
        let erc20 = IERC20::new(token, &self.provider);
        erc20.balanceOf(account).call().await.map_err(SwapError::rpc)
    }

    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, SwapError> {
        let erc20 = IERC20::new(token, &self.provider);
        erc20.allowance(owner, spender).call().await.map_err(SwapError::rpc)
    }

    async fn submit_transaction(&self, tx: TxPayload) -> Result<TxHash, TxError> {
        let mut request = TransactionRequest::default()
            .with_to(tx.to)
            .with_input(tx.data)
            .with_value(tx.value);
        if let Some(gas) = tx.gas {
            request = request.with_gas_limit(gas);
        }

        let pending = self.provider.send_transaction(request).await.map_err(to_tx_error)?;
        Ok(*pending.tx_hash())
    }

    async fn confirm_transaction(&self, tx_hash: TxHash) -> Result<TxOutcome, SwapError> {
        let deadline = Instant::now() + CONFIRMATION_TIMEOUT;
        loop {
            let maybe_receipt = self
                .provider
                .get_transaction_receipt(tx_hash)
                .await
                .map_err(SwapError::rpc)?;

            if let Some(receipt) = maybe_receipt {
                let mut outcome = TxOutcome::from_receipt(&receipt);
                if !outcome.success {
                    warn!("tx ({tx_hash:#x}) reverted");
                    outcome.revert_reason = self.recover_revert_reason(&receipt).await;
                }
                return Ok(outcome);
            }

            if Instant::now() >= deadline {
                return Err(SwapError::ConfirmationTimeout { tx_hash });
            }
            sleep(RECEIPT_POLL_INTERVAL).await;
        }
    }
}

// -----------
// | Helpers |
// -----------

/// Convert a provider error into a `TxError`, extracting the structured
/// error code when the failure is a JSON-RPC error response
fn to_tx_error(e: alloy::transports::RpcError<alloy::transports::TransportErrorKind>) -> TxError {
    let code = e.as_error_resp().map(|payload| payload.code);
    TxError { code, message: e.to_string() }
}

#[cfg(test)]
mod tests {
    use alloy::{
        rpc::json_rpc::ErrorPayload,
        transports::{RpcError, TransportErrorKind},
    };

    use super::*;

    /// A JSON-RPC error response surfaces its structured code; errors
    /// without one never synthesize a code from message text
    #[test]
    fn test_structured_code_surfaced() {
        let payload = ErrorPayload {
            code: UNRECOGNIZED_CHAIN_CODE,
            message: "Unrecognized chain ID".into(),
            data: None,
        };
        let err: RpcError<TransportErrorKind> = RpcError::ErrorResp(payload);
        assert_eq!(to_tx_error(err).code, Some(UNRECOGNIZED_CHAIN_CODE));

        // Digits in the message are not a structured code
        let err =
            RpcError::<TransportErrorKind>::local_usage_str("gas estimate was 4902100 units");
        assert!(to_tx_error(err).code.is_none());
    }
}
