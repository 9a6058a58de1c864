//! Error types for the swap engine

use alloy_primitives::{Address, TxHash};

// --------------
// | Swap Error |
// --------------

/// An error produced by the swap engine
#[derive(Debug, Clone, thiserror::Error)]
pub enum SwapError {
    /// The sell amount failed validation
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    /// The account balance does not cover the sell amount
    #[error("insufficient {symbol} balance: need {required}, have {available}")]
    InsufficientBalance {
        /// The symbol of the sell token
        symbol: String,
        /// The required amount, formatted in token units
        required: String,
        /// The available amount, formatted in token units
        available: String,
    },
    /// The swap cannot proceed until the spender is approved
    #[error("token approval required for spender {spender}")]
    ApprovalRequired {
        /// The spender contract that must be approved
        spender: Address,
    },
    /// The signer declined the approval transaction
    #[error("approval rejected by the signer")]
    ApprovalRejected,
    /// The approval transaction was confirmed with a failure status
    #[error("approval transaction reverted: {tx_hash}")]
    ApprovalReverted {
        /// The hash of the reverted approval transaction
        tx_hash: TxHash,
    },
    /// The connected chain does not match the required network and
    /// switching failed
    #[error("wrong network: expected chain {expected}, connected to chain {actual}")]
    WrongNetwork {
        /// The required chain id
        expected: u64,
        /// The chain id the signer is connected to
        actual: u64,
    },
    /// The aggregator returned a non-success response
    #[error("aggregator error ({status}): {reason}")]
    Aggregator {
        /// The HTTP status code of the response
        status: u16,
        /// The reason reported by the aggregator
        reason: String,
    },
    /// A transport-level error reaching an external service
    #[error("network error: {0}")]
    Network(String),
    /// An error issuing a chain RPC call
    #[error("rpc error: {0}")]
    Rpc(String),
    /// An on-chain failure, classified from the raw signer or node error
    #[error("{0}")]
    OnChain(ClassifiedError),
    /// Timed out waiting for a transaction confirmation
    #[error("timed out waiting for confirmation of {tx_hash}")]
    ConfirmationTimeout {
        /// The hash of the unconfirmed transaction
        tx_hash: TxHash,
    },
    /// An error parsing a value
    #[error("parse error: {0}")]
    Parse(String),
}

impl SwapError {
    /// Create a new invalid-amount error
    #[allow(clippy::needless_pass_by_value)]
    pub fn invalid_amount<T: ToString>(e: T) -> Self {
        SwapError::InvalidAmount(e.to_string())
    }

    /// Create a new aggregator error
    #[allow(clippy::needless_pass_by_value)]
    pub fn aggregator<T: ToString>(status: u16, reason: T) -> Self {
        SwapError::Aggregator { status, reason: reason.to_string() }
    }

    /// Create a new network error
    #[allow(clippy::needless_pass_by_value)]
    pub fn network<T: ToString>(e: T) -> Self {
        SwapError::Network(e.to_string())
    }

    /// Create a new rpc error
    #[allow(clippy::needless_pass_by_value)]
    pub fn rpc<T: ToString>(e: T) -> Self {
        SwapError::Rpc(e.to_string())
    }

    /// Create a new parse error
    #[allow(clippy::needless_pass_by_value)]
    pub fn parse<T: ToString>(e: T) -> Self {
        SwapError::Parse(e.to_string())
    }

    /// A suggested remedy for the failure, distinct from the message, if
    /// one applies
    pub fn remedy(&self) -> Option<String> {
        match self {
            SwapError::OnChain(classified) => classified.remedy.clone(),
            SwapError::WrongNetwork { expected, .. } => {
                Some(format!("switch your wallet to chain {expected} and retry"))
            },
            SwapError::ApprovalRequired { .. } => {
                Some("approve the token for trading, then retry the swap".to_string())
            },
            SwapError::Network(_) | SwapError::Aggregator { .. } => {
                Some("check your connection and try again".to_string())
            },
            _ => None,
        }
    }
}

impl From<reqwest::Error> for SwapError {
    fn from(e: reqwest::Error) -> Self {
        SwapError::network(e)
    }
}

// ------------------------
// | On-Chain Classifier |
// ------------------------

/// The classified kind of an on-chain transaction failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevertKind {
    /// The signer declined to sign the transaction
    UserRejected,
    /// The token pull failed, most likely a missing allowance
    TransferFailed,
    /// The output fell below the enforced minimum
    SlippageExceeded,
    /// The quoted route expired before inclusion
    QuoteExpired,
    /// The contract reverted with a numeric status code
    RevertedWithCode(i64),
    /// The transaction ran out of gas, or the account cannot cover it
    InsufficientGas,
    /// A revert that matched no known pattern
    UnknownRevert,
}

/// An on-chain failure mapped into a human-readable message and an
/// optional suggested remedy
///
/// The remedy is kept distinct from the message so that callers can
/// render them separately.
#[derive(Debug, Clone)]
pub struct ClassifiedError {
    /// The classified failure kind
    pub kind: RevertKind,
    /// The human-readable failure message
    pub message: String,
    /// A suggested remedy, where one applies
    pub remedy: Option<String>,
}

impl std::fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}
