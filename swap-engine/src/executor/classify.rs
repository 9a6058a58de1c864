//! Classification of on-chain transaction failures
//!
//! Structured provider error codes are preferred; the message substring
//! heuristics only apply when no code was supplied, since third-party
//! error text is not a stable contract. Anything unmatched falls
//! through to [`RevertKind::UnknownRevert`] rather than guessing.

use crate::error::{ClassifiedError, RevertKind};

// -------------
// | Constants |
// -------------

/// The EIP-1193 error code for a user-rejected request
pub const USER_REJECTED_CODE: i64 = 4001;

/// Message markers indicating the signer declined the transaction
const USER_REJECTED_MARKERS: [&str; 2] = ["user rejected", "user denied"];
/// Message markers indicating the token pull failed
const TRANSFER_FAILED_MARKERS: [&str; 3] =
    ["transfer_from_failed", "transferfrom failed", "transfer_failed"];
/// Message markers indicating the output fell below the enforced minimum
const SLIPPAGE_MARKERS: [&str; 3] =
    ["insufficient_output_amount", "insufficientoutputamount", "slippage"];
/// Message markers indicating the quoted route expired
const EXPIRED_MARKERS: [&str; 2] = ["expired", "deadline"];
/// Message markers indicating the transaction ran out of gas or the
/// account cannot cover it
const GAS_MARKERS: [&str; 3] = ["out of gas", "intrinsic gas", "insufficient funds"];

/// The marker prefixing a numeric revert status code
const REVERT_CODE_MARKER: &str = "reverted with code";

// ------------------
// | Classification |
// ------------------

/// Classify a transaction failure into a kind, message, and remedy
///
/// Applied uniformly to approval and swap failures, whether the
/// submission call errored or a confirmed receipt reported a revert.
pub fn classify_failure(code: Option<i64>, raw_message: &str) -> ClassifiedError {
    if is_user_rejection(code, raw_message) {
        return ClassifiedError {
            kind: RevertKind::UserRejected,
            message: "Transaction rejected in wallet".to_string(),
            remedy: None,
        };
    }

    let lowered = raw_message.to_lowercase();
    if contains_any(&lowered, &TRANSFER_FAILED_MARKERS) {
        return ClassifiedError {
            kind: RevertKind::TransferFailed,
            message: "The token transfer failed".to_string(),
            remedy: Some("check the token's approval and your balance, then retry".to_string()),
        };
    }

    if contains_any(&lowered, &SLIPPAGE_MARKERS) {
        return ClassifiedError {
            kind: RevertKind::SlippageExceeded,
            message: "The price moved beyond your slippage tolerance".to_string(),
            remedy: Some("increase the slippage tolerance or retry with a smaller amount"
                .to_string()),
        };
    }

    if contains_any(&lowered, &EXPIRED_MARKERS) {
        return ClassifiedError {
            kind: RevertKind::QuoteExpired,
            message: "The quote expired before the transaction was included".to_string(),
            remedy: Some("fetch a fresh quote and retry".to_string()),
        };
    }

    if let Some(revert_code) = extract_revert_code(&lowered) {
        return ClassifiedError {
            kind: RevertKind::RevertedWithCode(revert_code),
            message: format!("The transaction reverted with code {revert_code}"),
            remedy: Some("retry the swap; if it persists, try a smaller amount".to_string()),
        };
    }

    if contains_any(&lowered, &GAS_MARKERS) {
        return ClassifiedError {
            kind: RevertKind::InsufficientGas,
            message: "The transaction could not cover its gas".to_string(),
            remedy: Some("top up your ETH balance for gas and retry".to_string()),
        };
    }

    ClassifiedError {
        kind: RevertKind::UnknownRevert,
        message: format!("The transaction failed: {raw_message}"),
        remedy: Some("try again; if it persists, try a smaller amount".to_string()),
    }
}

/// Whether a failure indicates the signer declined the request
///
/// The structured EIP-1193 code is checked first; the message markers
/// are a fallback for providers that do not surface codes.
pub fn is_user_rejection(code: Option<i64>, message: &str) -> bool {
    if code == Some(USER_REJECTED_CODE) {
        return true;
    }

    contains_any(&message.to_lowercase(), &USER_REJECTED_MARKERS)
}

// -----------
// | Helpers |
// -----------

/// Whether the haystack contains any of the markers
fn contains_any(haystack: &str, markers: &[&str]) -> bool {
    markers.iter().any(|marker| haystack.contains(marker))
}

/// Extract a numeric status code from a `reverted with code N` marker
fn extract_revert_code(lowered: &str) -> Option<i64> {
    let tail = &lowered[lowered.find(REVERT_CODE_MARKER)? + REVERT_CODE_MARKER.len()..];
    let digits: String =
        tail.trim_start().chars().take_while(|c| c.is_ascii_digit()).collect();

    digits.parse().ok()
}
