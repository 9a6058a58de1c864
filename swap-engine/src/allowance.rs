//! Allowance checks and approval transactions
//!
//! Gates ERC-20 swaps behind on-chain spending authorization. Approvals
//! are issued for the maximum representable amount so that repeat swaps
//! of the same pair do not each pay for an approval transaction; this
//! trades least-privilege for UX and gas, and callers surfacing the
//! approval to users should say so.

use std::sync::Arc;

use alloy_primitives::{Address, U256};
use alloy_sol_types::SolCall;
use tracing::{info, instrument};

use crate::{
    chain::{ChainClient, IERC20, TxOutcome, TxPayload},
    error::SwapError,
    executor::classify::is_user_rejection,
    tokens::Token,
};

// ---------
// | Types |
// ---------

/// The allowance standing of a (token, spender) pair for an owner
///
/// Derived, never persisted; recomputed per quote.
#[derive(Debug, Clone)]
pub struct AllowanceState {
    /// The token under consideration
    pub token: Token,
    /// The spender contract
    pub spender: Address,
    /// Whether the current allowance covers the required amount
    pub sufficient: bool,
    /// The current on-chain allowance
    pub current: U256,
}

// ---------
// | Guard |
// ---------

/// The allowance guard
pub struct AllowanceGuard {
    /// The chain client used for allowance reads and approvals
    chain: Arc<dyn ChainClient>,
}

impl AllowanceGuard {
    /// Create a new guard
    pub fn new(chain: Arc<dyn ChainClient>) -> Self {
        Self { chain }
    }

    /// Check whether the spender may move the required amount on the
    /// owner's behalf
    ///
    /// The native asset has no approval concept and always reports
    /// sufficient. The comparison is exact: sufficient iff
    /// `current >= required`.
    pub async fn check_allowance(
        &self,
        token: &Token,
        owner: Address,
        spender: Address,
        required: U256,
    ) -> Result<AllowanceState, SwapError> {
        if token.is_native() {
            return Ok(AllowanceState {
                token: *token,
                spender,
                sufficient: true,
                current: U256::MAX,
            });
        }

        let current = self.chain.allowance(token.address, owner, spender).await?;
        Ok(AllowanceState { token: *token, spender, sufficient: current >= required, current })
    }

    /// Approve the spender for the maximum representable amount and wait
    /// for one confirmation
    #[instrument(skip_all, fields(token = %token.symbol, spender = %spender))]
    pub async fn approve(
        &self,
        token: &Token,
        spender: Address,
    ) -> Result<TxOutcome, SwapError> {
        let calldata = IERC20::approveCall { spender, value: U256::MAX }.abi_encode();
        let tx = TxPayload {
            to: token.address,
            data: calldata.into(),
            value: U256::ZERO,
            gas: None,
        };

        let tx_hash = match self.chain.submit_transaction(tx).await {
            Ok(tx_hash) => tx_hash,
            Err(e) if is_user_rejection(e.code, &e.message) => {
                return Err(SwapError::ApprovalRejected)
            },
            Err(e) => return Err(SwapError::rpc(e)),
        };

        info!("approval submitted: {tx_hash:#x}");
        let outcome = self.chain.confirm_transaction(tx_hash).await?;
        if !outcome.success {
            return Err(SwapError::ApprovalReverted { tx_hash: outcome.tx_hash });
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        chain::TxError,
        mocks::MockChainClient,
        tokens,
    };

    /// The owner address used across the tests
    fn owner() -> Address {
        Address::with_last_byte(0x01)
    }

    /// The native-asset sentinel always reports sufficient, regardless
    /// of the required amount
    #[tokio::test]
    async fn test_native_always_sufficient() {
        let eth = tokens::by_symbol("ETH").unwrap();
        let guard = AllowanceGuard::new(Arc::new(MockChainClient::on_chain(8453)));

        let state = guard
            .check_allowance(&eth, owner(), Address::with_last_byte(0xaa), U256::MAX)
            .await
            .unwrap();
        assert!(state.sufficient);
    }

    /// A zero allowance is insufficient for any positive requirement,
    /// and becomes sufficient after an approval to the maximum value
    #[tokio::test]
    async fn test_approve_then_recheck() {
        let usdc = tokens::by_symbol("USDC").unwrap();
        let spender = Address::with_last_byte(0xaa);
        let chain = Arc::new(MockChainClient::on_chain(8453));
        let guard = AllowanceGuard::new(chain.clone());
        let required = U256::from(1_000_000u64);

        let state = guard.check_allowance(&usdc, owner(), spender, required).await.unwrap();
        assert!(!state.sufficient);

        guard.approve(&usdc, spender).await.unwrap();

        let state = guard.check_allowance(&usdc, owner(), spender, required).await.unwrap();
        assert!(state.sufficient);
        assert_eq!(state.current, U256::MAX);
    }

    /// The comparison is exact: equal covers, one short does not
    #[tokio::test]
    async fn test_exact_comparison() {
        let usdc = tokens::by_symbol("USDC").unwrap();
        let spender = Address::with_last_byte(0xaa);
        let chain = Arc::new(MockChainClient::on_chain(8453));
        chain.allowances.lock().unwrap().insert((usdc.address, spender), U256::from(100u64));
        let guard = AllowanceGuard::new(chain);

        let state =
            guard.check_allowance(&usdc, owner(), spender, U256::from(100u64)).await.unwrap();
        assert!(state.sufficient);

        let state =
            guard.check_allowance(&usdc, owner(), spender, U256::from(101u64)).await.unwrap();
        assert!(!state.sufficient);
    }

    /// A signer rejection surfaces as `ApprovalRejected`
    #[tokio::test]
    async fn test_signer_rejection() {
        let usdc = tokens::by_symbol("USDC").unwrap();
        let chain = Arc::new(MockChainClient::on_chain(8453));
        *chain.submit_error.lock().unwrap() =
            Some(TxError { code: Some(4001), message: "User rejected the request".to_string() });
        let guard = AllowanceGuard::new(chain);

        let result = guard.approve(&usdc, Address::with_last_byte(0xaa)).await;
        assert!(matches!(result, Err(SwapError::ApprovalRejected)));
    }

    /// A reverted approval receipt surfaces as `ApprovalReverted`
    #[tokio::test]
    async fn test_reverted_approval() {
        use std::sync::atomic::Ordering;

        let usdc = tokens::by_symbol("USDC").unwrap();
        let chain = Arc::new(MockChainClient::on_chain(8453));
        chain.confirm_success.store(false, Ordering::SeqCst);
        let guard = AllowanceGuard::new(chain);

        let result = guard.approve(&usdc, Address::with_last_byte(0xaa)).await;
        assert!(matches!(result, Err(SwapError::ApprovalReverted { .. })));
    }
}
