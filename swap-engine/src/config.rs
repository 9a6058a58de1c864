//! Chain and trade configuration for the swap engine

use crate::error::SwapError;

// -------------
// | Constants |
// -------------

/// The chain id of Base mainnet
pub const BASE_CHAIN_ID: u64 = 8453;
/// The default RPC endpoint for Base mainnet
const BASE_RPC_URL: &str = "https://mainnet.base.org";
/// The block explorer for Base mainnet
const BASE_EXPLORER_URL: &str = "https://basescan.org";

// ----------------
// | Chain Config |
// ----------------

/// The definition of the network the engine trades on
///
/// Carries everything needed to issue an add-chain request to a signer
/// that does not yet know the network.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// The chain id
    pub chain_id: u64,
    /// The human-readable network name
    pub name: String,
    /// The RPC endpoint for the network
    pub rpc_url: String,
    /// The block explorer base URL
    pub explorer_url: String,
    /// The symbol of the native asset
    pub native_symbol: String,
}

impl ChainConfig {
    /// The Base mainnet configuration
    pub fn base_mainnet() -> Self {
        Self {
            chain_id: BASE_CHAIN_ID,
            name: "Base".to_string(),
            rpc_url: BASE_RPC_URL.to_string(),
            explorer_url: BASE_EXPLORER_URL.to_string(),
            native_symbol: "ETH".to_string(),
        }
    }

    /// The chain id formatted as a 0x-prefixed hex string, as expected
    /// by signer switch-chain requests
    pub fn chain_id_hex(&self) -> String {
        format!("{:#x}", self.chain_id)
    }
}

// ------------------------
// | Slippage Tolerance |
// ------------------------

/// The minimum accepted slippage tolerance, in basis points
pub const MIN_SLIPPAGE_BPS: u16 = 1;
/// The maximum accepted slippage tolerance, in basis points
pub const MAX_SLIPPAGE_BPS: u16 = 500;
/// The default slippage tolerance, in basis points (0.5%)
pub const DEFAULT_SLIPPAGE_BPS: u16 = 50;

/// A validated slippage tolerance in basis points
///
/// Governs the minimum-acceptable-output computation for a quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlippageBps(u16);

impl SlippageBps {
    /// Construct a slippage tolerance, validating the accepted range
    pub fn new(bps: u16) -> Result<Self, SwapError> {
        if !(MIN_SLIPPAGE_BPS..=MAX_SLIPPAGE_BPS).contains(&bps) {
            return Err(SwapError::invalid_amount(format!(
                "slippage must be between {MIN_SLIPPAGE_BPS} and {MAX_SLIPPAGE_BPS} bps, got {bps}"
            )));
        }

        Ok(Self(bps))
    }

    /// The tolerance in basis points
    pub fn bps(&self) -> u16 {
        self.0
    }
}

impl Default for SlippageBps {
    fn default() -> Self {
        Self(DEFAULT_SLIPPAGE_BPS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The slippage bounds are enforced on construction
    #[test]
    fn test_slippage_bounds() {
        assert!(SlippageBps::new(0).is_err());
        assert!(SlippageBps::new(501).is_err());
        assert_eq!(SlippageBps::new(1).unwrap().bps(), 1);
        assert_eq!(SlippageBps::new(500).unwrap().bps(), 500);
        assert_eq!(SlippageBps::default().bps(), DEFAULT_SLIPPAGE_BPS);
    }
}
