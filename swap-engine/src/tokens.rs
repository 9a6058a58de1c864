//! The static token registry for the Base network

use alloy_primitives::{hex, Address};

// -------------
// | Constants |
// -------------

/// The sentinel address denoting the chain's native asset
///
/// The native asset has no contract; it is never approved or
/// allowance-checked.
pub const NATIVE_TOKEN_ADDRESS: Address =
    Address::new(hex!("0xEeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE"));

/// The supported tokens on Base mainnet
static TOKENS: &[Token] = &[
    Token {
        address: NATIVE_TOKEN_ADDRESS,
        symbol: "ETH",
        name: "Ether",
        decimals: 18,
        icon: "icons/eth.svg",
    },
    Token {
        address: Address::new(hex!("0x4200000000000000000000000000000000000006")),
        symbol: "WETH",
        name: "Wrapped Ether",
        decimals: 18,
        icon: "icons/weth.svg",
    },
    Token {
        address: Address::new(hex!("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913")),
        symbol: "USDC",
        name: "USD Coin",
        decimals: 6,
        icon: "icons/usdc.svg",
    },
    Token {
        address: Address::new(hex!("0xd9aAEc86B65D86f6A7B5B1b0c42FFA531710b6CA")),
        symbol: "USDbC",
        name: "USD Base Coin",
        decimals: 6,
        icon: "icons/usdbc.svg",
    },
    Token {
        address: Address::new(hex!("0x50c5725949A6F0c72E6C4a641F24049A917DB0Cb")),
        symbol: "DAI",
        name: "Dai Stablecoin",
        decimals: 18,
        icon: "icons/dai.svg",
    },
    Token {
        address: Address::new(hex!("0x2Ae3F1Ec7F1F5012CFEab0185bfc7aa3cf0DEc22")),
        symbol: "cbETH",
        name: "Coinbase Wrapped Staked ETH",
        decimals: 18,
        icon: "icons/cbeth.svg",
    },
];

// ---------
// | Types |
// ---------

/// A token supported by the swap interface
///
/// Immutable and drawn from the static registry; the address uniquely
/// identifies a token within the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    /// The canonical chain address, or the native-asset sentinel
    pub address: Address,
    /// The ticker symbol
    pub symbol: &'static str,
    /// The full display name
    pub name: &'static str,
    /// The number of decimals in the token's smallest unit
    pub decimals: u8,
    /// The display icon reference
    pub icon: &'static str,
}

impl Token {
    /// Whether this token is the chain's native asset
    pub fn is_native(&self) -> bool {
        self.address == NATIVE_TOKEN_ADDRESS
    }
}

// ------------
// | Registry |
// ------------

/// All supported tokens, in display order
pub fn all_tokens() -> &'static [Token] {
    TOKENS
}

/// Look up a token by its ticker symbol, case-insensitively
pub fn by_symbol(symbol: &str) -> Option<Token> {
    TOKENS.iter().find(|t| t.symbol.eq_ignore_ascii_case(symbol)).copied()
}

/// Look up a token by its address
///
/// Address comparison is byte-wise, so mixed-case hex inputs resolve to
/// the same token once parsed.
pub fn by_address(address: Address) -> Option<Token> {
    TOKENS.iter().find(|t| t.address == address).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Symbol lookup is case-insensitive
    #[test]
    fn test_lookup_by_symbol() {
        assert_eq!(by_symbol("usdc").unwrap().symbol, "USDC");
        assert_eq!(by_symbol("WETH").unwrap().decimals, 18);
        assert!(by_symbol("SHIB").is_none());
    }

    /// Address lookup resolves mixed-case inputs to the same token
    #[test]
    fn test_lookup_by_address() {
        let lower: Address = "0x833589fcd6edb6e08f4c7c32d4f71b54bda02913".parse().unwrap();
        assert_eq!(by_address(lower).unwrap().symbol, "USDC");
    }

    /// Only the sentinel address is native
    #[test]
    fn test_native_sentinel() {
        assert!(by_symbol("ETH").unwrap().is_native());
        assert!(!by_symbol("WETH").unwrap().is_native());
    }

    /// Addresses are unique within the registry
    #[test]
    fn test_unique_addresses() {
        for (i, a) in TOKENS.iter().enumerate() {
            for b in &TOKENS[i + 1..] {
                assert_ne!(a.address, b.address);
            }
        }
    }
}
