//! Amount parsing, unit conversion, and display formatting

use alloy_primitives::U256;

use crate::{config::SlippageBps, error::SwapError};

// -------------
// | Constants |
// -------------

/// The basis-point denominator
const BPS_DENOMINATOR: u64 = 10_000;

/// The most fractional digits kept by input sanitizing
const MAX_INPUT_DECIMALS: usize = 18;

// --------------
// | Sanitizing |
// --------------

/// Clean raw numeric text input into a plain decimal string
///
/// Keeps ASCII digits and the first decimal point, capping the
/// fractional part at the finest supported token precision; everything
/// else is dropped. The result may still be empty or zero, which
/// downstream parsing rejects.
pub fn sanitize_amount_input(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut frac_digits = None;
    for c in raw.chars() {
        match c {
            '.' if frac_digits.is_none() => {
                frac_digits = Some(0);
                out.push(c);
            },
            c if c.is_ascii_digit() => match frac_digits {
                Some(n) if n >= MAX_INPUT_DECIMALS => {},
                Some(n) => {
                    frac_digits = Some(n + 1);
                    out.push(c);
                },
                None => out.push(c),
            },
            _ => {},
        }
    }

    out
}

// -------------------
// | Unit Conversion |
// -------------------

/// Convert a human-readable decimal amount into the token's smallest
/// integer unit
///
/// Fractional digits beyond the token's precision are rounded half-up,
/// so the result equals `round(amount * 10^decimals)`.
pub fn parse_units(amount: &str, decimals: u8) -> Result<U256, SwapError> {
    let amount = amount.trim();
    let (int_part, frac_part) = match amount.split_once('.') {
        Some((i, f)) => (i, f),
        None => (amount, ""),
    };

    if int_part.is_empty() && frac_part.is_empty() {
        return Err(SwapError::invalid_amount("empty amount"));
    }
    let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if !all_digits(int_part) || !all_digits(frac_part) {
        return Err(SwapError::invalid_amount(format!("not a decimal number: {amount}")));
    }

    let decimals = decimals as usize;
    let int_units = parse_decimal_digits(int_part)?;

    // Keep the in-precision fractional digits, rounding half-up on the
    // first digit beyond the token's precision
    let kept: &str = &frac_part[..frac_part.len().min(decimals)];
    let mut frac_units = parse_decimal_digits(kept)?;
    let padding = decimals - kept.len();
    frac_units *= U256::from(10u64).pow(U256::from(padding));
    if frac_part[kept.len()..].chars().next().is_some_and(|d| d >= '5') {
        frac_units += U256::from(1u64);
    }

    let scale = U256::from(10u64).pow(U256::from(decimals));
    int_units
        .checked_mul(scale)
        .and_then(|v| v.checked_add(frac_units))
        .ok_or(SwapError::invalid_amount(format!("amount overflows: {amount}")))
}

/// Parse a string of decimal digits into a `U256`, treating the empty
/// string as zero
fn parse_decimal_digits(digits: &str) -> Result<U256, SwapError> {
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }

    U256::from_str_radix(digits, 10).map_err(SwapError::parse)
}

/// Format a smallest-unit amount with the token's full precision
///
/// All fractional places are retained, so a 6-decimal amount of
/// `2500000000` formats as `2500.000000`.
pub fn format_units_full(raw: U256, decimals: u8) -> String {
    if decimals == 0 {
        return raw.to_string();
    }

    let scale = U256::from(10u64).pow(U256::from(decimals));
    let int = raw / scale;
    let frac = (raw % scale).to_string();
    let frac_padded = format!("{}{frac}", "0".repeat(decimals as usize - frac.len()));

    format!("{int}.{frac_padded}")
}

/// Convert a smallest-unit amount to an `f64` for display purposes
///
/// Lossy beyond ~15 significant digits; only used to pick a display
/// band, never for on-chain arithmetic.
pub fn units_to_f64(raw: U256, decimals: u8) -> f64 {
    let value: f64 = raw.to_string().parse().unwrap_or(f64::MAX);
    value / 10f64.powi(i32::from(decimals))
}

// --------------
// | Formatting |
// --------------

/// Format a display value with precision banded by magnitude
///
/// Zero formats as `0`, dust as `< 0.0001`, then 6, 4, and 2 decimal
/// places as the value grows.
pub fn format_display(value: f64) -> String {
    if value == 0.0 {
        "0".to_string()
    } else if value < 0.0001 {
        "< 0.0001".to_string()
    } else if value < 1.0 {
        format!("{value:.6}")
    } else if value < 1000.0 {
        format!("{value:.4}")
    } else {
        format!("{value:.2}")
    }
}

// ------------
// | Slippage |
// ------------

/// The minimum acceptable output for a quoted buy amount under the
/// given slippage tolerance
///
/// Exact integer floor division; this is the on-chain enforced minimum,
/// not a rounded estimate.
pub fn min_buy_amount(buy_amount_raw: U256, slippage: SlippageBps) -> U256 {
    let factor = U256::from(BPS_DENOMINATOR - u64::from(slippage.bps()));
    let denominator = U256::from(BPS_DENOMINATOR);

    // Split the multiplication so it cannot overflow for any U256 input
    let quotient = buy_amount_raw / denominator;
    let remainder = buy_amount_raw % denominator;
    quotient * factor + remainder * factor / denominator
}
