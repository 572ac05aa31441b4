//! Amount parsing for the airdrop form.
//!
//! Both text areas accept values separated by any run of commas and/or
//! newlines. Two separate computations exist on top of that split:
//!
//! - the **submission** parse keeps plain non-negative integers in the token's
//!   smallest unit (`U256`, no precision loss) and is what the allowance check
//!   and the approval amount use;
//! - the **preview** parse is decimal tolerant and sign preserving, and only
//!   feeds the live total shown while typing.
//!
//! Malformed tokens never fail a parse; they are dropped.

use ethers::types::U256;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Split free-form text on comma/newline runs, trimming and dropping empties.
pub fn split_fields(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| c == ',' || c == '\n')
        .map(str::trim)
        .filter(|field| !field.is_empty())
}

fn is_plain_integer(field: &str) -> bool {
    !field.is_empty() && field.bytes().all(|b| b.is_ascii_digit())
}

/// Parse smallest-unit amounts for submission, in input order.
///
/// Only unsigned decimal integers that fit in 256 bits survive. Signs,
/// decimal points, hex and anything else is dropped.
pub fn parse_amounts(text: &str) -> Vec<U256> {
    split_fields(text)
        .filter(|field| is_plain_integer(field))
        .filter_map(|field| U256::from_dec_str(field).ok())
        .collect()
}

/// Exact sum of submission amounts. `None` when the sum exceeds `U256::MAX`.
pub fn submission_total(amounts: &[U256]) -> Option<U256> {
    amounts
        .iter()
        .try_fold(U256::zero(), |acc, amount| acc.checked_add(*amount))
}

/// Parse amounts for the live preview: signed decimals, malformed tokens dropped.
///
/// Values outside the `Decimal` range (about 7.9e28) are dropped as well, so
/// the preview undercounts them. The exact `U256` total from
/// [`submission_total`] still includes them.
pub fn parse_preview_amounts(text: &str) -> Vec<Decimal> {
    split_fields(text)
        .filter_map(|field| Decimal::from_str(field).ok())
        .collect()
}

/// Live preview total of whatever numeric values the text currently holds.
pub fn preview_total(text: &str) -> Decimal {
    parse_preview_amounts(text)
        .into_iter()
        .fold(Decimal::ZERO, |acc, value| acc.saturating_add(value))
}

/// Number of fractional digits shown for token-unit totals.
pub const DISPLAY_FRACTION_DIGITS: usize = 6;

/// Format a smallest-unit amount in whole tokens with six fractional digits.
///
/// Digits past the sixth are truncated, never rounded up.
pub fn format_token_amount(amount: U256, decimals: u8) -> String {
    let scale = match U256::from(10u8).checked_pow(U256::from(decimals)) {
        Some(scale) => scale,
        None => return amount.to_string(),
    };
    let whole = amount / scale;
    let fraction = (amount % scale).to_string();
    let padded = format!("{:0>width$}", fraction, width = decimals as usize);
    let mut shown: String = padded.chars().take(DISPLAY_FRACTION_DIGITS).collect();
    while shown.len() < DISPLAY_FRACTION_DIGITS {
        shown.push('0');
    }
    format!("{}.{}", whole, shown)
}
