//! Numeric and price parsing for scraped text.
//!
//! The storefront renders prices with currency symbols, non-breaking
//! spaces, and a comma decimal separator. Policy: strip everything
//! outside digits/comma/dot/minus, normalise the comma, parse as decimal.
//! Required price fields resolve to zero on failure (the site's markup is
//! not contractual and a missing price must not kill a whole listing);
//! optional price fields go through [`try_parse_price`] so absence stays
//! absence and a garbled strike-through price can never fabricate a
//! discount.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// Parse a price string, resolving to zero on any failure.
pub fn parse_price(raw: &str) -> Decimal {
    try_parse_price(raw).unwrap_or(Decimal::ZERO)
}

/// Parse a price string, `None` on failure.
pub fn try_parse_price(raw: &str) -> Option<Decimal> {
    let kept: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-'))
        .collect();
    if kept.is_empty() {
        return None;
    }

    let normalised = match (kept.rfind(','), kept.rfind('.')) {
        // Both present: the rightmost one is the decimal separator, the
        // other is a thousands separator.
        (Some(comma), Some(dot)) => {
            if comma > dot {
                kept.replace('.', "").replace(',', ".")
            } else {
                kept.replace(',', "")
            }
        }
        (Some(_), None) => kept.replace(',', "."),
        _ => kept,
    };

    normalised.parse::<Decimal>().ok()
}

/// Parse an integer quantity ("2", "2 pcs"), zero on failure.
pub fn parse_quantity(raw: &str) -> u32 {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    digits.parse().unwrap_or(0)
}

/// Derived discount percentage, computed only when a higher original
/// price is present — never scraped directly.
pub fn discount_pct(original: Decimal, price: Decimal) -> Option<u32> {
    if original <= price || original <= Decimal::ZERO {
        return None;
    }
    let pct = (original - price) * Decimal::from(100) / original;
    pct.round().to_u32()
}
