//! Exact-decimal helpers shared by every accounting path.
//!
//! All monetary and volume arithmetic in this crate routes through
//! [`rust_decimal::Decimal`]; nothing here (or downstream) touches binary
//! floating point, so figures never drift from the venue-reported strings.

use std::str::FromStr;

use rust_decimal::Decimal;

/// Parse a venue-reported numeric string into an exact decimal.
///
/// Returns `None` for anything that does not parse cleanly; callers decide
/// whether that means "skip the record" or "treat as zero".
pub fn parse_decimal(s: &str) -> Option<Decimal> {
    Decimal::from_str(s.trim()).ok()
}

/// Division with the "no volume yet" convention: a zero denominator yields
/// zero instead of failing.
///
/// The zero result stands for "undefined / no data" (e.g. an average price
/// before any volume traded), not a literal zero value; callers rendering it
/// must keep that reading.
pub fn safe_div(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator.is_zero() {
        Decimal::ZERO
    } else {
        numerator / denominator
    }
}
