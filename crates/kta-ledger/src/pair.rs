//! Instrument-identifier normalization.
//!
//! Kraken reports pairs in several generations of encoding: the legacy
//! fixed-width `X<BASE>Z<QUOTE>` form (`XXBTZUSD`), plain concatenation
//! (`ETHUSD`, `DOTUSD`), and separator form (`ETH/USDT`). This module maps
//! any of them to an uppercase `(base, quote)` pair.
//!
//! The split is heuristic for identifiers outside the known encodings;
//! callers should treat an empty base or quote as a data-quality signal,
//! never as a fatal condition.

/// Legacy tickers rewritten to their common form before splitting.
const ASSET_ALIASES: &[(&str, &str)] = &[("XXDG", "DOGE"), ("XBT", "BTC")];

/// Quote currencies matched as suffixes when the legacy `Z` split does not
/// apply. Four-character symbols are tried before three-character ones so
/// `ETHUSDT` resolves to `(ETH, USDT)` and `ETHUSD` to `(ETH, USD)`.
const QUOTE_SUFFIXES_4: &[&str] = &["USDT", "USDC"];
const QUOTE_SUFFIXES_3: &[&str] = &["USD", "EUR", "GBP", "JPY", "CAD", "AUD", "CHF", "BTC", "ETH", "DAI"];

/// Split a raw instrument identifier into `(base, quote)`.
///
/// Empty input yields `("", "")`; an identifier too short to split keeps the
/// whole string as base with an empty quote.
pub fn split_pair(raw: &str) -> (String, String) {
    if raw.is_empty() {
        return (String::new(), String::new());
    }

    let mut p = raw.replace('/', "").to_uppercase();
    for (alias, canonical) in ASSET_ALIASES {
        p = p.replace(alias, canonical);
    }

    // Anything non-ASCII is not a known venue encoding; keep it whole.
    if !p.is_ascii() {
        return (p, String::new());
    }

    // Legacy "BASEZQUOTE" format (e.g. XETHZUSD). Split at the last 'Z' and
    // accept only a plausible 3-4 character quote; a single leading 'X' on
    // the base side is the legacy asset-prefix marker.
    if p.len() >= 7 {
        if let Some(i) = p.rfind('Z') {
            let (left, right) = (&p[..i], &p[i + 1..]);
            if !left.is_empty() && (3..=4).contains(&right.len()) {
                let base = if left.len() >= 2 && left.starts_with('X') {
                    &left[1..]
                } else {
                    left
                };
                return (base.to_string(), right.to_string());
            }
        }
    }

    // Concatenated form: match known quote symbols from the end.
    for quote in QUOTE_SUFFIXES_4.iter().chain(QUOTE_SUFFIXES_3) {
        if p.len() > quote.len() && p.ends_with(quote) {
            return (p[..p.len() - quote.len()].to_string(), (*quote).to_string());
        }
    }

    // Best-effort fallback: trailing 4 then 3 characters as the quote.
    for quote_len in [4usize, 3] {
        if p.len() > quote_len {
            return (
                p[..p.len() - quote_len].to_string(),
                p[p.len() - quote_len..].to_string(),
            );
        }
    }

    (p, String::new())
}
