//! Routing an ordered trade-record stream into per-pair ledgers.
//!
//! The book owns one [`PairLedger`] per normalized (base, quote) key and
//! folds records strictly in the order supplied. FIFO correctness depends
//! on the buys for a pair preceding the sells they cover, so callers hand
//! records over chronologically.
//!
//! Records are parsed defensively: a row missing or misformatting a required
//! field is skipped and counted, never fatal. An optional quote-currency
//! allow-list drops records before they reach any ledger.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use rust_decimal::Decimal;

use crate::ledger::PairLedger;
use crate::num::parse_decimal;
use crate::pair::split_pair;

// ---------------------------------------------------------------------------
// Boundary input
// ---------------------------------------------------------------------------

/// One raw trade record as handed over by a trade source.
///
/// Numeric fields stay venue-reported strings; the book parses them. `cost`
/// is optional because some venues derive it (`volume * price`) instead of
/// reporting it.
#[derive(Clone, Debug, PartialEq)]
pub struct TradeRecord {
    /// Raw instrument identifier, e.g. `XXBTZUSD`.
    pub pair: String,
    /// `"buy"` or `"sell"`, case-insensitive.
    pub side: String,
    pub volume: String,
    pub price: String,
    pub cost: Option<String>,
    pub fee: String,
    /// Trade timestamp as epoch seconds.
    pub time: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" => Some(TradeSide::Buy),
            "sell" => Some(TradeSide::Sell),
            _ => None,
        }
    }
}

/// A record with every field parsed and the pair normalized.
struct ParsedTrade {
    base: String,
    quote: String,
    raw_pair: String,
    side: TradeSide,
    volume: Decimal,
    price: Decimal,
    cost: Option<Decimal>,
    fee: Decimal,
    time: f64,
}

fn parse_record(record: &TradeRecord) -> Option<ParsedTrade> {
    let raw_pair = record.pair.trim().to_string();
    let (base, quote) = split_pair(&raw_pair);
    let side = TradeSide::parse(&record.side)?;
    let volume = parse_decimal(&record.volume)?;
    let price = parse_decimal(&record.price)?;
    let cost = match &record.cost {
        Some(c) => Some(parse_decimal(c)?),
        None => None,
    };
    let fee = parse_decimal(&record.fee)?;
    Some(ParsedTrade {
        base,
        quote,
        raw_pair,
        side,
        volume,
        price,
        cost,
        fee,
        time: record.time,
    })
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Accounting policy for a book, fixed at construction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BookConfig {
    /// When set, buy cost includes the fee and sell proceeds are net of it.
    pub include_fees_in_cost: bool,
    /// When present, records whose quote currency is not in the set are
    /// dropped entirely.
    pub quote_filter: Option<BTreeSet<String>>,
}

impl BookConfig {
    /// The default operating policy: fees capitalized, every quote analyzed.
    pub fn fees_in_cost() -> Self {
        Self {
            include_fees_in_cost: true,
            quote_filter: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Apply outcome
// ---------------------------------------------------------------------------

/// Per-batch counters from [`LedgerBook::apply_all`].
///
/// Failures are counted, not raised: a batch never aborts on a bad row.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ApplyStats {
    /// Records folded into a ledger.
    pub applied: usize,
    /// Records dropped because a required field failed to parse.
    pub skipped_malformed: usize,
    /// Records dropped by the quote-currency allow-list.
    pub filtered_out: usize,
    /// Applied sells whose volume exceeded the open lots (data-quality
    /// signal; the accounting saturated silently).
    pub oversold: usize,
}

// ---------------------------------------------------------------------------
// Adjustment boundary errors
// ---------------------------------------------------------------------------

/// Rejections from the validated inventory-adjustment boundary. The book is
/// not mutated when one of these is returned.
#[derive(Clone, Debug, PartialEq)]
pub enum AdjustError {
    /// Target remaining volume must be >= 0.
    NegativeTarget { target: Decimal },
    /// No ledger exists for the requested (base, quote).
    UnknownPair { base: String, quote: String },
}

impl fmt::Display for AdjustError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdjustError::NegativeTarget { target } => {
                write!(f, "adjustment target must be >= 0, got {target}")
            }
            AdjustError::UnknownPair { base, quote } => {
                write!(f, "no ledger for pair {base}/{quote}")
            }
        }
    }
}

impl std::error::Error for AdjustError {}

// ---------------------------------------------------------------------------
// Ledger book
// ---------------------------------------------------------------------------

/// All per-pair ledgers for one analysis run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LedgerBook {
    config: BookConfig,
    ledgers: BTreeMap<(String, String), PairLedger>,
}

impl LedgerBook {
    pub fn new(config: BookConfig) -> Self {
        Self {
            config,
            ledgers: BTreeMap::new(),
        }
    }

    /// Fold an ordered batch of records into the book.
    pub fn apply_all(&mut self, records: &[TradeRecord]) -> ApplyStats {
        let mut stats = ApplyStats::default();
        for record in records {
            self.apply_record(record, &mut stats);
        }
        stats
    }

    fn apply_record(&mut self, record: &TradeRecord, stats: &mut ApplyStats) {
        let Some(trade) = parse_record(record) else {
            stats.skipped_malformed += 1;
            return;
        };

        if let Some(filter) = &self.config.quote_filter {
            if !filter.contains(&trade.quote) {
                stats.filtered_out += 1;
                return;
            }
        }

        let ledger = self
            .ledgers
            .entry((trade.base, trade.quote))
            .or_default();
        ledger.note_observation(trade.time, &trade.raw_pair);

        match trade.side {
            TradeSide::Buy => {
                ledger.apply_buy(
                    trade.volume,
                    trade.price,
                    trade.cost,
                    trade.fee,
                    self.config.include_fees_in_cost,
                );
            }
            TradeSide::Sell => {
                let outcome = ledger.apply_sell(
                    trade.volume,
                    trade.price,
                    trade.cost,
                    trade.fee,
                    self.config.include_fees_in_cost,
                );
                if outcome.unmatched_volume > Decimal::ZERO {
                    stats.oversold += 1;
                }
            }
        }
        stats.applied += 1;
    }

    /// Shrink one pair's remaining inventory to `target_volume`.
    ///
    /// This is the validated adjustment boundary: negative targets and
    /// unknown pairs are rejected without mutating anything. Shrinking never
    /// alters realized accounting (see [`PairLedger::shrink_to_target`]).
    pub fn shrink_pair(
        &mut self,
        base: &str,
        quote: &str,
        target_volume: Decimal,
    ) -> Result<(), AdjustError> {
        if target_volume < Decimal::ZERO {
            return Err(AdjustError::NegativeTarget {
                target: target_volume,
            });
        }
        let key = (base.to_string(), quote.to_string());
        let ledger = self.ledgers.get_mut(&key).ok_or_else(|| AdjustError::UnknownPair {
            base: base.to_string(),
            quote: quote.to_string(),
        })?;
        ledger.shrink_to_target(target_volume);
        Ok(())
    }

    /// Ledgers keyed by (base, quote), in key order.
    pub fn ledgers(&self) -> impl Iterator<Item = (&(String, String), &PairLedger)> {
        self.ledgers.iter()
    }

    pub fn get(&self, base: &str, quote: &str) -> Option<&PairLedger> {
        self.ledgers.get(&(base.to_string(), quote.to_string()))
    }

    pub fn len(&self) -> usize {
        self.ledgers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ledgers.is_empty()
    }

    pub fn config(&self) -> &BookConfig {
        &self.config
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
