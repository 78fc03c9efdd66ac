//! kta-ledger
//!
//! FIFO trade-accounting core:
//! - Exact-decimal arithmetic helpers (no floats on money or volume)
//! - Instrument-pair normalization (legacy venue encodings included)
//! - Per-pair FIFO lot ledger: buys open lots, sells consume them oldest-first
//! - Ledger book routing an ordered record stream to per-pair ledgers
//! - Valuation of remaining inventory against current prices
//!
//! Pure deterministic logic (no IO, no time, no network). Two books fed the
//! same record sequence always produce identical state.

pub mod book;
pub mod ledger;
pub mod num;
pub mod pair;
pub mod valuation;

pub use book::{AdjustError, ApplyStats, BookConfig, LedgerBook, TradeRecord};
pub use ledger::{Lot, PairLedger, SellOutcome};
pub use num::{parse_decimal, safe_div};
pub use pair::split_pair;
pub use valuation::PairReport;
