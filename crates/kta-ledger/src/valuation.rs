//! Valuation of a ledger book against current prices.
//!
//! Produces one flat [`PairReport`] per (base, quote): the running totals,
//! zero-guarded average prices, and, where a current price is known,
//! unrealized PnL over the remaining lots. A missing price is the explicit
//! "no price data" state: current price and unrealized PnL both report zero,
//! which readers must not confuse with a worthless asset.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::book::LedgerBook;
use crate::ledger::PairLedger;
use crate::num::safe_div;

/// Derived, read-only snapshot for one pair. Field order is the column order
/// consumers render.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PairReport {
    pub asset: String,
    pub quote: String,
    pub total_bought: Decimal,
    pub avg_buy_price: Decimal,
    pub total_sold: Decimal,
    pub avg_sell_price: Decimal,
    /// Bought minus sold volume, in units (not money).
    pub net_from_history: Decimal,
    pub remaining_unsold_volume: Decimal,
    pub avg_buy_price_of_remaining: Decimal,
    pub fees_total: Decimal,
    /// Realized PnL in the quote currency.
    pub realized_pnl: Decimal,
    pub current_price: Decimal,
    /// Unrealized PnL in the quote currency; zero when no price is known.
    pub unrealized_pnl: Decimal,
}

/// Compute a report row per pair, sorted by (base, quote).
///
/// `prices` is keyed by raw instrument identifier, matching the form seen in
/// the trade records (each ledger remembers one example identifier for this
/// lookup). Pairs absent from the map value at zero.
pub fn compute(book: &LedgerBook, prices: &BTreeMap<String, Decimal>) -> Vec<PairReport> {
    book.ledgers()
        .map(|((base, quote), ledger)| {
            let current_price = prices
                .get(ledger.pair_identifier())
                .copied()
                .unwrap_or(Decimal::ZERO);
            report_for(base, quote, ledger, current_price)
        })
        .collect()
}

fn report_for(base: &str, quote: &str, ledger: &PairLedger, current_price: Decimal) -> PairReport {
    let (remaining_volume, remaining_cost) = ledger.remaining_inventory();

    let mut unrealized = Decimal::ZERO;
    if current_price > Decimal::ZERO && remaining_volume > Decimal::ZERO {
        for lot in ledger.lots() {
            unrealized += (current_price - lot.unit_cost()) * lot.remaining_volume();
        }
    }

    PairReport {
        asset: base.to_string(),
        quote: quote.to_string(),
        total_bought: ledger.buy_volume(),
        avg_buy_price: safe_div(ledger.buy_cost(), ledger.buy_volume()),
        total_sold: ledger.sell_volume(),
        avg_sell_price: safe_div(ledger.sell_proceeds(), ledger.sell_volume()),
        net_from_history: ledger.buy_volume() - ledger.sell_volume(),
        remaining_unsold_volume: remaining_volume,
        avg_buy_price_of_remaining: safe_div(remaining_cost, remaining_volume),
        fees_total: ledger.fees_total(),
        realized_pnl: ledger.realized_pnl(),
        current_price,
        unrealized_pnl: unrealized,
    }
}
