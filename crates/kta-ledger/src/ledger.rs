//! Per-pair FIFO lot accounting.
//!
//! # Model
//! Every buy appends a [`Lot`] (remaining volume + unit cost) to the tail of
//! the pair's queue. Every sell consumes lots from the head, oldest first,
//! splitting the head lot in place when the sell volume lands inside it.
//! Realized PnL is the FIFO-matched difference between per-unit proceeds and
//! each consumed lot's unit cost.
//!
//! # Invariants
//! - The queue order is acquisition order and is never rearranged.
//! - `Lot::total_cost` tracks `remaining_volume * unit_cost` whenever a lot
//!   is partially consumed; it is never mutated independently.
//! - Remaining inventory is exactly what FIFO consumption (plus external
//!   shrinks) implies; it is never recomputed from the running totals.
//!
//! Lots are owned exclusively by their ledger and only ever reachable as
//! shared references, so no caller can perturb the queue from outside.
//!
//! # Determinism
//! Pure logic, no IO, no time. Two ledgers fed the same operation sequence
//! are always equal.

use std::collections::VecDeque;

use rust_decimal::Decimal;

use crate::num::safe_div;

/// One unconsumed (or partially consumed) batch of acquired units.
#[derive(Clone, Debug, PartialEq)]
pub struct Lot {
    remaining_volume: Decimal,
    unit_cost: Decimal,
    total_cost: Decimal,
}

impl Lot {
    /// Units of the original acquisition still held.
    pub fn remaining_volume(&self) -> Decimal {
        self.remaining_volume
    }

    /// Acquisition cost per unit (fees capitalized when so configured).
    pub fn unit_cost(&self) -> Decimal {
        self.unit_cost
    }

    /// Cost carried by the still-held units.
    pub fn total_cost(&self) -> Decimal {
        self.total_cost
    }
}

/// What a single sell application did to the ledger.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SellOutcome {
    /// FIFO-matched realized PnL contributed by this sell (already folded
    /// into the ledger's running total).
    pub realized_pnl: Decimal,
    /// Sell volume left over after every open lot was consumed. Non-zero
    /// means the recorded history is missing the covering buys; the sell
    /// still saturated silently, this is purely a data-quality signal.
    pub unmatched_volume: Decimal,
}

/// Running accounting state for one (base, quote) pair.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PairLedger {
    buy_volume: Decimal,
    buy_cost: Decimal,
    sell_volume: Decimal,
    sell_proceeds: Decimal,
    fees_total: Decimal,
    realized_pnl: Decimal,
    lots: VecDeque<Lot>,
    last_seen_timestamp: f64,
    example_pair_identifier: String,
}

impl PairLedger {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Write surface
    // -----------------------------------------------------------------------

    /// Apply a buy: fold into the running totals and open a new tail lot.
    ///
    /// `cost` defaults to `volume * price` when the venue did not report it
    /// separately. Zero-volume buys are accepted and open a degenerate
    /// zero-unit-cost lot.
    pub fn apply_buy(
        &mut self,
        volume: Decimal,
        price: Decimal,
        cost: Option<Decimal>,
        fee: Decimal,
        include_fee_in_cost: bool,
    ) {
        debug_assert!(volume >= Decimal::ZERO);
        debug_assert!(price >= Decimal::ZERO);
        debug_assert!(fee >= Decimal::ZERO);

        let cost = cost.unwrap_or(volume * price);
        let buy_cost = if include_fee_in_cost { cost + fee } else { cost };

        self.buy_volume += volume;
        self.buy_cost += buy_cost;
        self.fees_total += fee;

        let unit_cost = safe_div(buy_cost, volume);
        self.lots.push_back(Lot {
            remaining_volume: volume,
            unit_cost,
            total_cost: buy_cost,
        });
    }

    /// Apply a sell: fold into the running totals, then consume open lots
    /// from the head until the sell volume is matched or the queue runs dry.
    ///
    /// Selling more than the recorded lots hold saturates silently: realized
    /// PnL reflects only the matched volume and the excess is reported in
    /// [`SellOutcome::unmatched_volume`].
    pub fn apply_sell(
        &mut self,
        volume: Decimal,
        price: Decimal,
        cost: Option<Decimal>,
        fee: Decimal,
        include_fee_in_cost: bool,
    ) -> SellOutcome {
        debug_assert!(volume >= Decimal::ZERO);
        debug_assert!(price >= Decimal::ZERO);
        debug_assert!(fee >= Decimal::ZERO);

        let cost = cost.unwrap_or(volume * price);
        let proceeds = if include_fee_in_cost { cost - fee } else { cost };

        self.sell_volume += volume;
        self.sell_proceeds += proceeds;
        self.fees_total += fee;

        let per_unit_proceeds = safe_div(proceeds, volume);

        let mut remaining = volume;
        let mut realized = Decimal::ZERO;
        while remaining > Decimal::ZERO {
            let drained = match self.lots.front_mut() {
                None => break,
                Some(lot) => {
                    let used = lot.remaining_volume.min(remaining);
                    realized += used * per_unit_proceeds - used * lot.unit_cost;
                    lot.remaining_volume -= used;
                    remaining -= used;
                    if lot.remaining_volume.is_zero() {
                        true
                    } else {
                        lot.total_cost = lot.remaining_volume * lot.unit_cost;
                        false
                    }
                }
            };
            if drained {
                self.lots.pop_front();
            }
        }

        self.realized_pnl += realized;
        SellOutcome {
            realized_pnl: realized,
            unmatched_volume: remaining,
        }
    }

    /// Shrink open inventory down to `target_volume` units, consuming lots
    /// from the head exactly like a sell, but without touching any sell,
    /// fee, or realized-PnL accounting.
    ///
    /// This reconciles the ledger with activity outside the recorded history
    /// (transfers, trades on another venue); no proceeds exist for it, so
    /// realized figures must stay untouched. A target at or above the
    /// current remaining volume is a no-op: the operation only removes
    /// inventory, it never fabricates lots.
    ///
    /// Non-negative `target_volume` is the caller-checked precondition; see
    /// [`crate::book::LedgerBook::shrink_pair`] for the validated boundary.
    pub fn shrink_to_target(&mut self, target_volume: Decimal) {
        debug_assert!(target_volume >= Decimal::ZERO);

        let (current, _) = self.remaining_inventory();
        if target_volume >= current {
            return;
        }

        let mut to_reduce = current - target_volume;
        while to_reduce > Decimal::ZERO {
            let drained = match self.lots.front_mut() {
                None => break,
                Some(lot) => {
                    let used = lot.remaining_volume.min(to_reduce);
                    lot.remaining_volume -= used;
                    to_reduce -= used;
                    if lot.remaining_volume.is_zero() {
                        true
                    } else {
                        lot.total_cost = lot.remaining_volume * lot.unit_cost;
                        false
                    }
                }
            };
            if drained {
                self.lots.pop_front();
            }
        }
    }

    /// Record the raw identifier and timestamp of a trade routed here.
    ///
    /// Keeps the first identifier seen (for downstream price lookup) and the
    /// maximum timestamp. Both are informational only.
    pub fn note_observation(&mut self, timestamp: f64, pair_identifier: &str) {
        if timestamp > self.last_seen_timestamp {
            self.last_seen_timestamp = timestamp;
        }
        if self.example_pair_identifier.is_empty() {
            self.example_pair_identifier = pair_identifier.to_string();
        }
    }

    // -----------------------------------------------------------------------
    // Read surface
    // -----------------------------------------------------------------------

    /// Total remaining (volume, cost) over all open lots.
    pub fn remaining_inventory(&self) -> (Decimal, Decimal) {
        let mut volume = Decimal::ZERO;
        let mut cost = Decimal::ZERO;
        for lot in &self.lots {
            volume += lot.remaining_volume;
            cost += lot.total_cost;
        }
        (volume, cost)
    }

    /// Open lots in acquisition order, oldest first.
    pub fn lots(&self) -> impl Iterator<Item = &Lot> {
        self.lots.iter()
    }

    pub fn buy_volume(&self) -> Decimal {
        self.buy_volume
    }

    pub fn buy_cost(&self) -> Decimal {
        self.buy_cost
    }

    pub fn sell_volume(&self) -> Decimal {
        self.sell_volume
    }

    pub fn sell_proceeds(&self) -> Decimal {
        self.sell_proceeds
    }

    pub fn fees_total(&self) -> Decimal {
        self.fees_total
    }

    pub fn realized_pnl(&self) -> Decimal {
        self.realized_pnl
    }

    /// Maximum timestamp observed for any trade on this pair (epoch seconds).
    pub fn last_seen_timestamp(&self) -> f64 {
        self.last_seen_timestamp
    }

    /// One raw instrument identifier observed for this pair, for price
    /// lookup against the venue. Empty if none was recorded.
    pub fn pair_identifier(&self) -> &str {
        &self.example_pair_identifier
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn buy(ledger: &mut PairLedger, volume: Decimal, price: Decimal, fee: Decimal) {
        ledger.apply_buy(volume, price, None, fee, true);
    }

    fn sell(ledger: &mut PairLedger, volume: Decimal, price: Decimal, fee: Decimal) -> SellOutcome {
        ledger.apply_sell(volume, price, None, fee, true)
    }

    fn lot_volume_sum(ledger: &PairLedger) -> Decimal {
        ledger.lots().map(|l| l.remaining_volume()).sum()
    }

    // --- FIFO matching ---

    #[test]
    fn sell_consumes_oldest_lot_first() {
        let mut l = PairLedger::new();
        buy(&mut l, dec!(2), dec!(10), Decimal::ZERO);
        buy(&mut l, dec!(3), dec!(20), Decimal::ZERO);

        // 3 units sold for 90 total: per-unit proceeds 30. All of the first
        // lot goes before any of the second.
        let out = l.apply_sell(dec!(3), dec!(30), Some(dec!(90)), Decimal::ZERO, true);
        assert_eq!(out.realized_pnl, dec!(2) * dec!(20) + dec!(1) * dec!(10));
        assert_eq!(out.unmatched_volume, Decimal::ZERO);
        assert_eq!(l.realized_pnl(), dec!(50));

        // 2 units of the second lot remain, untouched in cost.
        let lots: Vec<_> = l.lots().collect();
        assert_eq!(lots.len(), 1);
        assert_eq!(lots[0].remaining_volume(), dec!(2));
        assert_eq!(lots[0].unit_cost(), dec!(20));
        assert_eq!(lots[0].total_cost(), dec!(40));
    }

    #[test]
    fn partial_consumption_splits_head_lot_in_place() {
        let mut l = PairLedger::new();
        buy(&mut l, dec!(10), dec!(100), Decimal::ZERO);
        sell(&mut l, dec!(4), dec!(110), Decimal::ZERO);

        let lots: Vec<_> = l.lots().collect();
        assert_eq!(lots.len(), 1);
        assert_eq!(lots[0].remaining_volume(), dec!(6));
        assert_eq!(lots[0].total_cost(), dec!(600));
        assert_eq!(lots[0].total_cost(), lots[0].remaining_volume() * lots[0].unit_cost());
    }

    #[test]
    fn end_to_end_scenario_with_capitalized_fees() {
        // buy 1.0 @ 9000 fee 9, sell 0.4 @ 10000 fee 4.
        let mut l = PairLedger::new();
        buy(&mut l, dec!(1.0), dec!(9000), dec!(9));
        sell(&mut l, dec!(0.4), dec!(10000), dec!(4));

        assert_eq!(safe_div(l.buy_cost(), l.buy_volume()), dec!(9009));
        assert_eq!(safe_div(l.sell_proceeds(), l.sell_volume()), dec!(9990));
        assert_eq!(l.realized_pnl(), dec!(392.4));
        assert_eq!(l.fees_total(), dec!(13));

        let (remaining_volume, remaining_cost) = l.remaining_inventory();
        assert_eq!(remaining_volume, dec!(0.6));
        assert_eq!(safe_div(remaining_cost, remaining_volume), dec!(9009));
    }

    #[test]
    fn fees_left_out_of_cost_when_not_capitalized() {
        let mut l = PairLedger::new();
        l.apply_buy(dec!(1), dec!(100), None, dec!(5), false);
        assert_eq!(l.buy_cost(), dec!(100));
        assert_eq!(l.fees_total(), dec!(5));

        let out = l.apply_sell(dec!(1), dec!(110), None, dec!(5), false);
        assert_eq!(l.sell_proceeds(), dec!(110));
        assert_eq!(out.realized_pnl, dec!(10));
    }

    // --- Running-total invariant ---

    #[test]
    fn open_lot_volume_tracks_buy_minus_sell() {
        let mut l = PairLedger::new();
        buy(&mut l, dec!(5), dec!(10), Decimal::ZERO);
        buy(&mut l, dec!(7), dec!(12), Decimal::ZERO);
        sell(&mut l, dec!(6), dec!(15), Decimal::ZERO);

        assert_eq!(lot_volume_sum(&l), l.buy_volume() - l.sell_volume());

        // An external shrink moves the open volume below the totals by the
        // shrunk amount.
        l.shrink_to_target(dec!(2));
        assert_eq!(lot_volume_sum(&l), dec!(2));
        assert_eq!(l.buy_volume() - l.sell_volume() - dec!(4), dec!(2));
    }

    // --- Oversell saturation ---

    #[test]
    fn oversell_saturates_and_reports_unmatched_volume() {
        let mut l = PairLedger::new();
        buy(&mut l, dec!(1), dec!(100), Decimal::ZERO);

        let out = l.apply_sell(dec!(3), dec!(120), Some(dec!(360)), Decimal::ZERO, true);
        assert_eq!(out.unmatched_volume, dec!(2));
        // Only the matched unit contributes: 1 * (120 - 100).
        assert_eq!(out.realized_pnl, dec!(20));
        assert_eq!(l.remaining_inventory(), (Decimal::ZERO, Decimal::ZERO));

        // The running sell totals still record the full sell.
        assert_eq!(l.sell_volume(), dec!(3));
        assert_eq!(l.sell_proceeds(), dec!(360));
    }

    #[test]
    fn sell_into_empty_ledger_realizes_nothing() {
        let mut l = PairLedger::new();
        let out = sell(&mut l, dec!(2), dec!(50), Decimal::ZERO);
        assert_eq!(out.realized_pnl, Decimal::ZERO);
        assert_eq!(out.unmatched_volume, dec!(2));
        assert_eq!(l.realized_pnl(), Decimal::ZERO);
    }

    // --- Zero-volume safety ---

    #[test]
    fn zero_volume_buy_opens_degenerate_lot() {
        let mut l = PairLedger::new();
        buy(&mut l, Decimal::ZERO, dec!(100), Decimal::ZERO);

        let lots: Vec<_> = l.lots().collect();
        assert_eq!(lots.len(), 1);
        assert_eq!(lots[0].remaining_volume(), Decimal::ZERO);
        assert_eq!(lots[0].unit_cost(), Decimal::ZERO);
        assert_eq!(safe_div(l.buy_cost(), l.buy_volume()), Decimal::ZERO);
    }

    #[test]
    fn zero_volume_sell_is_a_noop_on_lots() {
        let mut l = PairLedger::new();
        buy(&mut l, dec!(1), dec!(100), Decimal::ZERO);
        let out = sell(&mut l, Decimal::ZERO, dec!(100), Decimal::ZERO);
        assert_eq!(out.realized_pnl, Decimal::ZERO);
        assert_eq!(lot_volume_sum(&l), dec!(1));
    }

    // --- External shrink ---

    #[test]
    fn shrink_consumes_head_lots_fifo() {
        let mut l = PairLedger::new();
        buy(&mut l, dec!(2), dec!(10), Decimal::ZERO);
        buy(&mut l, dec!(3), dec!(20), Decimal::ZERO);

        l.shrink_to_target(dec!(2.5));

        let lots: Vec<_> = l.lots().collect();
        assert_eq!(lots.len(), 1);
        assert_eq!(lots[0].remaining_volume(), dec!(2.5));
        assert_eq!(lots[0].unit_cost(), dec!(20));
        assert_eq!(lots[0].total_cost(), dec!(50));
    }

    #[test]
    fn shrink_at_or_above_remaining_is_identity() {
        let mut l = PairLedger::new();
        buy(&mut l, dec!(2), dec!(10), dec!(1));
        sell(&mut l, dec!(0.5), dec!(12), Decimal::ZERO);

        let before = l.clone();
        l.shrink_to_target(dec!(1.5));
        assert_eq!(l, before);
        l.shrink_to_target(dec!(99));
        assert_eq!(l, before);
    }

    #[test]
    fn shrink_never_touches_realized_accounting() {
        let mut l = PairLedger::new();
        buy(&mut l, dec!(4), dec!(10), dec!(2));
        sell(&mut l, dec!(1), dec!(15), dec!(1));

        let realized = l.realized_pnl();
        let sold = l.sell_volume();
        let proceeds = l.sell_proceeds();
        let fees = l.fees_total();

        l.shrink_to_target(dec!(1));
        l.shrink_to_target(Decimal::ZERO);

        assert_eq!(l.realized_pnl(), realized);
        assert_eq!(l.sell_volume(), sold);
        assert_eq!(l.sell_proceeds(), proceeds);
        assert_eq!(l.fees_total(), fees);
        assert_eq!(l.remaining_inventory(), (Decimal::ZERO, Decimal::ZERO));
    }

    // --- Observation bookkeeping ---

    #[test]
    fn observation_keeps_first_identifier_and_max_timestamp() {
        let mut l = PairLedger::new();
        l.note_observation(100.0, "XXBTZUSD");
        l.note_observation(50.0, "XBTUSD");
        l.note_observation(200.0, "XBT/USD");

        assert_eq!(l.pair_identifier(), "XXBTZUSD");
        assert_eq!(l.last_seen_timestamp(), 200.0);
    }
}
