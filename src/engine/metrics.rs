//! Execution aggregation - running PnL, traded volume, per-symbol VWAP.
//!
//! All accumulators live behind one mutex so a fill is applied atomically as
//! a unit and a snapshot can never observe a torn update. Replayed execution
//! reports are dropped by exec id: the session engine may retransmit, so
//! exactly-once delivery is this module's job, not an assumption.

use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use crate::core::{Fill, Symbol};

/// Process-wide aggregate. Volume only grows; PnL follows the cash-ledger
/// convention (buys negative, sells and short sells positive).
#[derive(Debug, Clone, Default, Serialize)]
pub struct PortfolioMetrics {
    pub total_volume: Decimal,
    pub realized_pnl: Decimal,
}

/// Per-symbol running totals. VWAP is derived on read, never stored.
#[derive(Debug, Clone, Default)]
struct SymbolAccumulator {
    volume: Decimal,
    notional: Decimal,
}

#[derive(Default)]
struct AggState {
    metrics: PortfolioMetrics,
    per_symbol: HashMap<Symbol, SymbolAccumulator>,
    seen_exec_ids: HashSet<String>,
}

/// Consistent point-in-time read of the aggregator.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total_volume: Decimal,
    pub realized_pnl: Decimal,
    /// Only symbols with executed volume appear; a missing symbol means
    /// "no data", never a price of zero.
    pub vwaps: HashMap<Symbol, Decimal>,
}

pub struct ExecutionAggregator {
    state: Mutex<AggState>,
}

impl ExecutionAggregator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(AggState::default()),
        }
    }

    /// Apply one fill to every accumulator. Returns false (and changes
    /// nothing) when the exec id was already applied.
    pub fn on_fill(&self, fill: &Fill) -> bool {
        let mut state = self.state.lock();

        if !state.seen_exec_ids.insert(fill.exec_id.clone()) {
            warn!("duplicate execution {} dropped", fill.exec_id);
            return false;
        }

        let notional = fill.notional();
        state.metrics.total_volume += fill.quantity;
        state.metrics.realized_pnl += notional * fill.side.pnl_sign();

        let acc = state.per_symbol.entry(fill.symbol.clone()).or_default();
        acc.volume += fill.quantity;
        acc.notional += notional;

        debug!(
            "filled {} {} @ {} ({})",
            fill.quantity, fill.symbol, fill.price, fill.exec_id
        );
        true
    }

    /// Volume-weighted average price for a symbol, `None` until the symbol
    /// has traded. Callers must treat `None` as "no data", not zero.
    pub fn vwap(&self, symbol: &Symbol) -> Option<Decimal> {
        let state = self.state.lock();
        let acc = state.per_symbol.get(symbol)?;
        if acc.volume.is_zero() {
            return None;
        }
        Some(acc.notional / acc.volume)
    }

    pub fn metrics(&self) -> PortfolioMetrics {
        self.state.lock().metrics.clone()
    }

    /// Point-in-time snapshot of totals and all defined VWAPs, taken under
    /// a single lock acquisition.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let state = self.state.lock();
        let vwaps = state
            .per_symbol
            .iter()
            .filter(|(_, acc)| !acc.volume.is_zero())
            .map(|(sym, acc)| (sym.clone(), acc.notional / acc.volume))
            .collect();
        MetricsSnapshot {
            total_volume: state.metrics.total_volume,
            realized_pnl: state.metrics.realized_pnl,
            vwaps,
        }
    }
}

impl Default for ExecutionAggregator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Side;
    use rust_decimal_macros::dec;

    fn fill(exec_id: &str, symbol: &str, side: Side, price: Decimal, qty: Decimal) -> Fill {
        Fill {
            exec_id: exec_id.into(),
            symbol: Symbol::new(symbol),
            side,
            price,
            quantity: qty,
        }
    }

    #[test]
    fn test_pnl_and_volume_sum_over_fills() {
        let agg = ExecutionAggregator::new();
        agg.on_fill(&fill("E1", "MSFT", Side::Buy, dec!(20), dec!(5)));
        agg.on_fill(&fill("E2", "MSFT", Side::Sell, dec!(22), dec!(3)));
        agg.on_fill(&fill("E3", "AAPL", Side::SellShort, dec!(100), dec!(2)));

        let m = agg.metrics();
        assert_eq!(m.total_volume, dec!(10));
        // -5*20 + 3*22 + 2*100 = -100 + 66 + 200
        assert_eq!(m.realized_pnl, dec!(166));
    }

    #[test]
    fn test_buy_then_fill_scenario() {
        // Register BUY 100 "X"; partial 40 @ 10.00 then 60 @ 10.50.
        let agg = ExecutionAggregator::new();
        agg.on_fill(&fill("E1", "X", Side::Buy, dec!(10.00), dec!(40)));
        agg.on_fill(&fill("E2", "X", Side::Buy, dec!(10.50), dec!(60)));

        let m = agg.metrics();
        assert_eq!(m.realized_pnl, dec!(-1030.0));
        assert_eq!(m.total_volume, dec!(100));
        assert_eq!(agg.vwap(&Symbol::new("X")), Some(dec!(10.30)));
    }

    #[test]
    fn test_vwap_undefined_without_fills() {
        let agg = ExecutionAggregator::new();
        assert_eq!(agg.vwap(&Symbol::new("MSFT")), None);

        agg.on_fill(&fill("E1", "AAPL", Side::Buy, dec!(10), dec!(1)));
        // Still no data for MSFT, and never zero.
        assert_eq!(agg.vwap(&Symbol::new("MSFT")), None);
    }

    #[test]
    fn test_duplicate_exec_id_applied_once() {
        let agg = ExecutionAggregator::new();
        let f = fill("E1", "BAC", Side::Sell, dec!(30), dec!(10));
        assert!(agg.on_fill(&f));
        assert!(!agg.on_fill(&f));

        let m = agg.metrics();
        assert_eq!(m.total_volume, dec!(10));
        assert_eq!(m.realized_pnl, dec!(300));
        assert_eq!(agg.vwap(&Symbol::new("BAC")), Some(dec!(30)));
    }

    #[test]
    fn test_snapshot_consistency() {
        let agg = ExecutionAggregator::new();
        agg.on_fill(&fill("E1", "MSFT", Side::Buy, dec!(50), dec!(4)));
        agg.on_fill(&fill("E2", "AAPL", Side::Sell, dec!(75), dec!(2)));

        let snap = agg.snapshot();
        assert_eq!(snap.total_volume, dec!(6));
        assert_eq!(snap.realized_pnl, dec!(-50));
        assert_eq!(snap.vwaps.len(), 2);
        assert_eq!(snap.vwaps[&Symbol::new("MSFT")], dec!(50));
        // Symbols that never traded are absent, not zero.
        assert!(!snap.vwaps.contains_key(&Symbol::new("BAC")));
    }

    #[test]
    fn test_snapshot_serializes() {
        let agg = ExecutionAggregator::new();
        agg.on_fill(&fill("E1", "MSFT", Side::Sell, dec!(10), dec!(1)));
        let json = serde_json::to_string(&agg.snapshot()).unwrap();
        assert!(json.contains("realized_pnl"));
        assert!(json.contains("MSFT"));
    }
}
