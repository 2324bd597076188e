//! Position reconciliation against broker state.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::application::ports::BrokerPosition;
use crate::domain::position::Position;
use crate::domain::shared::Symbol;

/// Broker-reported positions captured at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerSnapshot {
    /// Every position the broker reported.
    pub positions: Vec<BrokerPosition>,
    /// When the broker was queried.
    pub taken_at: DateTime<Utc>,
}

impl BrokerSnapshot {
    /// Snapshot taken now.
    #[must_use]
    pub fn new(positions: Vec<BrokerPosition>) -> Self {
        Self {
            positions,
            taken_at: Utc::now(),
        }
    }
}

/// How far apart the two views are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscrepancySeverity {
    /// Quantities disagree by less than half the local position.
    Warning,
    /// One side has no position, or the gap is at least half the local position.
    Critical,
}

impl fmt::Display for DiscrepancySeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => write!(f, "WARNING"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// One symbol whose local and broker quantities disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discrepancy {
    /// Instrument.
    pub symbol: Symbol,
    /// Quantity the ledger believes.
    pub local_qty: Decimal,
    /// Quantity the broker reported.
    pub broker_qty: Decimal,
    /// Severity.
    pub severity: DiscrepancySeverity,
}

impl Discrepancy {
    /// `broker_qty - local_qty`.
    #[must_use]
    pub fn difference(&self) -> Decimal {
        self.broker_qty - self.local_qty
    }
}

/// Result of one reconciliation cycle. Read-only once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    /// When the comparison ran.
    pub timestamp: DateTime<Utc>,
    /// Ledger version the local side was read at.
    pub ledger_version: u64,
    /// Distinct symbols compared.
    pub symbols_checked: usize,
    /// Symbols outside tolerance, ordered by symbol.
    pub discrepancies: Vec<Discrepancy>,
}

impl ReconciliationReport {
    /// True when nothing disagreed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.discrepancies.is_empty()
    }

    /// Discrepancy for one symbol, if reported.
    #[must_use]
    pub fn get(&self, symbol: &Symbol) -> Option<&Discrepancy> {
        self.discrepancies.iter().find(|d| &d.symbol == symbol)
    }
}

/// Compare local positions with broker positions.
///
/// A symbol missing on either side counts as zero there. Symbols are
/// reported when `|local - broker| > epsilon`.
#[must_use]
pub fn compare_positions(
    local: &BTreeMap<Symbol, Position>,
    broker: &[BrokerPosition],
    epsilon: Decimal,
) -> Vec<Discrepancy> {
    let broker_qty: BTreeMap<&Symbol, Decimal> = broker
        .iter()
        .map(|p| (&p.symbol, p.quantity))
        .fold(BTreeMap::new(), |mut acc, (symbol, qty)| {
            *acc.entry(symbol).or_insert(Decimal::ZERO) += qty;
            acc
        });

    let symbols: BTreeSet<&Symbol> = local.keys().chain(broker_qty.keys().copied()).collect();

    symbols
        .into_iter()
        .filter_map(|symbol| {
            let local_qty = local.get(symbol).map_or(Decimal::ZERO, |p| p.quantity);
            let broker_qty = broker_qty.get(symbol).copied().unwrap_or(Decimal::ZERO);
            let gap = (local_qty - broker_qty).abs();
            if gap <= epsilon {
                return None;
            }
            let severity = if local_qty.is_zero()
                || broker_qty.is_zero()
                || gap >= local_qty.abs() / Decimal::TWO
            {
                DiscrepancySeverity::Critical
            } else {
                DiscrepancySeverity::Warning
            };
            Some(Discrepancy {
                symbol: symbol.clone(),
                local_qty,
                broker_qty,
                severity,
            })
        })
        .collect()
}
