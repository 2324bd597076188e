//! Position ledger.
//!
//! Holds the bot's believed positions. Fills for one symbol are serialized
//! through that symbol's lock while other symbols proceed in parallel.
//! [`PositionLedger::snapshot`] excludes all writers for the duration of the
//! copy, so reconciliation never sees a half-applied fill.

mod reconciliation;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::{Mutex, RwLock};

use crate::application::ports::BrokerPosition;
use crate::domain::position::{Position, PositionError};
use crate::domain::shared::Symbol;

pub use reconciliation::{
    BrokerSnapshot, Discrepancy, DiscrepancySeverity, ReconciliationReport, compare_positions,
};

/// Default tolerance when comparing local and broker quantities.
pub const DEFAULT_EPSILON: Decimal = dec!(0.000001);

/// A consistent copy of the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerSnapshot {
    /// Ledger version the copy was taken at.
    pub version: u64,
    /// When the copy was taken.
    pub taken_at: DateTime<Utc>,
    /// Positions by symbol, flat ones included.
    pub positions: BTreeMap<Symbol, Position>,
}

impl LedgerSnapshot {
    /// Signed quantity for a symbol, zero if unknown.
    #[must_use]
    pub fn quantity(&self, symbol: &Symbol) -> Decimal {
        self.positions
            .get(symbol)
            .map_or(Decimal::ZERO, |p| p.quantity)
    }
}

/// Per-symbol position book.
#[derive(Debug)]
pub struct PositionLedger {
    entries: RwLock<BTreeMap<Symbol, Arc<Mutex<Position>>>>,
    version: AtomicU64,
    epsilon: Decimal,
}

impl Default for PositionLedger {
    fn default() -> Self {
        Self::new(DEFAULT_EPSILON)
    }
}

impl PositionLedger {
    /// Create an empty ledger reporting discrepancies larger than `epsilon`.
    #[must_use]
    pub fn new(epsilon: Decimal) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            version: AtomicU64::new(0),
            epsilon: epsilon.abs(),
        }
    }

    /// Reconciliation tolerance.
    #[must_use]
    pub const fn epsilon(&self) -> Decimal {
        self.epsilon
    }

    /// Number of mutations applied since creation.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Apply a signed fill using weighted-average cost.
    ///
    /// Returns the position after the fill.
    ///
    /// # Errors
    ///
    /// [`PositionError::Overflow`] if the fill cannot be represented; the
    /// ledger is left unchanged.
    pub async fn apply_fill(
        &self,
        symbol: &Symbol,
        signed_quantity: Decimal,
        price: Decimal,
    ) -> Result<Position, PositionError> {
        let entries = self.entries.read().await;
        let existing = entries.get(symbol).map(Arc::clone);
        let Some(entry) = existing else {
            drop(entries);
            return self.apply_fill_new_symbol(symbol, signed_quantity, price).await;
        };

        let mut position = entry.lock().await;
        let mut updated = position.clone();
        updated.apply_fill(signed_quantity, price)?;
        *position = updated.clone();
        self.version.fetch_add(1, Ordering::AcqRel);
        tracing::debug!(
            symbol = %symbol,
            quantity = %updated.quantity,
            avg_cost = %updated.avg_cost,
            "Fill applied to ledger"
        );
        // The map guard is held until here so snapshots wait for this fill.
        drop(position);
        drop(entries);
        Ok(updated)
    }

    async fn apply_fill_new_symbol(
        &self,
        symbol: &Symbol,
        signed_quantity: Decimal,
        price: Decimal,
    ) -> Result<Position, PositionError> {
        let mut entries = self.entries.write().await;
        let entry = match entries.get(symbol) {
            Some(entry) => Arc::clone(entry),
            None => {
                let mut opened = Position::flat(symbol.clone());
                opened.apply_fill(signed_quantity, price)?;
                entries.insert(symbol.clone(), Arc::new(Mutex::new(opened.clone())));
                self.version.fetch_add(1, Ordering::AcqRel);
                return Ok(opened);
            }
        };
        // Another fill opened the symbol while the write lock was awaited.
        let mut position = entry.lock().await;
        let mut updated = position.clone();
        updated.apply_fill(signed_quantity, price)?;
        *position = updated.clone();
        self.version.fetch_add(1, Ordering::AcqRel);
        Ok(updated)
    }

    /// Current position for a symbol.
    pub async fn position(&self, symbol: &Symbol) -> Option<Position> {
        let entry = self.entries.read().await.get(symbol).map(Arc::clone)?;
        let position = entry.lock().await.clone();
        Some(position)
    }

    /// Consistent copy of every position.
    pub async fn snapshot(&self) -> LedgerSnapshot {
        let entries = self.entries.write().await;
        let mut positions = BTreeMap::new();
        for (symbol, entry) in entries.iter() {
            positions.insert(symbol.clone(), entry.lock().await.clone());
        }
        LedgerSnapshot {
            version: self.version(),
            taken_at: Utc::now(),
            positions,
        }
    }

    /// Compare local positions with a broker snapshot.
    ///
    /// Local state is never modified; discrepancies are only reported.
    pub async fn reconcile(&self, broker: &BrokerSnapshot) -> ReconciliationReport {
        let local = self.snapshot().await;
        let discrepancies = compare_positions(&local.positions, &broker.positions, self.epsilon);
        let report = ReconciliationReport {
            timestamp: Utc::now(),
            ledger_version: local.version,
            symbols_checked: count_symbols(&local, broker),
            discrepancies,
        };
        tracing::info!(
            passed = report.is_clean(),
            discrepancies = report.discrepancies.len(),
            ledger_version = report.ledger_version,
            "Reconciliation completed"
        );
        report
    }

    /// Replace the ledger contents with previously persisted positions.
    pub async fn restore(&self, positions: Vec<Position>) {
        let mut entries = self.entries.write().await;
        entries.clear();
        for position in positions {
            entries.insert(position.symbol.clone(), Arc::new(Mutex::new(position)));
        }
        self.version.fetch_add(1, Ordering::AcqRel);
        tracing::info!(symbols = entries.len(), "Ledger restored");
    }

    /// Overwrite one symbol with the broker's figures.
    ///
    /// This is the explicit resolution for a reported discrepancy;
    /// reconciliation itself never calls it.
    pub async fn adopt_broker_position(&self, broker: &BrokerPosition) -> Position {
        let mut entries = self.entries.write().await;
        let entry = Arc::clone(
            entries
                .entry(broker.symbol.clone())
                .or_insert_with(|| Arc::new(Mutex::new(Position::flat(broker.symbol.clone())))),
        );
        let mut position = entry.lock().await;
        position.quantity = broker.quantity;
        position.avg_cost = if broker.quantity.is_zero() {
            Decimal::ZERO
        } else {
            broker.avg_entry_price
        };
        self.version.fetch_add(1, Ordering::AcqRel);
        tracing::warn!(
            symbol = %broker.symbol,
            quantity = %broker.quantity,
            "Ledger position overwritten from broker"
        );
        position.clone()
    }

    /// Every non-flat position.
    pub async fn open_positions(&self) -> Vec<Position> {
        self.snapshot()
            .await
            .positions
            .into_values()
            .filter(|p| !p.is_flat())
            .collect()
    }
}

fn count_symbols(local: &LedgerSnapshot, broker: &BrokerSnapshot) -> usize {
    let mut symbols: Vec<&Symbol> = local.positions.keys().collect();
    symbols.extend(broker.positions.iter().map(|p| &p.symbol));
    symbols.sort();
    symbols.dedup();
    symbols.len()
}
