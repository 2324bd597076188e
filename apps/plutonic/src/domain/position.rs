//! Position Bounded Context: signed position with weighted-average cost.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::shared::Symbol;

/// The bot's believed holding in one symbol.
///
/// `quantity` is signed: positive long, negative short. `avg_cost` is the
/// weighted-average entry price of the open quantity and is zero when flat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Instrument.
    pub symbol: Symbol,
    /// Signed quantity.
    pub quantity: Decimal,
    /// Weighted-average cost of the open quantity.
    pub avg_cost: Decimal,
    /// Profit realised by reducing or closing the position.
    #[serde(default)]
    pub realized_pnl: Decimal,
}

impl Position {
    /// A flat position.
    #[must_use]
    pub fn flat(symbol: Symbol) -> Self {
        Self {
            symbol,
            quantity: Decimal::ZERO,
            avg_cost: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
        }
    }

    /// True when no quantity is held.
    #[must_use]
    pub fn is_flat(&self) -> bool {
        self.quantity.is_zero()
    }

    /// Cost basis of the open quantity.
    #[must_use]
    pub fn cost_basis(&self) -> Decimal {
        self.quantity.abs() * self.avg_cost
    }

    /// Apply a signed fill.
    ///
    /// Adding to the position re-weights the average cost. Reducing keeps it
    /// and realises P&L on the closed part. Crossing through zero opens the
    /// remainder at the fill price.
    ///
    /// # Errors
    ///
    /// [`PositionError::Overflow`] if the arithmetic leaves the `Decimal`
    /// range. The position is left untouched.
    pub fn apply_fill(
        &mut self,
        signed_quantity: Decimal,
        price: Decimal,
    ) -> Result<(), PositionError> {
        if signed_quantity.is_zero() {
            return Ok(());
        }

        let current = self.quantity;
        let next = current
            .checked_add(signed_quantity)
            .ok_or_else(|| self.overflow())?;

        if current.is_zero() || current.is_sign_positive() == signed_quantity.is_sign_positive() {
            let avg_cost = current
                .abs()
                .checked_mul(self.avg_cost)
                .zip(signed_quantity.abs().checked_mul(price))
                .and_then(|(held, added)| held.checked_add(added))
                .and_then(|total| total.checked_div(next.abs()))
                .ok_or_else(|| self.overflow())?;
            self.avg_cost = avg_cost;
            self.quantity = next;
            return Ok(());
        }

        let closed = signed_quantity.abs().min(current.abs());
        let per_share = if current.is_sign_positive() {
            price.checked_sub(self.avg_cost)
        } else {
            self.avg_cost.checked_sub(price)
        };
        let realized_pnl = per_share
            .and_then(|gain| gain.checked_mul(closed))
            .and_then(|gain| gain.checked_add(self.realized_pnl))
            .ok_or_else(|| self.overflow())?;

        self.realized_pnl = realized_pnl;
        self.quantity = next;
        if next.is_zero() {
            self.avg_cost = Decimal::ZERO;
        } else if next.is_sign_positive() != current.is_sign_positive() {
            self.avg_cost = price;
        }
        Ok(())
    }

    fn overflow(&self) -> PositionError {
        PositionError::Overflow {
            symbol: self.symbol.clone(),
        }
    }
}

/// Position arithmetic failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PositionError {
    /// A fill pushed quantity, cost or P&L outside the representable range.
    Overflow {
        /// Instrument.
        symbol: Symbol,
    },
}

impl fmt::Display for PositionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overflow { symbol } => write!(f, "Position arithmetic overflow for {symbol}"),
        }
    }
}

impl std::error::Error for PositionError {}
