//! Raw tick input.

use serde::{Deserialize, Serialize};

use crate::error::TickError;

/// A single market tick with the top-of-book snapshot taken at `ts`.
///
/// `ts` is epoch milliseconds in the market timezone and must be
/// non-decreasing within a symbol. `volume` is per-tick volume; feeds that
/// deliver cumulative session volume are differenced upstream before the
/// pipeline ever sees them. Unknown input columns are ignored on
/// deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// Epoch milliseconds, non-decreasing per symbol
    pub ts: i64,
    /// Symbol identifier; owner of its own pipeline state
    pub symbol: String,
    /// Last trade price
    pub price: f64,
    /// Per-tick traded volume
    pub volume: f64,
    /// Best bid price
    pub bid1: f64,
    /// Best ask price
    pub ask1: f64,
    /// Best bid quantity
    pub bid_qty1: f64,
    /// Best ask quantity
    pub ask_qty1: f64,
}

impl Tick {
    /// Validate field-level invariants.
    ///
    /// Timestamp monotonicity is per symbol and therefore checked by the
    /// feature engine, which owns the per-symbol state.
    pub fn validate(&self) -> Result<(), TickError> {
        for (field, value) in [
            ("price", self.price),
            ("volume", self.volume),
            ("bid1", self.bid1),
            ("ask1", self.ask1),
            ("bid_qty1", self.bid_qty1),
            ("ask_qty1", self.ask_qty1),
        ] {
            if !value.is_finite() {
                return Err(TickError::NonFinite {
                    symbol: self.symbol.clone(),
                    ts: self.ts,
                    field,
                });
            }
        }
        if self.price <= 0.0 {
            return Err(TickError::NonPositivePrice {
                symbol: self.symbol.clone(),
                ts: self.ts,
                price: self.price,
            });
        }
        if self.volume < 0.0 {
            return Err(TickError::NegativeVolume {
                symbol: self.symbol.clone(),
                ts: self.ts,
                volume: self.volume,
            });
        }
        Ok(())
    }
}
