//! Per-tick feature record.

use serde::{Deserialize, Serialize};

/// A tick augmented with streaming features computed without look-ahead.
///
/// Features that are undefined at a given tick (spread with an empty side,
/// microprice with an empty book) are `None` and are excluded from every
/// downstream axis check; they serialize as JSON `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub ts: i64,
    pub symbol: String,
    pub price: f64,

    /// Log return vs. the latest price at or before `ts - 1000 ms`
    /// (earliest available prior if history is shorter), clamped to ±0.1.
    pub ret_1s: f64,
    /// First difference of `ret_1s`; 0 on the first sample.
    pub accel_1s: f64,

    /// Tick count in the current-second bucket, including this tick.
    pub ticks_per_sec: u32,
    /// Volume sum in the current-second bucket, including this tick.
    pub vol_1s: f64,
    /// Z-score of `vol_1s` against the trailing `vol_window` closed-second
    /// volumes; 0 until the baseline is full or while its stdev is 0.
    pub z_vol_1s: f64,

    /// Relative spread `(ask - bid) / mid`; defined only when both sides
    /// are positive.
    pub spread: Option<f64>,
    /// Quantity-weighted microprice; defined when the top-of-book
    /// quantities sum to a positive value.
    pub microprice: Option<f64>,
    /// First difference of `microprice` across consecutive defined values.
    pub microprice_slope: Option<f64>,
}

impl FeatureRecord {
    /// Spread value for evidence payloads, 0 when undefined.
    pub fn spread_or_zero(&self) -> f64 {
        self.spread.unwrap_or(0.0)
    }

    /// Microprice slope for evidence payloads, 0 when undefined.
    pub fn microprice_slope_or_zero(&self) -> f64 {
        self.microprice_slope.unwrap_or(0.0)
    }
}
