//! Per-symbol streaming feature state.

use std::collections::VecDeque;

use tracing::{debug, warn};

use surgelab_models::{FeatureRecord, Tick, TickError};

/// Hard clamp on `ret_1s` against quote corruption; values beyond it are
/// clipped and flagged.
pub const RET_CLAMP: f64 = 0.1;

/// Streaming feature engine for one symbol.
///
/// Owns all rolling state: a price-anchor deque for the 1-second return,
/// the current per-second volume bucket, and the closed-second volume
/// history backing the z-score baseline. `push` never blocks, never reads
/// ahead, and leaves state untouched when it rejects a tick.
pub struct FeatureEngine {
    symbol: String,
    vol_window: usize,

    last_ts: Option<i64>,

    /// `(ts, price)` of prior ticks; the front is the newest entry at or
    /// before `ts - 1000 ms`, or the earliest prior when history is short.
    anchors: VecDeque<(i64, f64)>,
    prev_ret: f64,

    current_sec: Option<i64>,
    bucket_ticks: u32,
    bucket_vol: f64,

    /// Closed-second volumes, capped at `vol_window` entries.
    vol_history: VecDeque<f64>,
    vol_sum: f64,
    vol_sum_sq: f64,

    prev_microprice: Option<f64>,
}

impl FeatureEngine {
    pub fn new(symbol: impl Into<String>, vol_window_s: u32) -> Self {
        let vol_window = vol_window_s.max(1) as usize;
        Self {
            symbol: symbol.into(),
            vol_window,
            last_ts: None,
            anchors: VecDeque::with_capacity(32),
            prev_ret: 0.0,
            current_sec: None,
            bucket_ticks: 0,
            bucket_vol: 0.0,
            vol_history: VecDeque::with_capacity(vol_window),
            vol_sum: 0.0,
            vol_sum_sq: 0.0,
            prev_microprice: None,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Convert one tick into a feature record, advancing rolling state.
    ///
    /// Rejected ticks (non-finite fields, non-positive price, timestamp
    /// regression) leave the engine untouched so the stream can continue.
    pub fn push(&mut self, tick: &Tick) -> Result<FeatureRecord, TickError> {
        tick.validate()?;
        if let Some(prev_ts) = self.last_ts {
            if tick.ts < prev_ts {
                return Err(TickError::TimestampRegression {
                    symbol: self.symbol.clone(),
                    ts: tick.ts,
                    prev_ts,
                });
            }
        }

        self.roll_bucket(tick.ts);
        self.bucket_ticks += 1;
        self.bucket_vol += tick.volume;

        let ticks_per_sec = self.bucket_ticks;
        let vol_1s = self.bucket_vol;
        let z_vol_1s = self.volume_zscore(vol_1s);

        let ret_1s = self.log_return(tick.ts, tick.price);
        let accel_1s = ret_1s - self.prev_ret;
        self.prev_ret = ret_1s;

        let spread = if tick.bid1 > 0.0 && tick.ask1 > 0.0 {
            let mid = (tick.ask1 + tick.bid1) / 2.0;
            Some((tick.ask1 - tick.bid1) / mid)
        } else {
            None
        };

        let qty_total = tick.bid_qty1 + tick.ask_qty1;
        let microprice = if qty_total > 0.0 {
            Some((tick.bid1 * tick.ask_qty1 + tick.ask1 * tick.bid_qty1) / qty_total)
        } else {
            None
        };
        let microprice_slope = match (microprice, self.prev_microprice) {
            (Some(current), Some(prev)) => Some(current - prev),
            _ => None,
        };
        if microprice.is_some() {
            self.prev_microprice = microprice;
        }

        self.anchors.push_back((tick.ts, tick.price));
        self.last_ts = Some(tick.ts);

        Ok(FeatureRecord {
            ts: tick.ts,
            symbol: self.symbol.clone(),
            price: tick.price,
            ret_1s,
            accel_1s,
            ticks_per_sec,
            vol_1s,
            z_vol_1s,
            spread,
            microprice,
            microprice_slope,
        })
    }

    /// Close finished per-second buckets into the volume history.
    fn roll_bucket(&mut self, ts: i64) {
        let sec = ts.div_euclid(1000);
        match self.current_sec {
            Some(current) if current == sec => {}
            Some(_) => {
                self.close_bucket();
                self.current_sec = Some(sec);
            }
            None => self.current_sec = Some(sec),
        }
    }

    fn close_bucket(&mut self) {
        let closed = self.bucket_vol;
        self.vol_history.push_back(closed);
        self.vol_sum += closed;
        self.vol_sum_sq += closed * closed;
        if self.vol_history.len() > self.vol_window {
            if let Some(evicted) = self.vol_history.pop_front() {
                self.vol_sum -= evicted;
                self.vol_sum_sq -= evicted * evicted;
            }
        }
        self.bucket_ticks = 0;
        self.bucket_vol = 0.0;
    }

    /// Z-score of the current 1-second volume against the closed-second
    /// baseline; 0 until `vol_window` seconds accumulated or while the
    /// baseline stdev is 0.
    fn volume_zscore(&self, vol_1s: f64) -> f64 {
        if self.vol_history.len() < self.vol_window {
            return 0.0;
        }
        let n = self.vol_history.len() as f64;
        let mean = self.vol_sum / n;
        let variance = (self.vol_sum_sq / n - mean * mean).max(0.0);
        let std = variance.sqrt();
        if std > 0.0 {
            (vol_1s - mean) / std
        } else {
            0.0
        }
    }

    /// Log return against the latest price at or before `ts - 1000 ms`,
    /// falling back to the earliest available prior.
    fn log_return(&mut self, ts: i64, price: f64) -> f64 {
        let cutoff = ts - 1000;
        while self.anchors.len() >= 2 {
            match self.anchors.get(1) {
                Some(&(next_ts, _)) if next_ts <= cutoff => {
                    self.anchors.pop_front();
                }
                _ => break,
            }
        }
        let Some(&(_, anchor_price)) = self.anchors.front() else {
            return 0.0;
        };
        let ret = (price / anchor_price).ln();
        if ret.abs() > RET_CLAMP {
            warn!(
                symbol = %self.symbol,
                ts,
                ret,
                "ret_1s beyond clamp, clipping"
            );
            ret.clamp(-RET_CLAMP, RET_CLAMP)
        } else {
            ret
        }
    }

    /// Drop all rolling state, e.g. across sessions.
    pub fn reset(&mut self) {
        debug!(symbol = %self.symbol, "feature engine reset");
        self.last_ts = None;
        self.anchors.clear();
        self.prev_ret = 0.0;
        self.current_sec = None;
        self.bucket_ticks = 0;
        self.bucket_vol = 0.0;
        self.vol_history.clear();
        self.vol_sum = 0.0;
        self.vol_sum_sq = 0.0;
        self.prev_microprice = None;
    }
}
