//! Delta-based confirmation of onset candidates.
//!
//! A candidate is confirmed when, inside its post-candidate window, a run
//! of `persistent_n` consecutive records each shows delta-improvement over
//! the pre-candidate baselines on the mandatory price axis plus enough
//! additional axes. Baselines are lower-median order statistics over the
//! pre-window, fixed at the moment the candidate opens; records then
//! stream through an O(1) hit counter, so the earliest completing run wins
//! by construction.

use std::collections::VecDeque;

use tracing::{debug, warn};

use surgelab_models::{ConfirmAxis, ConfirmConfig, ConfirmEvidence, FeatureRecord};

use crate::candidate::CandidateSignal;

/// How the confirm detector disposed of an incoming candidate signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateDisposition {
    /// Accepted as the symbol's open candidate.
    Opened,
    /// Accepted, replacing a lower-score open candidate.
    Replaced,
    /// Discarded: an open candidate with an equal or higher score exists.
    Discarded,
    /// Dropped: no records in the pre-window to form a baseline.
    DroppedEmptyPre,
}

impl CandidateDisposition {
    /// Whether the signal became (or replaced) the open candidate and a
    /// candidate event should be emitted for it.
    pub fn accepted(&self) -> bool {
        matches!(
            self,
            CandidateDisposition::Opened | CandidateDisposition::Replaced
        )
    }
}

/// A confirmation produced by the detector, to be wrapped into an event.
#[derive(Debug, Clone)]
pub struct ConfirmedOnset {
    /// Timestamp of the record completing the earliest persistent run.
    pub ts: i64,
    pub symbol: String,
    pub confirmed_from_ts: i64,
    pub satisfied_axes: Vec<ConfirmAxis>,
    pub onset_strength: f64,
    pub evidence: ConfirmEvidence,
}

/// The candidate currently awaiting confirmation, with its frozen
/// pre-window baselines and the state of the current hit run.
struct OpenCandidate {
    ts: i64,
    score: f64,

    pre_ret: f64,
    pre_zvol: f64,
    pre_spread: Option<f64>,
    pre_microprice_slope: Option<f64>,

    run_len: u32,
    run_ret_sum: f64,
    run_zvol_sum: f64,
    run_spread_sum: f64,
    run_spread_n: u32,
}

impl OpenCandidate {
    fn reset_run(&mut self) {
        self.run_len = 0;
        self.run_ret_sum = 0.0;
        self.run_zvol_sum = 0.0;
        self.run_spread_sum = 0.0;
        self.run_spread_n = 0;
    }
}

/// Per-symbol confirm detector.
pub struct ConfirmDetector {
    config: ConfirmConfig,
    window_ms: i64,
    pre_window_ms: i64,
    /// Records spanning the trailing pre-window, for baseline computation
    /// when a candidate opens.
    history: VecDeque<FeatureRecord>,
    open: Option<OpenCandidate>,
}

impl ConfirmDetector {
    pub fn new(config: &ConfirmConfig) -> Self {
        Self {
            window_ms: i64::from(config.window_s) * 1000,
            pre_window_ms: i64::from(config.pre_window_s) * 1000,
            config: config.clone(),
            history: VecDeque::new(),
            open: None,
        }
    }

    /// Offer a candidate signal. At most one candidate is awaiting
    /// confirmation per symbol: a strictly higher score replaces the open
    /// one, a tie or lower score is discarded.
    ///
    /// Call before `on_record` for the same tick so the candidate's own
    /// record is not part of its pre-window.
    pub fn on_candidate(
        &mut self,
        record: &FeatureRecord,
        signal: &CandidateSignal,
    ) -> CandidateDisposition {
        if let Some(open) = &self.open {
            if signal.score <= open.score {
                debug!(
                    symbol = %record.symbol,
                    ts = signal.ts,
                    open_ts = open.ts,
                    "candidate discarded, open candidate has equal or higher score"
                );
                return CandidateDisposition::Discarded;
            }
        }

        let pre_start = signal.ts - self.pre_window_ms;
        let pre: Vec<&FeatureRecord> = self
            .history
            .iter()
            .filter(|r| r.ts >= pre_start && r.ts < signal.ts)
            .collect();

        if pre.is_empty() {
            warn!(
                symbol = %record.symbol,
                ts = signal.ts,
                "candidate dropped, empty pre-window"
            );
            return CandidateDisposition::DroppedEmptyPre;
        }

        let replaced = self.open.is_some();
        self.open = Some(OpenCandidate {
            ts: signal.ts,
            score: signal.score,
            pre_ret: lower_median(pre.iter().map(|r| r.ret_1s)).unwrap_or(0.0),
            pre_zvol: lower_median(pre.iter().map(|r| r.z_vol_1s)).unwrap_or(0.0),
            pre_spread: lower_median(pre.iter().filter_map(|r| r.spread)),
            pre_microprice_slope: lower_median(pre.iter().filter_map(|r| r.microprice_slope)),
            run_len: 0,
            run_ret_sum: 0.0,
            run_zvol_sum: 0.0,
            run_spread_sum: 0.0,
            run_spread_n: 0,
        });

        if replaced {
            CandidateDisposition::Replaced
        } else {
            CandidateDisposition::Opened
        }
    }

    /// Process a feature record: advance the open candidate's hit run and
    /// fold the record into the pre-window history. Returns a confirmation
    /// when the earliest persistent run completes at this record.
    pub fn on_record(&mut self, record: &FeatureRecord) -> Option<ConfirmedOnset> {
        let confirmed = self.advance_open(record);
        self.history.push_back(record.clone());
        let cutoff = record.ts - self.pre_window_ms;
        while self.history.front().is_some_and(|r| r.ts < cutoff) {
            self.history.pop_front();
        }
        confirmed
    }

    fn advance_open(&mut self, record: &FeatureRecord) -> Option<ConfirmedOnset> {
        let open = self.open.as_mut()?;

        if record.ts > open.ts + self.window_ms {
            debug!(
                symbol = %record.symbol,
                candidate_ts = open.ts,
                "candidate aged out without persistent run"
            );
            self.open = None;
            return None;
        }

        let in_post = if self.config.exclude_cand_point {
            record.ts > open.ts
        } else {
            record.ts >= open.ts
        };
        if !in_post {
            return None;
        }

        let delta = &self.config.delta;
        let price_axis = record.ret_1s - open.pre_ret >= delta.ret_min
            || match (record.microprice_slope, open.pre_microprice_slope) {
                (Some(slope), Some(pre)) => slope - pre >= delta.ret_min,
                _ => false,
            };
        let volume_axis = record.z_vol_1s - open.pre_zvol >= delta.zvol_min;
        let friction_axis = match (record.spread, open.pre_spread) {
            (Some(spread), Some(pre)) => pre - spread >= delta.spread_drop,
            _ => false,
        };

        let satisfied = u32::from(price_axis) + u32::from(volume_axis) + u32::from(friction_axis);
        let strength = f64::from(satisfied) / 3.0;

        let hit = satisfied >= self.config.min_axes
            && strength >= self.config.onset_strength_min
            && (!self.config.require_price_axis || price_axis);

        if !hit {
            open.reset_run();
            return None;
        }

        open.run_len += 1;
        open.run_ret_sum += record.ret_1s;
        open.run_zvol_sum += record.z_vol_1s;
        if let Some(spread) = record.spread {
            open.run_spread_sum += spread;
            open.run_spread_n += 1;
        }

        if open.run_len < self.config.persistent_n {
            return None;
        }

        let mut satisfied_axes = Vec::with_capacity(3);
        if price_axis {
            satisfied_axes.push(ConfirmAxis::Price);
        }
        if volume_axis {
            satisfied_axes.push(ConfirmAxis::Volume);
        }
        if friction_axis {
            satisfied_axes.push(ConfirmAxis::Friction);
        }

        let run_len = f64::from(open.run_len);
        let confirmed = ConfirmedOnset {
            ts: record.ts,
            symbol: record.symbol.clone(),
            confirmed_from_ts: open.ts,
            satisfied_axes,
            onset_strength: strength,
            evidence: ConfirmEvidence {
                ret_1s: record.ret_1s,
                z_vol_1s: record.z_vol_1s,
                spread: record.spread_or_zero(),
                microprice_slope: record.microprice_slope_or_zero(),
                delta_ret: record.ret_1s - open.pre_ret,
                delta_zvol: record.z_vol_1s - open.pre_zvol,
                delta_spread: match (open.pre_spread, record.spread) {
                    (Some(pre), Some(spread)) => pre - spread,
                    _ => 0.0,
                },
                pre_ret: open.pre_ret,
                pre_zvol: open.pre_zvol,
                pre_spread: open.pre_spread.unwrap_or(0.0),
                post_ret_mean: open.run_ret_sum / run_len,
                post_zvol_mean: open.run_zvol_sum / run_len,
                post_spread_mean: if open.run_spread_n > 0 {
                    open.run_spread_sum / f64::from(open.run_spread_n)
                } else {
                    0.0
                },
            },
        };
        self.open = None;
        Some(confirmed)
    }

    /// Whether a candidate is awaiting confirmation.
    pub fn has_open_candidate(&self) -> bool {
        self.open.is_some()
    }
}

/// Lower-median order statistic; ties resolve to the earlier value after a
/// stable sort. None on an empty iterator.
fn lower_median(values: impl Iterator<Item = f64>) -> Option<f64> {
    let mut values: Vec<f64> = values.collect();
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    Some(values[(values.len() - 1) / 2])
}
