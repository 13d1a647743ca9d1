//! Candidate detection over absolute per-axis thresholds.

use std::collections::VecDeque;

use surgelab_models::{
    CandidateAxis, CandidateEvidence, DetectionConfig, FeatureRecord, OnsetConfig,
};

/// A candidate emitted by threshold evaluation, before refractory and
/// confirmation handling.
#[derive(Debug, Clone)]
pub struct CandidateSignal {
    pub ts: i64,
    pub score: f64,
    pub trigger_axes: Vec<CandidateAxis>,
    pub evidence: CandidateEvidence,
}

/// Stateless predicate over a single feature record, plus the trailing
/// spread-median baseline that the friction axis compares against.
pub struct CandidateDetector {
    onset: OnsetConfig,
    detection: DetectionConfig,
    baseline_window_ms: i64,
    /// `(ts, spread)` of prior records with a defined spread.
    spreads: VecDeque<(i64, f64)>,
}

impl CandidateDetector {
    pub fn new(onset: &OnsetConfig, detection: &DetectionConfig) -> Self {
        Self {
            baseline_window_ms: i64::from(onset.friction.baseline_window_s) * 1000,
            onset: onset.clone(),
            detection: detection.clone(),
            spreads: VecDeque::new(),
        }
    }

    /// Evaluate the three axes against the record. Axes whose inputs are
    /// undefined simply do not fire. Returns a signal when at least
    /// `min_axes_required` axes fired.
    pub fn evaluate(&self, record: &FeatureRecord) -> Option<CandidateSignal> {
        let mut axes = Vec::with_capacity(3);

        if record.ret_1s > self.onset.speed.ret_1s_threshold {
            axes.push(CandidateAxis::Speed);
        }
        if record.z_vol_1s > self.onset.participation.z_vol_threshold {
            axes.push(CandidateAxis::Participation);
        }
        if let (Some(spread), Some(baseline)) = (record.spread, self.spread_baseline(record.ts)) {
            if spread < baseline * self.onset.friction.spread_narrowing_pct {
                axes.push(CandidateAxis::Friction);
            }
        }

        if (axes.len() as u32) < self.detection.min_axes_required {
            return None;
        }

        let score = match &self.detection.weights {
            None => axes.len() as f64,
            Some(weights) => axes
                .iter()
                .map(|axis| match axis {
                    CandidateAxis::Speed => weights.speed,
                    CandidateAxis::Participation => weights.participation,
                    CandidateAxis::Friction => weights.friction,
                })
                .sum(),
        };

        Some(CandidateSignal {
            ts: record.ts,
            score,
            trigger_axes: axes,
            evidence: CandidateEvidence {
                ret_1s: record.ret_1s,
                z_vol_1s: record.z_vol_1s,
                spread: record.spread_or_zero(),
            },
        })
    }

    /// Fold the record's spread into the baseline history. Called after
    /// evaluation for every record, gated or not, so the baseline tracks
    /// the whole stream.
    pub fn observe(&mut self, record: &FeatureRecord) {
        let cutoff = record.ts - self.baseline_window_ms;
        while self
            .spreads
            .front()
            .is_some_and(|&(ts, _)| ts <= cutoff)
        {
            self.spreads.pop_front();
        }
        if let Some(spread) = record.spread {
            self.spreads.push_back((record.ts, spread));
        }
    }

    /// Median spread over prior records within the baseline window;
    /// lower-median order statistic, ties kept in arrival order.
    fn spread_baseline(&self, ts: i64) -> Option<f64> {
        let cutoff = ts - self.baseline_window_ms;
        let mut values: Vec<f64> = self
            .spreads
            .iter()
            .filter(|&&(s_ts, _)| s_ts > cutoff)
            .map(|&(_, spread)| spread)
            .collect();
        if values.is_empty() {
            return None;
        }
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        Some(values[(values.len() - 1) / 2])
    }
}
