//! Pipeline output events.
//!
//! `OnsetEvent` is a tagged union serialized with `event_type` as the tag,
//! one JSON object per line when persisted. The axis vocabularies diverge
//! deliberately: candidate axes name the absolute threshold that fired,
//! confirmation axes name the delta-improvement that held.

use serde::{Deserialize, Serialize};

/// Absolute-threshold axes checked by the candidate detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateAxis {
    /// Price velocity: `ret_1s` above threshold
    Speed,
    /// Volume anomaly: `z_vol_1s` above threshold
    Participation,
    /// Spread compression below the trailing baseline
    Friction,
}

/// Delta-improvement axes checked by the confirm detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmAxis {
    Price,
    Volume,
    Friction,
}

/// Feature snapshot at the candidate tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateEvidence {
    pub ret_1s: f64,
    pub z_vol_1s: f64,
    pub spread: f64,
}

/// Delta measurements behind a confirmation.
///
/// Carries the confirming record's features, the per-axis deltas against
/// the pre-window baselines, the baselines themselves, and the means over
/// the persistent run that completed the confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmEvidence {
    pub ret_1s: f64,
    pub z_vol_1s: f64,
    pub spread: f64,
    pub microprice_slope: f64,

    pub delta_ret: f64,
    pub delta_zvol: f64,
    pub delta_spread: f64,

    pub pre_ret: f64,
    pub pre_zvol: f64,
    pub pre_spread: f64,

    pub post_ret_mean: f64,
    pub post_zvol_mean: f64,
    pub post_spread_mean: f64,
}

/// One pipeline output event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum OnsetEvent {
    /// Absolute thresholds fired on enough axes to open a candidate.
    OnsetCandidate {
        ts: i64,
        symbol: String,
        score: f64,
        trigger_axes: Vec<CandidateAxis>,
        evidence: CandidateEvidence,
    },
    /// A candidate achieved persistent delta-improvement.
    OnsetConfirmed {
        /// Timestamp of the record completing the earliest persistent run
        ts: i64,
        symbol: String,
        /// The originating candidate's timestamp
        confirmed_from_ts: i64,
        satisfied_axes: Vec<ConfirmAxis>,
        /// `|satisfied_axes| / 3`
        onset_strength: f64,
        evidence: ConfirmEvidence,
    },
    /// A would-be candidate suppressed by the refractory cooldown.
    OnsetRejectedRefractory {
        ts: i64,
        symbol: String,
        candidate_ts: i64,
        blocked_until_ts: i64,
    },
}

impl OnsetEvent {
    pub fn ts(&self) -> i64 {
        match self {
            OnsetEvent::OnsetCandidate { ts, .. }
            | OnsetEvent::OnsetConfirmed { ts, .. }
            | OnsetEvent::OnsetRejectedRefractory { ts, .. } => *ts,
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            OnsetEvent::OnsetCandidate { symbol, .. }
            | OnsetEvent::OnsetConfirmed { symbol, .. }
            | OnsetEvent::OnsetRejectedRefractory { symbol, .. } => symbol,
        }
    }

    /// The serialized `event_type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            OnsetEvent::OnsetCandidate { .. } => "onset_candidate",
            OnsetEvent::OnsetConfirmed { .. } => "onset_confirmed",
            OnsetEvent::OnsetRejectedRefractory { .. } => "onset_rejected_refractory",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_event_serializes_with_tag() {
        let event = OnsetEvent::OnsetCandidate {
            ts: 1_704_067_520_000,
            symbol: "005930".to_string(),
            score: 2.0,
            trigger_axes: vec![CandidateAxis::Speed, CandidateAxis::Participation],
            evidence: CandidateEvidence {
                ret_1s: 0.003,
                z_vol_1s: 4.2,
                spread: 0.0008,
            },
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.starts_with(r#"{"event_type":"onset_candidate""#));
        assert!(json.contains(r#""trigger_axes":["speed","participation"]"#));

        let back: OnsetEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn rejected_event_parses_from_log_line() {
        let json = r#"{"event_type":"onset_rejected_refractory","ts":1704067525000,"symbol":"005930","candidate_ts":1704067525000,"blocked_until_ts":1704067565000}"#;
        let event: OnsetEvent = serde_json::from_str(json).unwrap();
        match event {
            OnsetEvent::OnsetRejectedRefractory {
                blocked_until_ts, ..
            } => assert_eq!(blocked_until_ts, 1_704_067_565_000),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn accessors_cover_all_variants() {
        let event = OnsetEvent::OnsetRejectedRefractory {
            ts: 10,
            symbol: "X".to_string(),
            candidate_ts: 10,
            blocked_until_ts: 20,
        };
        assert_eq!(event.ts(), 10);
        assert_eq!(event.symbol(), "X");
        assert_eq!(event.kind(), "onset_rejected_refractory");
    }
}
