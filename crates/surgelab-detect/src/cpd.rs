//! Online change-point detection: CUSUM on price returns, Page-Hinkley on
//! volume z-scores, combined into an optional pre-filter gate.

use surgelab_models::{CpdConfig, FeatureRecord};
use tracing::debug;

/// Strategy seam for the optional pre-filter stage. Selected at pipeline
/// construction; when no gate is installed every record passes.
pub trait ChangePointGate {
    /// Update detector state with a record and report whether downstream
    /// candidate evaluation should see it.
    fn update_and_check(&mut self, record: &FeatureRecord) -> bool;
}

/// One-sided CUSUM detector over standardized deviations from a running
/// baseline.
///
/// The baseline mean and stdev accumulate over the whole stream (Welford);
/// each observation is scored against the baseline as it stood before the
/// observation arrived.
#[derive(Debug, Clone)]
pub struct CusumDetector {
    k_sigma: f64,
    h_mult: f64,
    count: u64,
    mean: f64,
    m2: f64,
    s_pos: f64,
}

impl CusumDetector {
    pub fn new(k_sigma: f64, h_mult: f64) -> Self {
        Self {
            k_sigma,
            h_mult,
            count: 0,
            mean: 0.0,
            m2: 0.0,
            s_pos: 0.0,
        }
    }

    /// Fold an observation into the running baseline without scoring it.
    pub fn observe(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    fn std(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        (self.m2 / self.count as f64).max(0.0).sqrt()
    }

    /// Score an observation against the current baseline, then fold it in.
    /// Returns true on trigger; the accumulator resets on trigger.
    pub fn update(&mut self, x: f64) -> bool {
        let sigma = self.std();
        let fired = if sigma > 0.0 {
            let k = self.k_sigma * sigma;
            self.s_pos = (self.s_pos + (x - self.mean) / sigma - k).max(0.0);
            self.s_pos > self.h_mult * k.max(1.0)
        } else {
            false
        };
        if fired {
            self.s_pos = 0.0;
        }
        self.observe(x);
        fired
    }

    /// Current accumulator value, for monitoring.
    pub fn statistic(&self) -> f64 {
        self.s_pos
    }

    pub fn reset(&mut self) {
        self.count = 0;
        self.mean = 0.0;
        self.m2 = 0.0;
        self.s_pos = 0.0;
    }
}

/// Page-Hinkley detector for upward drift.
///
/// Accumulates deviations of the observation from its running mean minus
/// the tolerance `delta`; triggers when the accumulator rises more than
/// `lambda` above its running minimum.
#[derive(Debug, Clone)]
pub struct PageHinkleyDetector {
    delta: f64,
    lambda: f64,
    count: u64,
    mean: f64,
    m_t: f64,
    m_min: f64,
}

impl PageHinkleyDetector {
    pub fn new(delta: f64, lambda: f64) -> Self {
        Self {
            delta,
            lambda,
            count: 0,
            mean: 0.0,
            m_t: 0.0,
            m_min: 0.0,
        }
    }

    /// Fold an observation into the running mean without scoring it.
    pub fn observe(&mut self, x: f64) {
        self.count += 1;
        self.mean += (x - self.mean) / self.count as f64;
    }

    /// Score an observation against the running mean, then fold it in.
    /// Returns true on trigger; accumulators reset on trigger.
    pub fn update(&mut self, x: f64) -> bool {
        let fired = if self.count > 0 {
            self.m_t += x - self.mean - self.delta;
            self.m_min = self.m_min.min(self.m_t);
            self.m_t - self.m_min > self.lambda
        } else {
            false
        };
        if fired {
            self.m_t = 0.0;
            self.m_min = 0.0;
        }
        self.observe(x);
        fired
    }

    pub fn reset(&mut self) {
        self.count = 0;
        self.mean = 0.0;
        self.m_t = 0.0;
        self.m_min = 0.0;
    }
}

/// Two-axis change-point gate with warmup and cooldown.
///
/// During warmup (`price.min_pre_s` of stream time) and cooldown the gate
/// returns false and the detector accumulators do not move toward firing,
/// but baselines keep absorbing every record.
pub struct CpdGate {
    config: CpdConfig,
    first_ts: Option<i64>,
    cooldown_until: Option<i64>,
    cusum: CusumDetector,
    page_hinkley: PageHinkleyDetector,
}

impl CpdGate {
    pub fn new(config: &CpdConfig) -> Self {
        Self {
            cusum: CusumDetector::new(config.price.k_sigma, config.price.h_mult),
            page_hinkley: PageHinkleyDetector::new(config.volume.delta, config.volume.lambda),
            config: config.clone(),
            first_ts: None,
            cooldown_until: None,
        }
    }

    fn cooldown_ms(&self) -> i64 {
        (self.config.cooldown_s * 1000.0) as i64
    }
}

impl ChangePointGate for CpdGate {
    fn update_and_check(&mut self, record: &FeatureRecord) -> bool {
        let first_ts = *self.first_ts.get_or_insert(record.ts);
        let warm = record.ts - first_ts >= i64::from(self.config.price.min_pre_s) * 1000;
        let cooling = self
            .cooldown_until
            .is_some_and(|until| record.ts < until);

        if !warm || cooling {
            self.cusum.observe(record.ret_1s);
            self.page_hinkley.observe(record.z_vol_1s);
            return false;
        }

        let price_fired = self.cusum.update(record.ret_1s);
        let volume_fired = self.page_hinkley.update(record.z_vol_1s);

        if price_fired || volume_fired {
            self.cooldown_until = Some(record.ts + self.cooldown_ms());
            debug!(
                symbol = %record.symbol,
                ts = record.ts,
                price_fired,
                volume_fired,
                "cpd gate fired"
            );
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use surgelab_models::CpdConfig;

    fn record(ts: i64, ret: f64, z_vol: f64) -> FeatureRecord {
        FeatureRecord {
            ts,
            symbol: "005930".to_string(),
            price: 100.0,
            ret_1s: ret,
            accel_1s: 0.0,
            ticks_per_sec: 1,
            vol_1s: 1.0,
            z_vol_1s: z_vol,
            spread: Some(0.001),
            microprice: Some(100.0),
            microprice_slope: Some(0.0),
        }
    }

    #[test]
    fn cusum_ignores_noise_and_catches_jump() {
        let mut detector = CusumDetector::new(0.7, 6.0);
        // Alternating small returns establish the baseline.
        for i in 0..200 {
            let x = if i % 2 == 0 { 0.0001 } else { -0.0001 };
            assert!(!detector.update(x));
        }
        // A sustained level shift accumulates past the threshold.
        let mut fired = false;
        for _ in 0..50 {
            if detector.update(0.002) {
                fired = true;
                break;
            }
        }
        assert!(fired);
    }

    #[test]
    fn cusum_resets_after_trigger() {
        let mut detector = CusumDetector::new(0.7, 6.0);
        for i in 0..200 {
            let x = if i % 2 == 0 { 0.0001 } else { -0.0001 };
            detector.update(x);
        }
        let mut fired = false;
        for _ in 0..50 {
            if detector.update(0.002) {
                fired = true;
                break;
            }
        }
        assert!(fired);
        assert_eq!(detector.statistic(), 0.0);
    }

    #[test]
    fn page_hinkley_detects_upward_drift() {
        let mut detector = PageHinkleyDetector::new(0.05, 6.0);
        for _ in 0..100 {
            assert!(!detector.update(0.0));
        }
        let mut fired = false;
        for _ in 0..40 {
            if detector.update(1.0) {
                fired = true;
                break;
            }
        }
        assert!(fired);
    }

    #[test]
    fn page_hinkley_tolerates_drift_below_delta() {
        let mut detector = PageHinkleyDetector::new(0.5, 6.0);
        for _ in 0..500 {
            assert!(!detector.update(0.1));
        }
    }

    #[test]
    fn gate_blocks_during_warmup() {
        let config = CpdConfig {
            enabled: true,
            ..CpdConfig::default()
        };
        let mut gate = CpdGate::new(&config);
        // Huge shifts inside the 10 s warmup must not pass.
        for i in 0..50 {
            assert!(!gate.update_and_check(&record(i * 100, 0.05, 10.0)));
        }
    }

    #[test]
    fn gate_fires_after_warmup_then_cools_down() {
        let config = CpdConfig {
            enabled: true,
            ..CpdConfig::default()
        };
        let mut gate = CpdGate::new(&config);

        let mut ts = 0;
        for i in 0..300 {
            let ret = if i % 2 == 0 { 0.0001 } else { -0.0001 };
            gate.update_and_check(&record(ts, ret, 0.0));
            ts += 100;
        }

        let mut fired_at = None;
        for _ in 0..100 {
            if gate.update_and_check(&record(ts, 0.003, 0.0)) {
                fired_at = Some(ts);
                break;
            }
            ts += 100;
        }
        let fired_at = fired_at.expect("gate should fire on sustained shift");

        // Within the 3 s cooldown nothing passes, however extreme.
        let mut passed_in_cooldown = false;
        for i in 1..=29 {
            if gate.update_and_check(&record(fired_at + i * 100, 0.05, 50.0)) {
                passed_in_cooldown = true;
            }
        }
        assert!(!passed_in_cooldown);
    }
}
