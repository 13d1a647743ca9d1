//! Detector configuration tree.
//!
//! Loaded from TOML; every section and field has a tuned default so a
//! partial file (or no file at all) yields a working pipeline. The
//! configuration is an immutable value injected at pipeline construction;
//! `validate()` runs before any pipeline is built and rejecting it is
//! fatal to the constructing process.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Feature-engine parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturesConfig {
    /// Volume z-score baseline length in closed seconds.
    #[serde(alias = "vol_window")]
    pub vol_window_s: u32,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self { vol_window_s: 300 }
    }
}

/// Speed axis: absolute 1-second return threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedConfig {
    pub ret_1s_threshold: f64,
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self {
            ret_1s_threshold: 0.002,
        }
    }
}

/// Participation axis: absolute volume z-score threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticipationConfig {
    pub z_vol_threshold: f64,
}

impl Default for ParticipationConfig {
    fn default() -> Self {
        Self { z_vol_threshold: 2.5 }
    }
}

/// Friction axis: spread compression against a trailing median baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrictionConfig {
    /// Fire when `spread < baseline * spread_narrowing_pct`.
    pub spread_narrowing_pct: f64,
    /// Trailing window for the spread-median baseline, in seconds.
    pub baseline_window_s: u32,
}

impl Default for FrictionConfig {
    fn default() -> Self {
        Self {
            spread_narrowing_pct: 0.6,
            baseline_window_s: 60,
        }
    }
}

/// Candidate axis thresholds.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OnsetConfig {
    pub speed: SpeedConfig,
    pub participation: ParticipationConfig,
    pub friction: FrictionConfig,
}

/// Optional per-axis weights for the candidate score.
///
/// When absent the score is the fired-axis count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidateWeights {
    pub speed: f64,
    pub participation: f64,
    pub friction: f64,
}

impl Default for CandidateWeights {
    fn default() -> Self {
        Self {
            speed: 1.0,
            participation: 1.0,
            friction: 1.0,
        }
    }
}

/// Candidate emission parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Axes that must fire for a candidate to emit.
    pub min_axes_required: u32,
    /// Weighted score variant; `None` means score = fired-axis count.
    pub weights: Option<CandidateWeights>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_axes_required: 2,
            weights: None,
        }
    }
}

/// Delta thresholds for the confirmation axes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeltaConfig {
    pub ret_min: f64,
    pub zvol_min: f64,
    pub spread_drop: f64,
}

impl Default for DeltaConfig {
    fn default() -> Self {
        Self {
            ret_min: 0.0001,
            zvol_min: 0.1,
            spread_drop: 0.0001,
        }
    }
}

/// Confirmation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmConfig {
    /// Post-candidate window in seconds.
    pub window_s: u32,
    /// Pre-candidate baseline window in seconds.
    pub pre_window_s: u32,
    /// Required consecutive hit count.
    pub persistent_n: u32,
    /// Minimum satisfied axes per hit.
    pub min_axes: u32,
    /// Whether the price axis is mandatory on every hit.
    pub require_price_axis: bool,
    /// Whether the candidate's own record is excluded from the post window.
    pub exclude_cand_point: bool,
    /// Per-record gate on `|satisfied_axes| / 3`. The default is exactly
    /// 2/3 so that two satisfied axes pass.
    pub onset_strength_min: f64,
    pub delta: DeltaConfig,
}

impl Default for ConfirmConfig {
    fn default() -> Self {
        Self {
            window_s: 12,
            pre_window_s: 5,
            persistent_n: 22,
            min_axes: 2,
            require_price_axis: true,
            exclude_cand_point: true,
            onset_strength_min: 2.0 / 3.0,
            delta: DeltaConfig::default(),
        }
    }
}

/// Refractory cooldown parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefractoryConfig {
    pub duration_s: u32,
    pub extend_on_confirm: bool,
}

impl Default for RefractoryConfig {
    fn default() -> Self {
        Self {
            duration_s: 45,
            extend_on_confirm: true,
        }
    }
}

/// CUSUM parameters for the price axis of the CPD gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpdPriceConfig {
    /// Drift allowance in baseline sigmas.
    pub k_sigma: f64,
    /// Threshold multiplier.
    pub h_mult: f64,
    /// Baseline warmup seconds before the gate may fire.
    pub min_pre_s: u32,
}

impl Default for CpdPriceConfig {
    fn default() -> Self {
        Self {
            k_sigma: 0.7,
            h_mult: 6.0,
            min_pre_s: 10,
        }
    }
}

/// Page-Hinkley parameters for the volume axis of the CPD gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpdVolumeConfig {
    pub delta: f64,
    pub lambda: f64,
}

impl Default for CpdVolumeConfig {
    fn default() -> Self {
        Self {
            delta: 0.05,
            lambda: 6.0,
        }
    }
}

/// Change-point gate parameters. Disabled by default; when disabled the
/// gate is a no-op and every record passes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpdConfig {
    #[serde(rename = "use")]
    pub enabled: bool,
    pub price: CpdPriceConfig,
    pub volume: CpdVolumeConfig,
    pub cooldown_s: f64,
}

impl Default for CpdConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            price: CpdPriceConfig::default(),
            volume: CpdVolumeConfig::default(),
            cooldown_s: 3.0,
        }
    }
}

/// Input-layer options consumed by readers, not by the core.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Difference cumulative session volume into per-tick volume
    /// (clipped at zero) before feeding the pipeline.
    pub cumulative_volume: bool,
}

/// The full configuration tree.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub features: FeaturesConfig,
    pub onset: OnsetConfig,
    pub detection: DetectionConfig,
    pub confirm: ConfirmConfig,
    pub refractory: RefractoryConfig,
    pub cpd: CpdConfig,
    pub input: InputConfig,
}

impl DetectorConfig {
    /// Load and validate a TOML config file.
    pub fn from_toml(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Structural validation; called at pipeline construction.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.features.vol_window_s == 0 {
            return Err(ConfigError::invalid(
                "features.vol_window_s",
                "must be at least 1 second",
            ));
        }
        if !self.onset.speed.ret_1s_threshold.is_finite() {
            return Err(ConfigError::invalid(
                "onset.speed.ret_1s_threshold",
                "must be finite",
            ));
        }
        if !self.onset.participation.z_vol_threshold.is_finite() {
            return Err(ConfigError::invalid(
                "onset.participation.z_vol_threshold",
                "must be finite",
            ));
        }
        if !(0.0..=1.0).contains(&self.onset.friction.spread_narrowing_pct) {
            return Err(ConfigError::invalid(
                "onset.friction.spread_narrowing_pct",
                "must be within [0, 1]",
            ));
        }
        if self.onset.friction.baseline_window_s == 0 {
            return Err(ConfigError::invalid(
                "onset.friction.baseline_window_s",
                "must be at least 1 second",
            ));
        }
        if !(1..=3).contains(&self.detection.min_axes_required) {
            return Err(ConfigError::invalid(
                "detection.min_axes_required",
                "must be within [1, 3]",
            ));
        }
        if let Some(weights) = &self.detection.weights {
            for (key, value) in [
                ("detection.weights.speed", weights.speed),
                ("detection.weights.participation", weights.participation),
                ("detection.weights.friction", weights.friction),
            ] {
                if !value.is_finite() || value < 0.0 {
                    return Err(ConfigError::invalid(key, "must be finite and non-negative"));
                }
            }
        }
        if self.confirm.window_s == 0 {
            return Err(ConfigError::invalid(
                "confirm.window_s",
                "must be at least 1 second",
            ));
        }
        if self.confirm.pre_window_s == 0 {
            return Err(ConfigError::invalid(
                "confirm.pre_window_s",
                "must be at least 1 second",
            ));
        }
        if self.confirm.persistent_n == 0 {
            return Err(ConfigError::invalid(
                "confirm.persistent_n",
                "must be at least 1",
            ));
        }
        if !(1..=3).contains(&self.confirm.min_axes) {
            return Err(ConfigError::invalid(
                "confirm.min_axes",
                "must be within [1, 3]",
            ));
        }
        if !(0.0..=1.0).contains(&self.confirm.onset_strength_min) {
            return Err(ConfigError::invalid(
                "confirm.onset_strength_min",
                "must be within [0, 1]",
            ));
        }
        for (key, value) in [
            ("confirm.delta.ret_min", self.confirm.delta.ret_min),
            ("confirm.delta.zvol_min", self.confirm.delta.zvol_min),
            ("confirm.delta.spread_drop", self.confirm.delta.spread_drop),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::invalid(key, "must be finite and non-negative"));
            }
        }
        if self.refractory.duration_s == 0 {
            return Err(ConfigError::invalid(
                "refractory.duration_s",
                "must be at least 1 second",
            ));
        }
        if self.cpd.enabled {
            if self.cpd.price.k_sigma <= 0.0 || !self.cpd.price.k_sigma.is_finite() {
                return Err(ConfigError::invalid(
                    "cpd.price.k_sigma",
                    "must be finite and positive",
                ));
            }
            if self.cpd.price.h_mult <= 0.0 || !self.cpd.price.h_mult.is_finite() {
                return Err(ConfigError::invalid(
                    "cpd.price.h_mult",
                    "must be finite and positive",
                ));
            }
            if self.cpd.volume.lambda <= 0.0 || !self.cpd.volume.lambda.is_finite() {
                return Err(ConfigError::invalid(
                    "cpd.volume.lambda",
                    "must be finite and positive",
                ));
            }
            if !self.cpd.volume.delta.is_finite() || self.cpd.volume.delta < 0.0 {
                return Err(ConfigError::invalid(
                    "cpd.volume.delta",
                    "must be finite and non-negative",
                ));
            }
            if !self.cpd.cooldown_s.is_finite() || self.cpd.cooldown_s < 0.0 {
                return Err(ConfigError::invalid(
                    "cpd.cooldown_s",
                    "must be finite and non-negative",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        DetectorConfig::default().validate().expect("defaults valid");
    }

    #[test]
    fn default_strength_gate_passes_two_axes() {
        let config = ConfirmConfig::default();
        assert!(2.0 / 3.0 >= config.onset_strength_min);
        assert!(1.0 / 3.0 < config.onset_strength_min);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let parsed: DetectorConfig = toml::from_str(
            r#"
            [confirm]
            persistent_n = 5

            [cpd]
            use = true
            "#,
        )
        .unwrap();
        assert_eq!(parsed.confirm.persistent_n, 5);
        assert_eq!(parsed.confirm.window_s, 12);
        assert!(parsed.cpd.enabled);
        assert_eq!(parsed.features.vol_window_s, 300);
        parsed.validate().unwrap();
    }

    #[test]
    fn rejects_zero_persistent_n() {
        let mut config = DetectorConfig::default();
        config.confirm.persistent_n = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("confirm.persistent_n"));
    }

    #[test]
    fn rejects_out_of_range_min_axes() {
        let mut config = DetectorConfig::default();
        config.confirm.min_axes = 4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_negative_delta() {
        let mut config = DetectorConfig::default();
        config.confirm.delta.zvol_min = -0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn cpd_params_checked_only_when_enabled() {
        let mut config = DetectorConfig::default();
        config.cpd.price.h_mult = -1.0;
        assert!(config.validate().is_ok());
        config.cpd.enabled = true;
        assert!(config.validate().is_err());
    }
}
