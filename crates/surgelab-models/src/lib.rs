//! # Surgelab Models
//!
//! Canonical data types shared across the onset-detection pipeline:
//! - `Tick` - raw market tick with top-of-book snapshot
//! - `FeatureRecord` - tick augmented with streaming features
//! - `OnsetEvent` - tagged union of pipeline outputs
//! - `DetectorConfig` - full configuration tree (TOML-loadable, validated)
//! - `TickError` / `ConfigError` - the recoverable/fatal error split
//!
//! All types serialize with serde; events use an internally tagged JSON
//! representation keyed by `event_type` so that one event is one JSONL line.

pub mod config;
pub mod error;
pub mod events;
pub mod record;
pub mod tick;

pub use config::{
    CandidateWeights, ConfirmConfig, CpdConfig, CpdPriceConfig, CpdVolumeConfig, DeltaConfig,
    DetectionConfig, DetectorConfig, FeaturesConfig, FrictionConfig, InputConfig, OnsetConfig,
    ParticipationConfig, RefractoryConfig, SpeedConfig,
};
pub use error::{ConfigError, TickError};
pub use events::{
    CandidateAxis, CandidateEvidence, ConfirmAxis, ConfirmEvidence, OnsetEvent,
};
pub use record::FeatureRecord;
pub use tick::Tick;
