//! # Surgelab Features
//!
//! Streaming feature computation over a per-symbol tick stream. The engine
//! is a lazy transformer: one `FeatureRecord` out per tick in, using only
//! information available at or before the tick's timestamp. Given identical
//! stream prefixes the output is bit-identical regardless of what follows.

mod engine;

pub use engine::{FeatureEngine, RET_CLAMP};
