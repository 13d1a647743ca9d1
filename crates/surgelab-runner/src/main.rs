//! Surgelab batch/stream entry point.
//!
//! ## Usage
//! ```bash
//! # Replay a day of ticks, confirmed onsets to stdout
//! surgelab data/clean/005930_20260729.csv --config config/onset.toml --stats
//!
//! # Live tick-by-tick mode over stdin
//! feed-bridge | surgelab --stream --events-dir data/events
//! ```

fn main() {
    std::process::exit(surgelab_runner::run());
}
