//! Deterministic tick-path builders shared by the integration suites.
//!
//! The quiet market runs at 5 ticks/s with volume alternating 0.9/1.1 so
//! the closed-second volume baseline has a live standard deviation (0.1
//! around a mean of 5.0) and the participation axis can fire on a surge.
#![allow(dead_code)]

use surgelab_detect::OnsetEngine;
use surgelab_models::{DetectorConfig, OnsetEvent, Tick};

pub const SYMBOL: &str = "005930";

pub fn tick(symbol: &str, ts: i64, price: f64, volume: f64, half_spread: f64) -> Tick {
    Tick {
        ts,
        symbol: symbol.to_string(),
        price,
        volume,
        bid1: price - half_spread,
        ask1: price + half_spread,
        bid_qty1: 100.0,
        ask_qty1: 100.0,
    }
}

/// Flat market: 5 ticks/s at `price`, half-spread 0.05, volume alternating
/// 0.9/1.1 keyed off the tick grid so streams are reproducible.
pub fn quiet(symbol: &str, start_ms: i64, seconds: i64, price: f64) -> Vec<Tick> {
    let mut ticks = Vec::with_capacity((seconds * 5) as usize);
    for i in 0..seconds * 5 {
        let ts = start_ms + i * 200;
        let volume = if (ts / 200) % 2 == 0 { 0.9 } else { 1.1 };
        ticks.push(tick(symbol, ts, price, volume, 0.05));
    }
    ticks
}

/// Sharp surge: 10 ticks/s, price climbing `step` per tick from
/// `start_price` (0.03 ≈ 0.3%/s at 100), volume 8.0 per tick.
pub fn surge(
    symbol: &str,
    start_ms: i64,
    n_ticks: i64,
    start_price: f64,
    step: f64,
    half_spread: f64,
) -> Vec<Tick> {
    (0..n_ticks)
        .map(|i| {
            tick(
                symbol,
                start_ms + i * 100,
                start_price + i as f64 * step,
                8.0,
                half_spread,
            )
        })
        .collect()
}

/// Push every tick through a fresh engine, collecting all events.
pub fn run_engine(config: &DetectorConfig, ticks: &[Tick]) -> Vec<OnsetEvent> {
    let mut engine = OnsetEngine::new(config.clone()).expect("config valid");
    let mut events = Vec::new();
    for tick in ticks {
        events.extend(engine.push(tick).expect("legal tick"));
    }
    events
}

pub fn candidates(events: &[OnsetEvent]) -> Vec<&OnsetEvent> {
    events
        .iter()
        .filter(|e| matches!(e, OnsetEvent::OnsetCandidate { .. }))
        .collect()
}

pub fn confirmed(events: &[OnsetEvent]) -> Vec<&OnsetEvent> {
    events
        .iter()
        .filter(|e| matches!(e, OnsetEvent::OnsetConfirmed { .. }))
        .collect()
}

pub fn rejected(events: &[OnsetEvent]) -> Vec<&OnsetEvent> {
    events
        .iter()
        .filter(|e| matches!(e, OnsetEvent::OnsetRejectedRefractory { .. }))
        .collect()
}

/// Serialize events to JSONL for byte-level stream comparison.
pub fn to_jsonl(events: &[OnsetEvent]) -> Vec<String> {
    events
        .iter()
        .map(|e| serde_json::to_string(e).expect("event serializes"))
        .collect()
}
