//! Event persistence and run accounting.
//!
//! Events append to per-symbol JSONL files named `{symbol}_{date}.jsonl`
//! under the events directory. A running SHA-256 digest over the
//! serialized lines makes replay equivalence a one-string comparison.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::Context;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::warn;

use surgelab_models::OnsetEvent;

/// Per-type event counts.
#[derive(Debug, Default, Clone, Serialize)]
pub struct EventCounts {
    pub candidates: u64,
    pub confirmed: u64,
    pub rejected_refractory: u64,
}

/// Time-to-alert statistics over confirmed events, in seconds.
#[derive(Debug, Clone, Serialize)]
pub struct TtaStats {
    pub min: f64,
    pub mean: f64,
    pub max: f64,
}

/// End-of-run summary emitted on stderr with `--stats`.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub ticks: u64,
    pub skipped_ticks: u64,
    pub symbols: usize,
    pub events: EventCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tta_s: Option<TtaStats>,
    pub digest: String,
}

/// Append-only event log with per-symbol day files and a stream digest.
pub struct EventLog {
    events_dir: Option<PathBuf>,
    writers: HashMap<String, BufWriter<File>>,
    hasher: Sha256,
    counts: EventCounts,
    tta_ms: Vec<i64>,
}

impl EventLog {
    /// An event log writing to `events_dir`, or accounting-only when none
    /// is given.
    pub fn new(events_dir: Option<PathBuf>) -> anyhow::Result<Self> {
        if let Some(dir) = &events_dir {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create events dir {}", dir.display()))?;
        }
        Ok(Self {
            events_dir,
            writers: HashMap::new(),
            hasher: Sha256::new(),
            counts: EventCounts::default(),
            tta_ms: Vec::new(),
        })
    }

    /// Serialize, count, digest and persist one event. Returns the JSONL
    /// line for the caller to forward.
    pub fn append(&mut self, event: &OnsetEvent) -> anyhow::Result<String> {
        let line = serde_json::to_string(event).context("event serialization failed")?;
        self.hasher.update(line.as_bytes());
        self.hasher.update(b"\n");

        match event {
            OnsetEvent::OnsetCandidate { .. } => self.counts.candidates += 1,
            OnsetEvent::OnsetConfirmed {
                ts,
                confirmed_from_ts,
                ..
            } => {
                self.counts.confirmed += 1;
                self.tta_ms.push(ts - confirmed_from_ts);
            }
            OnsetEvent::OnsetRejectedRefractory { .. } => self.counts.rejected_refractory += 1,
        }

        self.write_line(event, &line)?;
        Ok(line)
    }

    fn write_line(&mut self, event: &OnsetEvent, line: &str) -> anyhow::Result<()> {
        let Some(dir) = self.events_dir.as_ref() else {
            return Ok(());
        };
        let file_name = day_file_name(event.symbol(), event.ts());
        let writer = match self.writers.entry(file_name) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                let path = dir.join(entry.key());
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .with_context(|| format!("failed to open event log {}", path.display()))?;
                entry.insert(BufWriter::new(file))
            }
        };
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        Ok(())
    }

    /// Flush all day files.
    pub fn flush(&mut self) -> anyhow::Result<()> {
        for writer in self.writers.values_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    pub fn counts(&self) -> &EventCounts {
        &self.counts
    }

    /// Hex digest over every line appended so far.
    pub fn digest_hex(&self) -> String {
        hex::encode(self.hasher.clone().finalize())
    }

    /// Build the end-of-run summary and log guardrail warnings for
    /// implausible confirmation rates.
    pub fn summary(&self, ticks: u64, skipped_ticks: u64, symbols: usize) -> RunSummary {
        if self.counts.candidates > 0 {
            let rate = self.counts.confirmed as f64 / self.counts.candidates as f64;
            if rate > 0.95 {
                warn!(
                    confirmation_rate = rate,
                    "nearly every candidate confirmed; check confirm.delta thresholds"
                );
            } else if self.counts.candidates >= 20 && rate < 0.05 {
                warn!(
                    confirmation_rate = rate,
                    "almost no candidates confirmed; confirm.delta thresholds may be too tight"
                );
            }
        }

        let tta_s = if self.tta_ms.is_empty() {
            None
        } else {
            let min = self.tta_ms.iter().copied().min().unwrap_or(0);
            let max = self.tta_ms.iter().copied().max().unwrap_or(0);
            let sum: i64 = self.tta_ms.iter().sum();
            Some(TtaStats {
                min: min as f64 / 1000.0,
                mean: sum as f64 / self.tta_ms.len() as f64 / 1000.0,
                max: max as f64 / 1000.0,
            })
        };

        RunSummary {
            ticks,
            skipped_ticks,
            symbols,
            events: self.counts.clone(),
            tta_s,
            digest: self.digest_hex(),
        }
    }
}

/// `{symbol}_{date}.jsonl`, date taken from the event timestamp.
fn day_file_name(symbol: &str, ts: i64) -> String {
    let date = chrono::DateTime::from_timestamp_millis(ts)
        .map(|dt| dt.date_naive().format("%Y%m%d").to_string())
        .unwrap_or_else(|| "00000000".to_string());
    format!("{symbol}_{date}.jsonl")
}
