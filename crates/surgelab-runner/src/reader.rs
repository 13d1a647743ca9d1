//! Tick input: line-oriented JSON or CSV, from a file or stdin.
//!
//! Malformed lines are fatal to the batch entry point (exit code 3) and
//! carry their line number; semantically bad ticks are the pipeline's
//! concern and are skipped there.

use std::collections::HashMap;
use std::io::{BufRead, Read};

use thiserror::Error;

use surgelab_models::Tick;

/// Input that cannot be decoded into ticks.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("line {line}: invalid tick json: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("record {line}: invalid tick csv: {source}")]
    Csv {
        line: usize,
        #[source]
        source: Box<csv::Error>,
    },

    #[error("line {line}: read failed: {source}")]
    Io {
        line: usize,
        #[source]
        source: std::io::Error,
    },
}

impl InputError {
    /// Line number of the offending input.
    pub fn line(&self) -> usize {
        match self {
            InputError::Json { line, .. }
            | InputError::Csv { line, .. }
            | InputError::Io { line, .. } => *line,
        }
    }
}

/// Wire format of a tick stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum InputFormat {
    Jsonl,
    Csv,
}

impl InputFormat {
    /// Guess the format from a file extension; JSONL when in doubt.
    pub fn from_extension(path: &std::path::Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("csv") => InputFormat::Csv,
            _ => InputFormat::Jsonl,
        }
    }
}

/// One tick per JSON line. Blank lines are skipped.
pub struct JsonlTicks<R: BufRead> {
    lines: std::io::Lines<R>,
    line_no: usize,
}

impl<R: BufRead> JsonlTicks<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
        }
    }
}

impl<R: BufRead> Iterator for JsonlTicks<R> {
    type Item = Result<Tick, InputError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.line_no += 1;
            match self.lines.next()? {
                Ok(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    return Some(serde_json::from_str(&line).map_err(|source| {
                        InputError::Json {
                            line: self.line_no,
                            source,
                        }
                    }));
                }
                Err(source) => {
                    return Some(Err(InputError::Io {
                        line: self.line_no,
                        source,
                    }))
                }
            }
        }
    }
}

/// Headed CSV with at least the canonical tick columns; extra columns are
/// ignored.
pub struct CsvTicks<R: Read> {
    inner: csv::DeserializeRecordsIntoIter<R, Tick>,
    record_no: usize,
}

impl<R: Read> CsvTicks<R> {
    pub fn new(reader: R) -> Self {
        let inner = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader)
            .into_deserialize();
        Self {
            inner,
            record_no: 1,
        }
    }
}

impl<R: Read> Iterator for CsvTicks<R> {
    type Item = Result<Tick, InputError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.record_no += 1;
        let result = self.inner.next()?;
        Some(result.map_err(|source| InputError::Csv {
            line: self.record_no,
            source: Box::new(source),
        }))
    }
}

/// Differencing filter for feeds that report cumulative session volume.
///
/// The pipeline only ever sees per-tick volume: each tick's volume becomes
/// the increment over the symbol's previous cumulative value, clipped at
/// zero, with the first observation of a symbol reporting zero.
pub struct VolumeNormalizer {
    enabled: bool,
    last_cumulative: HashMap<String, f64>,
}

impl VolumeNormalizer {
    pub fn new(cumulative: bool) -> Self {
        Self {
            enabled: cumulative,
            last_cumulative: HashMap::new(),
        }
    }

    pub fn apply(&mut self, tick: &mut Tick) {
        if !self.enabled {
            return;
        }
        let previous = self
            .last_cumulative
            .insert(tick.symbol.clone(), tick.volume);
        tick.volume = match previous {
            Some(prev) => (tick.volume - prev).max(0.0),
            None => 0.0,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn jsonl_reader_parses_and_numbers_lines() {
        let input = "\
{\"ts\":1000,\"symbol\":\"005930\",\"price\":100.0,\"volume\":1.0,\"bid1\":99.9,\"ask1\":100.1,\"bid_qty1\":10,\"ask_qty1\":10}\n\
\n\
not json\n";
        let mut reader = JsonlTicks::new(Cursor::new(input));
        let tick = reader.next().unwrap().unwrap();
        assert_eq!(tick.symbol, "005930");
        // Blank line 2 skipped; the bad line reports as line 3.
        let err = reader.next().unwrap().unwrap_err();
        assert_eq!(err.line(), 3);
    }

    #[test]
    fn csv_reader_ignores_extra_columns() {
        let input = "ts,symbol,price,volume,bid1,ask1,bid_qty1,ask_qty1,venue\n\
1000,005930,100.0,1.0,99.9,100.1,10,10,KRX\n";
        let mut reader = CsvTicks::new(Cursor::new(input));
        let tick = reader.next().unwrap().unwrap();
        assert_eq!(tick.ts, 1000);
        assert_eq!(tick.bid_qty1, 10.0);
        assert!(reader.next().is_none());
    }

    #[test]
    fn csv_reader_reports_record_line() {
        let input = "ts,symbol,price,volume,bid1,ask1,bid_qty1,ask_qty1\n\
1000,005930,100.0,1.0,99.9,100.1,10,10\n\
oops,005930,x,1.0,99.9,100.1,10,10\n";
        let mut reader = CsvTicks::new(Cursor::new(input));
        assert!(reader.next().unwrap().is_ok());
        let err = reader.next().unwrap().unwrap_err();
        assert_eq!(err.line(), 3);
    }

    #[test]
    fn format_detection_prefers_extension() {
        use std::path::Path;
        assert_eq!(
            InputFormat::from_extension(Path::new("ticks.csv")),
            InputFormat::Csv
        );
        assert_eq!(
            InputFormat::from_extension(Path::new("ticks.jsonl")),
            InputFormat::Jsonl
        );
        assert_eq!(
            InputFormat::from_extension(Path::new("ticks")),
            InputFormat::Jsonl
        );
    }

    #[test]
    fn cumulative_volume_is_differenced_per_symbol() {
        let mut normalizer = VolumeNormalizer::new(true);
        let tick = |symbol: &str, volume: f64| Tick {
            ts: 0,
            symbol: symbol.to_string(),
            price: 100.0,
            volume,
            bid1: 99.9,
            ask1: 100.1,
            bid_qty1: 10.0,
            ask_qty1: 10.0,
        };

        let mut first = tick("005930", 1000.0);
        normalizer.apply(&mut first);
        assert_eq!(first.volume, 0.0);

        let mut second = tick("005930", 1080.0);
        normalizer.apply(&mut second);
        assert_eq!(second.volume, 80.0);

        // Resets (e.g. corrections) clip at zero instead of going negative.
        let mut reset = tick("005930", 900.0);
        normalizer.apply(&mut reset);
        assert_eq!(reset.volume, 0.0);

        // Other symbols difference independently.
        let mut other = tick("000660", 500.0);
        normalizer.apply(&mut other);
        assert_eq!(other.volume, 0.0);
    }

    #[test]
    fn disabled_normalizer_passes_volume_through() {
        let mut normalizer = VolumeNormalizer::new(false);
        let mut tick = Tick {
            ts: 0,
            symbol: "005930".to_string(),
            price: 100.0,
            volume: 42.0,
            bid1: 99.9,
            ask1: 100.1,
            bid_qty1: 10.0,
            ask_qty1: 10.0,
        };
        normalizer.apply(&mut tick);
        assert_eq!(tick.volume, 42.0);
    }
}
