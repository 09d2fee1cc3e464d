// src/telemetry.rs
//
// Per-decision telemetry sinks.
// - DecisionSink: trait the decision controller reports to
// - NoopSink:     discards all records
// - JsonlSink:    one JSON object per decision (offline analysis)
// - VecSink:      in-memory buffer, mostly for tests

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use crate::types::{Action, Aoi, DecisionBasis, LocationKey, ParameterId, TimestampMs};

/// Bumped whenever a field of [`DecisionRecord`] changes meaning.
pub const DECISION_SCHEMA_VERSION: u32 = 1;

/// One applied cache/fetch decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub schema_version: u32,
    pub timestamp: TimestampMs,
    pub location: LocationKey,
    pub parameter: ParameterId,
    pub action: Action,
    pub basis: DecisionBasis,
    /// `None` when the key had never been fetched.
    pub prior_aoi: Option<Aoi>,
    pub post_aoi: Aoi,
    pub energy: f64,
    pub latency_ms: f64,
}

/// Abstract sink for decision telemetry.
pub trait DecisionSink {
    fn record(&mut self, record: &DecisionRecord);

    fn flush(&mut self) {}
}

impl<S: DecisionSink + ?Sized> DecisionSink for Box<S> {
    fn record(&mut self, record: &DecisionRecord) {
        (**self).record(record)
    }

    fn flush(&mut self) {
        (**self).flush()
    }
}

impl<S: DecisionSink + ?Sized> DecisionSink for &mut S {
    fn record(&mut self, record: &DecisionRecord) {
        (**self).record(record)
    }

    fn flush(&mut self) {
        (**self).flush()
    }
}

/// Fan out to two sinks.
impl<A: DecisionSink, B: DecisionSink> DecisionSink for (A, B) {
    fn record(&mut self, record: &DecisionRecord) {
        self.0.record(record);
        self.1.record(record);
    }

    fn flush(&mut self) {
        self.0.flush();
        self.1.flush();
    }
}

/// Sink that discards all records.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl DecisionSink for NoopSink {
    fn record(&mut self, _record: &DecisionRecord) {}
}

/// JSONL file sink.
///
/// Write failures are logged once and otherwise ignored; telemetry never
/// stops the decision loop.
pub struct JsonlSink {
    writer: BufWriter<File>,
    failed: bool,
}

impl JsonlSink {
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            failed: false,
        })
    }

    fn report(&mut self, err: &dyn std::fmt::Display) {
        if !self.failed {
            warn!(error = %err, "decision telemetry write failed; further errors suppressed");
            self.failed = true;
        }
    }
}

impl DecisionSink for JsonlSink {
    fn record(&mut self, record: &DecisionRecord) {
        if let Err(e) = serde_json::to_writer(&mut self.writer, record) {
            self.report(&e);
            return;
        }
        if let Err(e) = self.writer.write_all(b"\n") {
            self.report(&e);
        }
    }

    fn flush(&mut self) {
        if let Err(e) = self.writer.flush() {
            self.report(&e);
        }
    }
}

/// Keeps every record in memory.
#[derive(Debug, Default, Clone)]
pub struct VecSink {
    pub records: Vec<DecisionRecord>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DecisionSink for VecSink {
    fn record(&mut self, record: &DecisionRecord) {
        self.records.push(record.clone());
    }
}

/// Install a stderr `tracing` subscriber for the binaries.
///
/// `RUST_LOG` wins when set; otherwise `default_directive` (e.g. "info")
/// applies. Calling it twice is harmless.
pub fn init_tracing(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DecisionRecord {
        DecisionRecord {
            schema_version: DECISION_SCHEMA_VERSION,
            timestamp: 3,
            location: 12,
            parameter: "relative_speed".into(),
            action: Action::UseCache,
            basis: DecisionBasis::Policy,
            prior_aoi: Some(2),
            post_aoi: 3,
            energy: 0.2,
            latency_ms: 5.0,
        }
    }

    #[test]
    fn jsonl_sink_writes_one_object_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("decisions.jsonl");

        let mut sink = JsonlSink::create(&path).unwrap();
        sink.record(&sample());
        let mut cold = sample();
        cold.prior_aoi = None;
        cold.basis = DecisionBasis::ColdStart;
        cold.action = Action::FetchFresh;
        sink.record(&cold);
        sink.flush();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: DecisionRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first, sample());
        assert!(lines[1].contains("\"prior_aoi\":null"));
        assert!(lines[1].contains("\"basis\":\"cold_start\""));
        assert!(lines[1].contains("\"action\":\"fetch_fresh\""));
    }

    #[test]
    fn tuple_sink_fans_out() {
        let mut pair = (VecSink::new(), VecSink::new());
        pair.record(&sample());
        assert_eq!(pair.0.records.len(), 1);
        assert_eq!(pair.1.records.len(), 1);
    }
}
