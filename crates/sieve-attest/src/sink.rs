//! Event sinks
//!
//! The external event store is reached through [`EventSink`]. The pipeline
//! only produces records; storage and replay belong to the sink's owner.

use crate::error::SinkError;
use crate::event::{AttestationEvent, AttestationRecord};
use parking_lot::Mutex;
use std::io::Write;

/// Receiver of attestation records
pub trait EventSink: Send + Sync {
    /// Accept one record
    ///
    /// # Errors
    /// Implementation-defined; callers log and continue
    fn accept(&self, record: &AttestationRecord) -> Result<(), SinkError>;
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn accept(&self, _record: &AttestationRecord) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Keeps records in memory, for tests and embedding
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<AttestationRecord>>,
}

impl MemorySink {
    /// Empty sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records received so far
    #[must_use]
    pub fn records(&self) -> Vec<AttestationRecord> {
        self.records.lock().clone()
    }

    /// Event payloads received so far
    #[must_use]
    pub fn events(&self) -> Vec<AttestationEvent> {
        self.records.lock().iter().map(|r| r.event.clone()).collect()
    }

    /// Number of events with the given name
    #[must_use]
    pub fn count(&self, name: &str) -> usize {
        self.records
            .lock()
            .iter()
            .filter(|r| r.event.name() == name)
            .count()
    }
}

impl EventSink for MemorySink {
    fn accept(&self, record: &AttestationRecord) -> Result<(), SinkError> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}

/// Writes one JSON object per line
pub struct JsonLinesSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    /// Wrap a writer
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Unwrap the writer
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write + Send> EventSink for JsonLinesSink<W> {
    fn accept(&self, record: &AttestationRecord) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let mut writer = self.writer.lock();
        writer.write_all(&line)?;
        writer.flush()?;
        Ok(())
    }
}

impl<W: Write + Send> std::fmt::Debug for JsonLinesSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonLinesSink").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{verify_chain, AttestationLog};
    use sieve_model::{size_fraction, ConsumerKind, ContentHash, CriterionId, FragmentId, RunId};
    use std::io::{BufRead, BufReader, Seek};

    #[test]
    fn json_lines_sink_writes_replayable_records() {
        let log = AttestationLog::new();
        let run = RunId::new();
        let mut file = tempfile::tempfile().unwrap();
        {
            let sink = JsonLinesSink::new(file.try_clone().unwrap());
            for criteria in 1..=3 {
                let record = log
                    .append(
                        run,
                        AttestationEvent::RunStarted {
                            document_fingerprint: ContentHash::compute(b"doc"),
                            criteria,
                        },
                    )
                    .unwrap();
                sink.accept(&record).unwrap();
            }
        }

        file.rewind().unwrap();
        let replayed: Vec<AttestationRecord> = BufReader::new(file)
            .lines()
            .map(|line| serde_json::from_str(&line.unwrap()).unwrap())
            .collect();

        assert_eq!(replayed.len(), 3);
        assert!(verify_chain(&replayed).is_ok());
    }

    #[test]
    fn replayed_fractions_rehash_identically() {
        let log = AttestationLog::new();
        let run = RunId::new();
        let mut file = tempfile::tempfile().unwrap();
        let mut written = Vec::new();
        {
            let sink = JsonLinesSink::new(file.try_clone().unwrap());
            for n in (1000..4000).step_by(7) {
                for k in [1, 13, 29, 101, 997] {
                    let fraction = size_fraction(k * 37 % n + 1, n);
                    let record = log
                        .append(
                            run,
                            AttestationEvent::FragmentIssued {
                                fragment_id: FragmentId::new(CriterionId::new("clarity"), 0),
                                criterion_id: CriterionId::new("clarity"),
                                consumer: ConsumerKind::DisposableWorker,
                                size_fraction: fraction,
                                metered: true,
                                layout_digest: ContentHash::compute(&fraction.to_le_bytes()),
                            },
                        )
                        .unwrap();
                    sink.accept(&record).unwrap();
                    written.push(fraction);
                }
            }
        }

        file.rewind().unwrap();
        let replayed: Vec<AttestationRecord> = BufReader::new(file)
            .lines()
            .map(|line| serde_json::from_str(&line.unwrap()).unwrap())
            .collect();

        assert_eq!(replayed.len(), written.len());
        for (record, fraction) in replayed.iter().zip(&written) {
            match &record.event {
                AttestationEvent::FragmentIssued { size_fraction, .. } => {
                    assert_eq!(size_fraction.to_bits(), fraction.to_bits());
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert!(verify_chain(&replayed).is_ok());
    }

    #[test]
    fn memory_sink_counts_by_name() {
        let log = AttestationLog::new();
        let sink = MemorySink::new();
        let record = log
            .append(
                RunId::new(),
                AttestationEvent::RunAborted {
                    reason: "test".into(),
                    proofs_obtained: 0,
                },
            )
            .unwrap();
        sink.accept(&record).unwrap();
        assert_eq!(sink.count("run_aborted"), 1);
        assert_eq!(sink.count("run_started"), 0);
    }
}
