use super::StatsRecorder;
use super::measure::{Measure, Measurement, MeasureValue};
use crate::tags::TagMap;
use std::sync::Mutex;

/// One measurement as seen by [`InMemoryRecorder`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedMeasurement {
    pub measure: &'static str,
    pub value: MeasureValue,
    pub tags: TagMap,
}

/// A recorder that keeps every measurement in memory.
///
/// Useful in tests and for ad-hoc diagnostics.
#[derive(Debug, Default)]
pub struct InMemoryRecorder {
    records: Mutex<Vec<RecordedMeasurement>>,
    batches: Mutex<usize>,
}

impl InMemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn records(&self) -> Vec<RecordedMeasurement> {
        self.records.lock().unwrap().clone()
    }

    /// Measurements of `measure`, in recording order.
    pub fn records_for(&self, measure: &Measure) -> Vec<RecordedMeasurement> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.measure == measure.name)
            .cloned()
            .collect()
    }

    /// Number of `record` calls (batches) received.
    pub fn batch_count(&self) -> usize {
        *self.batches.lock().unwrap()
    }

    /// Drop everything recorded so far.
    pub fn reset(&self) {
        self.records.lock().unwrap().clear();
        *self.batches.lock().unwrap() = 0;
    }
}

impl StatsRecorder for InMemoryRecorder {
    fn record(&self, tags: &TagMap, measurements: &[Measurement]) {
        let mut records = self.records.lock().unwrap();
        records.extend(measurements.iter().map(|m| RecordedMeasurement {
            measure: m.measure.name,
            value: m.value,
            tags: tags.clone(),
        }));
        *self.batches.lock().unwrap() += 1;
    }
}
