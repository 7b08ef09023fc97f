//! Measures, views and recorders for query and pool metrics.
//!
//! The hook engine and pool sampler record through a [`StatsRecorder`]. In production
//! that is an [`OtelRecorder`] built from a [`ViewRegistry`]:
//!
//! ```rust,ignore
//! let registry = ViewRegistry::with_default_views()?;
//! let recorder = OtelRecorder::new(&opentelemetry::global::meter("ormtrace"), &registry);
//! ```

pub mod measure;
mod memory;
mod otel;
pub mod view;

pub use measure::{Measure, MeasureType, MeasureValue, Measurement};
pub use memory::{InMemoryRecorder, RecordedMeasurement};
pub use otel::OtelRecorder;
pub use view::{Aggregation, View, ViewRegistry, default_views};

use crate::tags::TagMap;

/// Destination for measurements.
///
/// Each call is one batch: all `measurements` share the same `tags`.
pub trait StatsRecorder: Send + Sync {
    fn record(&self, tags: &TagMap, measurements: &[Measurement]);
}

/// A recorder that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRecorder;

impl StatsRecorder for NoopRecorder {
    fn record(&self, _tags: &TagMap, _measurements: &[Measurement]) {}
}
